//! Backend auto-detection
//!
//! Keyring availability varies wildly across CI containers, remote shells,
//! and platforms, so the store probes candidates with a real round-trip
//! instead of trusting a static capability flag. The first backend to pass
//! is cached for the remainder of the process.

use super::backend::CredentialBackend;
use super::encrypted_file::EncryptedFileBackend;
use super::env::EnvironmentBackend;
use super::error::Result;
use super::keyring_backend::KeyringBackend;
use super::plain_file::PlainFileBackend;
use super::secure_string::SecureString;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Reserved key for the synthetic health probe; never namespaced into user data
const PROBE_PROVIDER: &str = "__probe__";
const PROBE_FIELD: &str = "__keyward_probe__";
const PROBE_VALUE: &str = "keyward-round-trip";

/// Storage with backend probing and last-resort fallback
///
/// Probes `[keyring, encrypted-file, environment]` in order; selection is
/// lazy (first credential operation) and cached for the process lifetime.
pub struct AutoDetectStore {
    backends: Vec<Box<dyn CredentialBackend>>,
    last_resort: Box<dyn CredentialBackend>,
    active: OnceLock<usize>,
}

impl AutoDetectStore {
    /// Create a store with the default backend priority for the given
    /// installation directory
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self::with_backends(
            vec![
                Box::new(KeyringBackend::new()),
                Box::new(EncryptedFileBackend::at(dir)),
                Box::new(EnvironmentBackend::new()),
            ],
            Box::new(PlainFileBackend::at(dir)),
        )
    }

    /// Create a store with an explicit backend chain (tests, embedding)
    #[must_use]
    pub fn with_backends(
        backends: Vec<Box<dyn CredentialBackend>>,
        last_resort: Box<dyn CredentialBackend>,
    ) -> Self {
        Self {
            backends,
            last_resort,
            active: OnceLock::new(),
        }
    }

    /// Store a throwaway value, read it back, delete it. A backend is only
    /// accepted if the retrieved value matches exactly.
    fn round_trip(backend: &dyn CredentialBackend) -> bool {
        let stored = backend.store(PROBE_PROVIDER, PROBE_FIELD, PROBE_VALUE);
        if let Err(e) = stored {
            debug!(backend = backend.name(), error = %e, "probe store failed");
            return false;
        }

        let retrieved = backend.retrieve(PROBE_PROVIDER, PROBE_FIELD);
        let matched = matches!(&retrieved, Ok(Some(v)) if v.expose() == PROBE_VALUE);
        let _ = backend.delete(PROBE_PROVIDER, PROBE_FIELD);

        if !matched {
            debug!(backend = backend.name(), "probe round-trip mismatch");
        }
        matched
    }

    fn active(&self) -> &dyn CredentialBackend {
        let index = *self.active.get_or_init(|| {
            for (i, backend) in self.backends.iter().enumerate() {
                if Self::round_trip(backend.as_ref()) {
                    info!(backend = backend.name(), "selected credential backend");
                    return i;
                }
                debug!(backend = backend.name(), "backend failed health probe");
            }
            warn!(
                backend = self.last_resort.name(),
                "all credential backends failed the health probe, using last resort"
            );
            self.backends.len()
        });

        if index < self.backends.len() {
            self.backends[index].as_ref()
        } else {
            self.last_resort.as_ref()
        }
    }

    /// Name of the backend serving this process (probes on first call)
    pub fn active_backend_name(&self) -> &'static str {
        self.active().name()
    }

    /// Store a credential in the active backend
    pub fn store(&self, provider: &str, field: &str, value: &str) -> Result<()> {
        self.active().store(provider, field, value)
    }

    /// Retrieve a credential from the active backend
    pub fn retrieve(&self, provider: &str, field: &str) -> Result<Option<SecureString>> {
        self.active().retrieve(provider, field)
    }

    /// Delete a credential from the active backend
    pub fn delete(&self, provider: &str, field: &str) -> Result<()> {
        self.active().delete(provider, field)
    }

    /// Check if a credential exists in the active backend
    pub fn exists(&self, provider: &str, field: &str) -> Result<bool> {
        self.active().exists(provider, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CredentialError;
    use crate::memory::MemoryBackend;

    /// Backend that always reports the service as unreachable
    pub(crate) struct UnavailableBackend;

    impl CredentialBackend for UnavailableBackend {
        fn name(&self) -> &'static str {
            "unavailable"
        }
        fn store(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Err(CredentialError::StorageUnavailable("no service".to_string()))
        }
        fn retrieve(&self, _: &str, _: &str) -> Result<Option<SecureString>> {
            Err(CredentialError::StorageUnavailable("no service".to_string()))
        }
        fn delete(&self, _: &str, _: &str) -> Result<()> {
            Err(CredentialError::StorageUnavailable("no service".to_string()))
        }
    }

    /// Backend that accepts writes but loses them (fails the exact-match check)
    struct LossyBackend;

    impl CredentialBackend for LossyBackend {
        fn name(&self) -> &'static str {
            "lossy"
        }
        fn store(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        fn retrieve(&self, _: &str, _: &str) -> Result<Option<SecureString>> {
            Ok(None)
        }
        fn delete(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_first_healthy_backend_selected() {
        let store = AutoDetectStore::with_backends(
            vec![Box::new(MemoryBackend::new()), Box::new(UnavailableBackend)],
            Box::new(UnavailableBackend),
        );
        assert_eq!(store.active_backend_name(), "memory");
    }

    #[test]
    fn test_unavailable_keyring_falls_through_to_next() {
        // Simulate a dead keyring ahead of a working encrypted-file backend
        let dir = tempfile::tempdir().unwrap();
        let store = AutoDetectStore::with_backends(
            vec![
                Box::new(UnavailableBackend),
                Box::new(EncryptedFileBackend::at(dir.path())),
            ],
            Box::new(PlainFileBackend::at(dir.path())),
        );
        assert_eq!(store.active_backend_name(), "encrypted-file");

        store.store("openai", "api_key", "sk-1").unwrap();
        assert_eq!(store.retrieve("openai", "api_key").unwrap().unwrap().expose(), "sk-1");
    }

    #[test]
    fn test_lossy_backend_never_selected() {
        let store = AutoDetectStore::with_backends(
            vec![Box::new(LossyBackend), Box::new(MemoryBackend::new())],
            Box::new(UnavailableBackend),
        );
        assert_eq!(store.active_backend_name(), "memory");
    }

    #[test]
    fn test_all_failing_uses_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let store = AutoDetectStore::with_backends(
            vec![Box::new(UnavailableBackend), Box::new(LossyBackend)],
            Box::new(PlainFileBackend::at(dir.path())),
        );
        assert_eq!(store.active_backend_name(), "plain-file");

        store.store("p", "f", "v").unwrap();
        assert_eq!(store.retrieve("p", "f").unwrap().unwrap().expose(), "v");
    }

    #[test]
    fn test_selection_cached_after_first_probe() {
        let store = AutoDetectStore::with_backends(
            vec![Box::new(MemoryBackend::new())],
            Box::new(UnavailableBackend),
        );
        // Both calls resolve to the same cached backend
        assert_eq!(store.active_backend_name(), "memory");
        store.store("p", "f", "v").unwrap();
        assert_eq!(store.active_backend_name(), "memory");
        assert!(store.exists("p", "f").unwrap());
    }

    #[test]
    fn test_probe_leaves_no_residue() {
        let backend = MemoryBackend::new();
        assert!(AutoDetectStore::round_trip(&backend));
        assert!(backend.retrieve(PROBE_PROVIDER, PROBE_FIELD).unwrap().is_none());
    }
}

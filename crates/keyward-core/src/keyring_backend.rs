//! OS keychain backend
//!
//! Delegates to the platform secret service via the `keyring` crate:
//! macOS Keychain, Linux Secret Service (D-Bus), Windows Credential Manager.
//! Entries live under one fixed service namespace with `provider.field` as
//! the account name.

use super::backend::{record_key, CredentialBackend};
use super::error::{CredentialError, Result};
use super::secure_string::SecureString;

/// Fixed service namespace for all keyring entries
const SERVICE_NAMESPACE: &str = "keyward";

/// OS keychain backend
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    /// Create a backend using the default service namespace
    #[must_use]
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAMESPACE.to_string(),
        }
    }

    /// Create a backend with a custom service namespace (tests)
    #[must_use]
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, provider: &str, field: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &record_key(provider, field))
            .map_err(|e| CredentialError::StorageUnavailable(format!("keyring: {}", e)))
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBackend for KeyringBackend {
    fn name(&self) -> &'static str {
        "os-keyring"
    }

    fn store(&self, provider: &str, field: &str, value: &str) -> Result<()> {
        let entry = self.entry(provider, field)?;
        entry
            .set_password(value)
            .map_err(|e| match e {
                keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                    CredentialError::StorageUnavailable(format!("keyring: {}", e))
                }
                other => CredentialError::Backend(format!("keyring: {}", other)),
            })
    }

    fn retrieve(&self, provider: &str, field: &str) -> Result<Option<SecureString>> {
        let entry = self.entry(provider, field)?;
        match entry.get_password() {
            Ok(pw) => Ok(Some(SecureString::new(pw))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::PlatformFailure(e)) => {
                Err(CredentialError::StorageUnavailable(format!("keyring: {}", e)))
            }
            Err(e) => Err(CredentialError::Backend(format!("keyring: {}", e))),
        }
    }

    fn delete(&self, provider: &str, field: &str) -> Result<()> {
        let entry = self.entry(provider, field)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Backend(format!("keyring: {}", e))),
        }
    }
}

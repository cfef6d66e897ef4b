//! Unencrypted file backend (last resort)
//!
//! Exists purely for backward compatibility with pre-migration installs on
//! machines where every secure backend fails the health probe. Selecting it
//! emits a one-time warning.

use super::backend::{record_key, CredentialBackend};
use super::error::{CredentialError, Result};
use super::secure_string::SecureString;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Once;
use tracing::warn;

const PLAIN_FILE: &str = "credentials.json";

static INSECURE_WARNING: Once = Once::new();

/// Plaintext JSON file backend
pub struct PlainFileBackend {
    path: PathBuf,
}

impl PlainFileBackend {
    /// Create a backend storing records under the given installation directory
    #[must_use]
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(PLAIN_FILE),
        }
    }

    fn warn_once(&self) {
        INSECURE_WARNING.call_once(|| {
            warn!(
                path = %self.path.display(),
                "no secure credential backend available; storing credentials UNENCRYPTED"
            );
        });
    }

    fn load(&self) -> HashMap<String, String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|c| serde_json::from_str(&c).ok())
            .unwrap_or_default()
    }

    fn save(&self, records: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CredentialError::Backend(format!("create directory: {}", e)))?;
        }
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| CredentialError::Backend(format!("serialize records: {}", e)))?;
        std::fs::write(&self.path, json)
            .map_err(|e| CredentialError::Backend(format!("write {}: {}", self.path.display(), e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }
}

impl CredentialBackend for PlainFileBackend {
    fn name(&self) -> &'static str {
        "plain-file"
    }

    fn store(&self, provider: &str, field: &str, value: &str) -> Result<()> {
        self.warn_once();
        let mut records = self.load();
        records.insert(record_key(provider, field), value.to_string());
        self.save(&records)
    }

    fn retrieve(&self, provider: &str, field: &str) -> Result<Option<SecureString>> {
        Ok(self.load().get(&record_key(provider, field)).map(SecureString::new))
    }

    fn delete(&self, provider: &str, field: &str) -> Result<()> {
        let mut records = self.load();
        if records.remove(&record_key(provider, field)).is_some() {
            self.save(&records)?;
        }
        Ok(())
    }
}

//! Storage backend capability set

use super::error::Result;
use super::secure_string::SecureString;

/// A credential storage backend.
///
/// All backends address values by `(provider, field)` and guarantee:
/// - `store` is idempotent (overwrites an existing value)
/// - `delete` on an absent key is a no-op, not an error
/// - `retrieve` on an absent key returns `Ok(None)`, never an error
///
/// A backend whose medium cannot distinguish "empty" from "unset" (the
/// environment backend) reads an empty stored value as absent.
pub trait CredentialBackend: Send + Sync {
    /// Human-readable backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Store a credential value, overwriting any existing one
    fn store(&self, provider: &str, field: &str, value: &str) -> Result<()>;

    /// Retrieve a credential value, `None` if absent
    fn retrieve(&self, provider: &str, field: &str) -> Result<Option<SecureString>>;

    /// Delete a credential; absent keys are silently ignored
    fn delete(&self, provider: &str, field: &str) -> Result<()>;

    /// Check if a credential exists
    fn exists(&self, provider: &str, field: &str) -> Result<bool> {
        Ok(self.retrieve(provider, field)?.is_some())
    }
}

/// Generate the composite record key for a `(provider, field)` pair
pub(crate) fn record_key(provider: &str, field: &str) -> String {
    format!("{}.{}", provider, field)
}

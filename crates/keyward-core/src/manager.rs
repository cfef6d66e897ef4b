//! Credential manager façade
//!
//! Thin layer over the auto-detected store adding provider-scoped access
//! and the "never log secret values" discipline: every diagnostic passes
//! values through [`mask`] before rendering.

use super::error::{CredentialError, Result};
use super::secure_string::SecureString;
use super::store::AutoDetectStore;
use std::sync::Arc;
use tracing::debug;

/// Mask a secret for diagnostics: first 4 chars + `…` + length
///
/// ```
/// use keyward_core::mask;
/// assert_eq!(mask("sk-proj-abcdef123456"), "sk-p…(20)");
/// ```
#[must_use]
pub fn mask(value: &str) -> String {
    let head: String = value.chars().take(4).collect();
    format!("{}…({})", head, value.chars().count())
}

/// Façade the authentication strategies call
///
/// Owns the shared [`AutoDetectStore`] for its process lifetime; strategies
/// hold a cloned `Arc` reference.
pub struct CredentialManager {
    store: Arc<AutoDetectStore>,
}

impl CredentialManager {
    /// Create a manager over an explicitly constructed store
    #[must_use]
    pub fn new(store: Arc<AutoDetectStore>) -> Self {
        Self { store }
    }

    /// The store backing this manager
    #[must_use]
    pub fn store(&self) -> &AutoDetectStore {
        &self.store
    }

    /// Retrieve a credential, `None` if absent
    pub fn get_credential(&self, provider: &str, field: &str) -> Result<Option<SecureString>> {
        debug!(provider = %provider, field = %field, "retrieving credential");
        self.store.retrieve(provider, field)
    }

    /// Retrieve a credential that must exist
    pub fn require_credential(&self, provider: &str, field: &str) -> Result<SecureString> {
        self.get_credential(provider, field)?
            .ok_or_else(|| CredentialError::NotFound(format!("{}.{}", provider, field)))
    }

    /// Store a credential, overwriting any existing value
    pub fn store_credential(&self, provider: &str, field: &str, value: &str) -> Result<()> {
        debug!(
            provider = %provider,
            field = %field,
            value = %mask(value),
            "storing credential"
        );
        self.store.store(provider, field, value)
    }

    /// Delete a credential; absent keys are silently ignored
    pub fn delete_credential(&self, provider: &str, field: &str) -> Result<()> {
        debug!(provider = %provider, field = %field, "deleting credential");
        self.store.delete(provider, field)
    }

    /// Check if a credential exists
    pub fn credential_exists(&self, provider: &str, field: &str) -> Result<bool> {
        self.store.exists(provider, field)
    }

    /// Get a credential from an environment variable, falling back to the store
    pub fn get_or_env(
        &self,
        provider: &str,
        field: &str,
        env_var: &str,
    ) -> Result<Option<SecureString>> {
        if let Ok(value) = std::env::var(env_var) {
            if !value.is_empty() {
                debug!(env_var = %env_var, "using credential from environment override");
                return Ok(Some(SecureString::new(value)));
            }
        }
        self.get_credential(provider, field)
    }
}

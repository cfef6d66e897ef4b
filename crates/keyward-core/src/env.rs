//! Environment variable backend
//!
//! Maps `(provider, field)` to a deterministically derived environment
//! variable name. Mutations affect the current process only and do not
//! survive a restart; this backend exists for ephemeral/CI contexts.

use super::backend::CredentialBackend;
use super::error::Result;
use super::secure_string::SecureString;
use tracing::debug;

/// Fixed prefix for all derived variable names
const ENV_PREFIX: &str = "KEYWARD";

/// Process-environment backend (non-durable)
pub struct EnvironmentBackend {
    prefix: String,
}

impl EnvironmentBackend {
    /// Create a backend with the default `KEYWARD_` prefix
    #[must_use]
    pub fn new() -> Self {
        Self {
            prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Create a backend with a custom prefix (tests)
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Derive the variable name: uppercased, non-alphanumerics become `_`
    #[must_use]
    pub fn var_name(&self, provider: &str, field: &str) -> String {
        let sanitize = |s: &str| -> String {
            s.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_uppercase()
                    } else {
                        '_'
                    }
                })
                .collect()
        };
        format!("{}_{}_{}", self.prefix, sanitize(provider), sanitize(field))
    }
}

impl Default for EnvironmentBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBackend for EnvironmentBackend {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn store(&self, provider: &str, field: &str, value: &str) -> Result<()> {
        let var = self.var_name(provider, field);
        debug!(var = %var, "storing credential in process environment (non-durable)");
        std::env::set_var(var, value);
        Ok(())
    }

    fn retrieve(&self, provider: &str, field: &str) -> Result<Option<SecureString>> {
        // An empty variable is indistinguishable from an unset one in
        // practice (shells export both); treat it as absent
        match std::env::var(self.var_name(provider, field)) {
            Ok(v) if !v.is_empty() => Ok(Some(SecureString::new(v))),
            _ => Ok(None),
        }
    }

    fn delete(&self, provider: &str, field: &str) -> Result<()> {
        std::env::remove_var(self.var_name(provider, field));
        Ok(())
    }
}

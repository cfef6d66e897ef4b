//! In-memory backend (for testing)

use super::backend::{record_key, CredentialBackend};
use super::error::{handle_lock_poison, Result};
use super::secure_string::SecureString;
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local map backend used in tests and embedded scenarios
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    /// Create an empty in-memory backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn store(&self, provider: &str, field: &str, value: &str) -> Result<()> {
        let mut records = self.records.write().map_err(handle_lock_poison)?;
        records.insert(record_key(provider, field), value.to_string());
        Ok(())
    }

    fn retrieve(&self, provider: &str, field: &str) -> Result<Option<SecureString>> {
        let records = self.records.read().map_err(handle_lock_poison)?;
        Ok(records.get(&record_key(provider, field)).map(SecureString::new))
    }

    fn delete(&self, provider: &str, field: &str) -> Result<()> {
        let mut records = self.records.write().map_err(handle_lock_poison)?;
        records.remove(&record_key(provider, field));
        Ok(())
    }
}

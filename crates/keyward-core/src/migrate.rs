//! One-shot migration from the legacy plaintext credentials file
//!
//! Older installs kept a nested `provider -> field -> value` JSON map on
//! disk in the clear. Migration moves every non-empty value into the active
//! store, then renames the source to `<path>.backup`. The rename doubles as
//! the idempotency marker: a re-run finds no source file and reports
//! nothing to migrate.

use super::error::{CredentialError, Result};
use super::manager::CredentialManager;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Per-provider counts of migrated credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    counts: BTreeMap<String, usize>,
}

impl MigrationReport {
    /// Number of credentials migrated for one provider
    #[must_use]
    pub fn migrated(&self, provider: &str) -> usize {
        self.counts.get(provider).copied().unwrap_or(0)
    }

    /// Total credentials migrated across providers
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// True when there was nothing to migrate
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate `(provider, count)` pairs in provider order
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(p, c)| (p.as_str(), *c))
    }
}

/// Batch mover from the legacy plaintext file into the active store
pub struct CredentialMigrator<'a> {
    manager: &'a CredentialManager,
}

impl<'a> CredentialMigrator<'a> {
    /// Create a migrator targeting the given manager's active backend
    #[must_use]
    pub fn new(manager: &'a CredentialManager) -> Self {
        Self { manager }
    }

    /// Migrate all credentials from `legacy_path`.
    ///
    /// Absent or empty source reports nothing to migrate. Each field is
    /// stored independently, so a failure mid-run leaves already-stored
    /// fields valid; stores are idempotent overwrites, so a crashed run
    /// (stores done, rename missing) is safe to repeat.
    pub fn migrate(&self, legacy_path: &Path) -> Result<MigrationReport> {
        let content = match std::fs::read_to_string(legacy_path) {
            Ok(c) => c,
            Err(_) => {
                info!(path = %legacy_path.display(), "no legacy credentials file, nothing to migrate");
                return Ok(MigrationReport::default());
            }
        };

        if content.trim().is_empty() {
            info!(path = %legacy_path.display(), "legacy credentials file empty, nothing to migrate");
            return Ok(MigrationReport::default());
        }

        let legacy: BTreeMap<String, BTreeMap<String, serde_json::Value>> =
            serde_json::from_str(&content).map_err(|e| CredentialError::MigrationSourceInvalid {
                path: legacy_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut report = MigrationReport::default();
        for (provider, fields) in &legacy {
            let counter = report.counts.entry(provider.clone()).or_insert(0);
            for (field, value) in fields {
                match value.as_str() {
                    Some(v) if !v.is_empty() => {
                        self.manager.store_credential(provider, field, v)?;
                        *counter += 1;
                    }
                    Some(_) => {}
                    None => {
                        warn!(provider = %provider, field = %field, "skipping non-string legacy value");
                    }
                }
            }
        }

        // The rename marks the migration done; the original stays inspectable
        let backup = backup_path(legacy_path);
        std::fs::rename(legacy_path, &backup).map_err(|e| {
            CredentialError::Backend(format!(
                "rename {} to backup: {}",
                legacy_path.display(),
                e
            ))
        })?;

        info!(
            total = report.total(),
            backup = %backup.display(),
            "migrated legacy credentials"
        );
        Ok(report)
    }
}

fn backup_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".backup");
    std::path::PathBuf::from(name)
}

//! Encrypted file backend using AES-256-GCM
//!
//! All credentials live in a single record map keyed `provider.field`,
//! serialized to JSON and encrypted as one blob. Every mutation re-encrypts
//! and rewrites the whole file under an exclusive cross-process lock; a
//! corrupted blob degrades to an empty record set with a warning instead of
//! blocking all operations.

use super::backend::{record_key, CredentialBackend};
use super::encryption::FileCipher;
use super::error::{CredentialError, Result};
use super::lock::FileLock;
use super::secure_string::SecureString;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const KEY_FILE: &str = "store.key";
const RECORD_FILE: &str = "credentials.enc";
const LOCK_FILE: &str = "credentials.enc.lock";

/// Encrypted record file backend
pub struct EncryptedFileBackend {
    dir: PathBuf,
}

impl EncryptedFileBackend {
    /// Create a backend rooted at the default installation directory
    /// (`~/.keyward`)
    pub fn new() -> Result<Self> {
        let data_dir = dirs::home_dir().ok_or_else(|| {
            CredentialError::Configuration("cannot determine home directory".to_string())
        })?;
        Ok(Self::at(data_dir.join(".keyward")))
    }

    /// Create a backend rooted at a specific installation directory
    #[must_use]
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    fn cipher(&self) -> Result<FileCipher> {
        FileCipher::load_or_generate(&self.dir.join(KEY_FILE))
    }

    /// Load and decrypt the record map.
    ///
    /// A missing file is an empty map; a corrupted or foreign-keyed blob is
    /// also an empty map plus a warning, so a damaged file reads as "no
    /// credentials stored" rather than failing every operation.
    fn load_records(&self, cipher: &FileCipher) -> HashMap<String, String> {
        let path = self.record_path();
        let encoded = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return HashMap::new(),
        };

        let decrypted = BASE64
            .decode(encoded.trim())
            .map_err(|e| CredentialError::Decryption(format!("decode: {}", e)))
            .and_then(|blob| cipher.decrypt(&blob))
            .and_then(|plain| {
                serde_json::from_slice::<HashMap<String, String>>(&plain)
                    .map_err(|e| CredentialError::Decryption(format!("parse: {}", e)))
            });

        match decrypted {
            Ok(records) => {
                debug!(count = records.len(), "loaded encrypted credential records");
                records
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "record file unreadable, treating as empty"
                );
                HashMap::new()
            }
        }
    }

    /// Encrypt and atomically rewrite the whole record map
    fn save_records(&self, cipher: &FileCipher, records: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_vec(records)
            .map_err(|e| CredentialError::Backend(format!("serialize records: {}", e)))?;
        let encoded = BASE64.encode(cipher.encrypt(&json)?);

        let path = self.record_path();
        let tmp = path.with_extension("enc.tmp");
        std::fs::write(&tmp, encoded)
            .map_err(|e| CredentialError::Backend(format!("write record file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600));
        }

        std::fs::rename(&tmp, &path)
            .map_err(|e| CredentialError::Backend(format!("commit record file: {}", e)))?;

        debug!(path = %path.display(), count = records.len(), "saved encrypted credential records");
        Ok(())
    }

    /// Lock-guarded read-decrypt-modify-encrypt-write cycle
    fn mutate(&self, apply: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let cipher = self.cipher()?;
        let _lock = FileLock::acquire(&self.lock_path())?;
        let mut records = self.load_records(&cipher);
        apply(&mut records);
        self.save_records(&cipher, &records)
        // lock released on drop, on success and error alike
    }
}

impl CredentialBackend for EncryptedFileBackend {
    fn name(&self) -> &'static str {
        "encrypted-file"
    }

    fn store(&self, provider: &str, field: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        self.mutate(|records| {
            records.insert(record_key(provider, field), value);
        })
    }

    fn retrieve(&self, provider: &str, field: &str) -> Result<Option<SecureString>> {
        let cipher = self.cipher()?;
        let records = self.load_records(&cipher);
        Ok(records
            .get(&record_key(provider, field))
            .map(SecureString::new))
    }

    fn delete(&self, provider: &str, field: &str) -> Result<()> {
        self.mutate(|records| {
            records.remove(&record_key(provider, field));
        })
    }
}

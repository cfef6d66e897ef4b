//! Symmetric authenticated encryption over a byte blob
//!
//! AES-256-GCM with a locally generated key file. The key is 32 random
//! bytes, created once per installation directory with owner-only
//! permissions. Losing the key file invalidates every encrypted record
//! irrecoverably; there is no key escrow.

use super::error::{CredentialError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use std::path::Path;
use tracing::{debug, warn};
use zeroize::Zeroizing;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// AES-256-GCM cipher bound to an installation key file
pub(crate) struct FileCipher {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl FileCipher {
    /// Load the key file, generating it on first use.
    ///
    /// An unreadable or truncated key file is treated as missing: a fresh
    /// key is generated with a warning, and any records encrypted under the
    /// old key become undecryptable (which downstream degrades to "no
    /// credentials stored").
    pub(crate) fn load_or_generate(key_path: &Path) -> Result<Self> {
        if key_path.exists() {
            if let Some(key) = Self::read_key(key_path) {
                return Ok(Self { key });
            }
            warn!(path = %key_path.display(), "key file unreadable, generating a new key");
        }
        Self::generate(key_path)
    }

    fn read_key(key_path: &Path) -> Option<Zeroizing<[u8; KEY_SIZE]>> {
        let encoded = std::fs::read_to_string(key_path).ok()?;
        let bytes = BASE64.decode(encoded.trim()).ok()?;
        if bytes.len() != KEY_SIZE {
            return None;
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&bytes);
        Some(key)
    }

    fn generate(key_path: &Path) -> Result<Self> {
        if let Some(parent) = key_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CredentialError::Backend(format!("create directory: {}", e)))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
            }
        }

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        rand::rngs::OsRng.fill_bytes(key.as_mut());

        std::fs::write(key_path, BASE64.encode(key.as_ref()))
            .map_err(|e| CredentialError::Backend(format!("write key file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600));
        }

        debug!(path = %key_path.display(), "generated encryption key file");
        Ok(Self { key })
    }

    /// Encrypt plaintext, returning `nonce (12 bytes) || ciphertext`
    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(self.key.as_ref())
            .map_err(|e| CredentialError::Backend(format!("cipher init: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CredentialError::Backend(format!("encryption failed: {}", e)))?;

        let mut result = nonce_bytes.to_vec();
        result.extend(ciphertext);
        Ok(result)
    }

    /// Decrypt data produced by [`encrypt`](Self::encrypt)
    pub(crate) fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>> {
        if encrypted.len() < NONCE_SIZE {
            return Err(CredentialError::Decryption("encrypted data too short".to_string()));
        }

        let cipher = Aes256Gcm::new_from_slice(self.key.as_ref())
            .map_err(|e| CredentialError::Backend(format!("cipher init: {}", e)))?;

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CredentialError::Decryption("corrupted blob or wrong key".to_string()))
    }
}

//! Keyward Core - Secure credential storage
//!
//! This crate stores machine-local credentials for external service providers:
//! - OS keychain (macOS Keychain, Linux Secret Service, Windows Credential Manager)
//! - Encrypted file fallback (AES-256-GCM, per-installation key file)
//! - Environment variables (ephemeral, for CI)
//! - Plaintext file last resort (pre-migration compatibility only)
//!
//! Backends are probed in priority order with a synthetic store/retrieve/delete
//! round-trip; the first healthy backend is cached for the process lifetime.
//!
//! ## Security Features
//!
//! - **SecureString**: cryptographic memory wiping via `zeroize`
//! - **Redaction**: secret values never reach logs or error messages raw
//! - **Owner-only permissions** on the key file and record file

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod encrypted_file;
mod encryption;
mod env;
mod error;
mod keyring_backend;
mod lock;
mod manager;
mod memory;
mod migrate;
mod plain_file;
mod secure_string;
mod store;


pub use backend::CredentialBackend;
pub use encrypted_file::EncryptedFileBackend;
pub use env::EnvironmentBackend;
pub use error::{CredentialError, Result};
pub use keyring_backend::KeyringBackend;
pub use manager::{mask, CredentialManager};
pub use memory::MemoryBackend;
pub use migrate::{CredentialMigrator, MigrationReport};
pub use plain_file::PlainFileBackend;
pub use secure_string::SecureString;
pub use store::AutoDetectStore;

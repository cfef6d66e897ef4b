//! Credential error types

use thiserror::Error;

/// Credential store errors
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Credential not found where one was required
    #[error("credential not found: {0}")]
    NotFound(String),

    /// Backend cannot be reached (headless keyring, locked dir, ...)
    ///
    /// Expected during backend probing; drives fallback rather than
    /// surfacing to callers.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Corrupted blob or foreign key file
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Backend I/O or protocol error
    #[error("backend error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Legacy migration source is malformed
    #[error("invalid migration source {path}: {reason}")]
    MigrationSourceInvalid {
        /// Path of the legacy file
        path: String,
        /// Why it could not be read
        reason: String,
    },
}

/// Result type for credential operations
pub type Result<T> = std::result::Result<T, CredentialError>;

/// Handle lock poison errors consistently
pub(crate) fn handle_lock_poison<T>(e: std::sync::PoisonError<T>) -> CredentialError {
    CredentialError::Backend(format!("lock poisoned: {}", e))
}

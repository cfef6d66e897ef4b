//! Auth error types

use keyward_core::CredentialError;
use thiserror::Error;

/// Authentication errors
///
/// Every variant carries the provider name so callers can render an
/// actionable message. Secret values never appear in any variant.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The user rejected the authorization request
    #[error("{provider}: authorization denied by the user")]
    Denied {
        /// Provider being authorized
        provider: String,
    },

    /// The device code expired before the user finished authorizing
    #[error("{provider}: device code expired, restart the login flow")]
    CodeExpired {
        /// Provider being authorized
        provider: String,
    },

    /// Stored token expired and could not be refreshed
    #[error("{provider}: stored token expired and refresh failed, run interactive login again")]
    Expired {
        /// Provider whose token expired
        provider: String,
    },

    /// Transport failure that persisted past the bounded retries
    #[error("{provider}: transport error during {phase}: {detail}")]
    Transport {
        /// Provider being authorized
        provider: String,
        /// Protocol phase (device_authorization, token_poll, token_refresh)
        phase: &'static str,
        /// Sanitized failure detail
        detail: String,
    },

    /// The flow was cancelled before completion; nothing was stored
    #[error("{provider}: login cancelled")]
    Cancelled {
        /// Provider being authorized
        provider: String,
    },

    /// No credential is stored and no interactive flow has been run
    #[error("{provider}: not authenticated, run interactive login")]
    NotAuthenticated {
        /// Provider missing a credential
        provider: String,
    },

    /// The server returned a body the protocol does not allow
    #[error("{provider}: invalid response: {detail}")]
    InvalidResponse {
        /// Provider being authorized
        provider: String,
        /// What was malformed
        detail: String,
    },

    /// Prompting the user for input failed
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// Underlying credential storage failure
    #[error(transparent)]
    Storage(#[from] CredentialError),
}

/// Result type alias for auth operations
pub type Result<T> = std::result::Result<T, AuthError>;

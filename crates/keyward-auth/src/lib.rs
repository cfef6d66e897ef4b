//! Keyward Auth - Provider authentication strategies
//!
//! This crate produces and refreshes the credentials `keyward-core` stores:
//! - `ApiKeyAuth`: retrieve-or-prompt-and-store a static API key
//! - `DeviceFlowAuth`: OAuth 2.0 Device Authorization Grant (RFC 8628)
//!   with polling, bounded transport retries, and transparent token refresh
//! - `NoAuth`: no-op strategy for unauthenticated local services
//!
//! Strategies share one [`CredentialManager`](keyward_core::CredentialManager)
//! reference and never format user-facing output themselves; device-flow
//! instructions go through an injected [`AuthPrompt`] sink.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod device_flow;
mod error;
mod strategy;
mod token;

pub use device_flow::{
    AuthSession, DeviceAuthorizationResponse, DeviceFlowAuth, DeviceFlowConfig, DeviceFlowState,
    DeviceFlowTransport, HttpTransport, TokenPollResponse, TransportError,
};
pub use error::{AuthError, Result};
pub use strategy::{ApiKeyAuth, AuthOutcome, AuthPrompt, AuthStrategy, NoAuth};
pub use token::{is_token_expired, ACCESS_TOKEN_FIELD, EXPIRES_AT_FIELD, REFRESH_TOKEN_FIELD};

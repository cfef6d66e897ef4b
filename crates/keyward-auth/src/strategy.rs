//! Authentication strategy trait and the simple strategies
//!
//! `ApiKeyAuth` and `NoAuth` live here; the device-flow strategy has its
//! own module.

use crate::error::{AuthError, Result};
use async_trait::async_trait;
use keyward_core::{CredentialManager, SecureString};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Field name for static API keys
const API_KEY_FIELD: &str = "api_key";

/// Outcome of a completed interactive authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// A credential was obtained and stored
    Authorized {
        /// Access token expiry in milliseconds since epoch, 0 if unknown
        expires_at: i64,
    },
    /// The provider needs no credential
    NotRequired,
}

/// Sink for interactive input/output the strategies never format themselves
pub trait AuthPrompt: Send + Sync {
    /// Display device-flow instructions (user code + verification URI)
    fn show_verification(&self, user_code: &str, verification_uri: &str);

    /// Ask the user for a secret value (API key entry)
    fn prompt_secret(&self, provider: &str) -> Result<String>;
}

/// A provider authentication strategy
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Provider this strategy authenticates
    fn provider(&self) -> &str;

    /// Obtain a usable credential, refreshing or prompting as the strategy
    /// allows; fails with [`AuthError::NotAuthenticated`] when interactive
    /// login is required first
    async fn get_credential(&self) -> Result<SecureString>;

    /// Run the interactive authentication flow to completion
    async fn run_interactive(&self, cancel: &CancellationToken) -> Result<AuthOutcome>;
}

/// Static API key strategy: retrieve, or prompt once and store
pub struct ApiKeyAuth {
    provider: String,
    manager: Arc<CredentialManager>,
    prompt: Arc<dyn AuthPrompt>,
}

impl ApiKeyAuth {
    /// Create a strategy for one provider
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        manager: Arc<CredentialManager>,
        prompt: Arc<dyn AuthPrompt>,
    ) -> Self {
        Self {
            provider: provider.into(),
            manager,
            prompt,
        }
    }

    fn prompt_and_store(&self) -> Result<SecureString> {
        let value = self.prompt.prompt_secret(&self.provider)?;
        if value.trim().is_empty() {
            return Err(AuthError::Prompt(format!(
                "empty API key entered for {}",
                self.provider
            )));
        }
        self.manager
            .store_credential(&self.provider, API_KEY_FIELD, value.trim())?;
        info!(provider = %self.provider, "stored API key");
        Ok(SecureString::new(value.trim()))
    }
}

#[async_trait]
impl AuthStrategy for ApiKeyAuth {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn get_credential(&self) -> Result<SecureString> {
        if let Some(key) = self.manager.get_credential(&self.provider, API_KEY_FIELD)? {
            return Ok(key);
        }
        debug!(provider = %self.provider, "no stored API key, prompting");
        self.prompt_and_store()
    }

    async fn run_interactive(&self, _cancel: &CancellationToken) -> Result<AuthOutcome> {
        self.prompt_and_store()?;
        Ok(AuthOutcome::Authorized { expires_at: 0 })
    }
}

/// No-op strategy for providers without credentials (local services)
///
/// Always reports authenticated; the credential manager is never consulted.
pub struct NoAuth {
    provider: String,
}

impl NoAuth {
    /// Create a strategy for one provider
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl AuthStrategy for NoAuth {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn get_credential(&self) -> Result<SecureString> {
        Ok(SecureString::new(""))
    }

    async fn run_interactive(&self, _cancel: &CancellationToken) -> Result<AuthOutcome> {
        Ok(AuthOutcome::NotRequired)
    }
}

//! OAuth 2.0 Device Authorization Grant (RFC 8628)
//!
//! The strategy requests a device code, hands the user code and
//! verification URI to the injected prompt sink, then polls the token
//! endpoint until a terminal state:
//!
//! ```text
//! Init -> CodeRequested -> Polling -> { Authorized, Denied, Expired, Failed }
//! ```
//!
//! Tokens are stored through the credential manager only when the
//! Authorized transition completes; cancellation or any earlier exit leaves
//! no partial writes.

use crate::error::{AuthError, Result};
use crate::strategy::{AuthOutcome, AuthPrompt, AuthStrategy};
use crate::token::{
    expiry_from_expires_in, is_token_expired, ACCESS_TOKEN_FIELD, EXPIRES_AT_FIELD,
    REFRESH_TOKEN_FIELD,
};
use async_trait::async_trait;
use keyward_core::{CredentialManager, SecureString};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// RFC 8628 floor for the polling interval
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Added to the interval on every `slow_down`
const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);
/// Consecutive transport failures tolerated before giving up
const MAX_TRANSPORT_FAILURES: u32 = 3;
/// Base delay for the transport retry backoff (doubles per failure)
const RETRY_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Provider endpoints and client identity for the device flow
#[derive(Debug, Clone)]
pub struct DeviceFlowConfig {
    /// OAuth2 client ID
    pub client_id: String,
    /// Space-separated scopes
    pub scopes: String,
    /// Device authorization endpoint URL
    pub device_authorization_url: String,
    /// Token endpoint URL
    pub token_url: String,
}

/// Device authorization endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorizationResponse {
    /// Opaque code the client polls with
    pub device_code: String,
    /// Short code the user enters in a browser
    pub user_code: String,
    /// Where the user enters the code
    pub verification_uri: String,
    /// Seconds until the device code expires
    pub expires_in: i64,
    /// Suggested polling interval in seconds
    #[serde(default)]
    pub interval: Option<u64>,
}

/// Token endpoint response (success or RFC 8628 error signal)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenPollResponse {
    /// Granted access token
    #[serde(default)]
    pub access_token: Option<String>,
    /// Granted refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Protocol error code (`authorization_pending`, `slow_down`,
    /// `access_denied`, `expired_token`)
    #[serde(default)]
    pub error: Option<String>,
}

/// Transport-level failure (network, TLS, unparseable body)
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// HTTP capability consumed by the device flow
#[async_trait]
pub trait DeviceFlowTransport: Send + Sync {
    /// Issue the device authorization request
    async fn request_device_code(
        &self,
        config: &DeviceFlowConfig,
    ) -> std::result::Result<DeviceAuthorizationResponse, TransportError>;

    /// Poll the token endpoint with the device code
    async fn poll_token(
        &self,
        config: &DeviceFlowConfig,
        device_code: &str,
    ) -> std::result::Result<TokenPollResponse, TransportError>;

    /// Exchange a refresh token for a new access token
    async fn refresh_token(
        &self,
        config: &DeviceFlowConfig,
        refresh_token: &str,
    ) -> std::result::Result<TokenPollResponse, TransportError>;
}

/// `reqwest`-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a 30-second request timeout
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn post_token_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> std::result::Result<TokenPollResponse, TransportError> {
        let resp = self
            .client
            .post(url)
            .form(form)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| TransportError(format!("token endpoint: {}", e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError(format!("token endpoint body: {}", e)))?;

        // RFC 8628 signals protocol errors in a JSON body with 4xx status,
        // so parse the body regardless of status
        serde_json::from_str(&body).map_err(|_| {
            TransportError(format!("token endpoint returned HTTP {} with unparseable body", status))
        })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceFlowTransport for HttpTransport {
    async fn request_device_code(
        &self,
        config: &DeviceFlowConfig,
    ) -> std::result::Result<DeviceAuthorizationResponse, TransportError> {
        let resp = self
            .client
            .post(&config.device_authorization_url)
            .form(&[
                ("client_id", config.client_id.as_str()),
                ("scope", config.scopes.as_str()),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| TransportError(format!("device authorization endpoint: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError(format!(
                "device authorization endpoint returned HTTP {}",
                status
            )));
        }

        resp.json()
            .await
            .map_err(|e| TransportError(format!("device authorization response: {}", e)))
    }

    async fn poll_token(
        &self,
        config: &DeviceFlowConfig,
        device_code: &str,
    ) -> std::result::Result<TokenPollResponse, TransportError> {
        self.post_token_form(
            &config.token_url,
            &[
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("device_code", device_code),
                ("client_id", config.client_id.as_str()),
            ],
        )
        .await
    }

    async fn refresh_token(
        &self,
        config: &DeviceFlowConfig,
        refresh_token: &str,
    ) -> std::result::Result<TokenPollResponse, TransportError> {
        self.post_token_form(
            &config.token_url,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", config.client_id.as_str()),
            ],
        )
        .await
    }
}

/// Device flow states; the last four are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFlowState {
    /// Nothing requested yet
    Init,
    /// Device code obtained, instructions not yet shown
    CodeRequested,
    /// Waiting for the user to authorize in the browser
    Polling,
    /// Token granted and stored
    Authorized,
    /// User rejected the authorization request
    Denied,
    /// Device code expired before authorization
    Expired,
    /// Transport failed past the bounded retries
    Failed,
}

/// Transient per-attempt state of one device flow run
#[derive(Debug)]
pub struct AuthSession {
    /// Short code the user enters in a browser
    pub user_code: String,
    /// Where the user enters the code
    pub verification_uri: String,
    /// Current polling interval (grows on `slow_down`)
    pub interval: Duration,
    /// When the device code stops being valid
    pub expires_at: Instant,
    /// Current (possibly terminal) state
    pub state: DeviceFlowState,
    /// Stored access token expiry (ms since epoch), 0 when unknown
    pub token_expires_at: i64,
    device_code: String,
}

impl AuthSession {
    fn remaining_secs(&self) -> u64 {
        self.expires_at
            .checked_duration_since(Instant::now())
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// OAuth 2.0 Device Authorization Grant strategy
pub struct DeviceFlowAuth {
    provider: String,
    config: DeviceFlowConfig,
    manager: Arc<CredentialManager>,
    transport: Arc<dyn DeviceFlowTransport>,
    prompt: Arc<dyn AuthPrompt>,
}

impl DeviceFlowAuth {
    /// Create a strategy with an explicit transport (tests, embedding)
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        config: DeviceFlowConfig,
        manager: Arc<CredentialManager>,
        transport: Arc<dyn DeviceFlowTransport>,
        prompt: Arc<dyn AuthPrompt>,
    ) -> Self {
        Self {
            provider: provider.into(),
            config,
            manager,
            transport,
            prompt,
        }
    }

    /// Create a strategy using the `reqwest` transport
    #[must_use]
    pub fn with_http(
        provider: impl Into<String>,
        config: DeviceFlowConfig,
        manager: Arc<CredentialManager>,
        prompt: Arc<dyn AuthPrompt>,
    ) -> Self {
        Self::new(provider, config, manager, Arc::new(HttpTransport::new()), prompt)
    }

    /// Sleep for `duration` unless the flow is cancelled first
    async fn wait(&self, cancel: &CancellationToken, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AuthError::Cancelled {
                provider: self.provider.clone(),
            }),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    fn store_tokens(&self, access: &str, refresh: Option<&str>, expires_at: i64) -> Result<()> {
        self.manager
            .store_credential(&self.provider, ACCESS_TOKEN_FIELD, access)?;
        if let Some(refresh) = refresh {
            self.manager
                .store_credential(&self.provider, REFRESH_TOKEN_FIELD, refresh)?;
        }
        if expires_at > 0 {
            self.manager.store_credential(
                &self.provider,
                EXPIRES_AT_FIELD,
                &expires_at.to_string(),
            )?;
        } else {
            self.manager
                .delete_credential(&self.provider, EXPIRES_AT_FIELD)?;
        }
        Ok(())
    }

    /// Drive one full device flow attempt to a terminal session state.
    ///
    /// Returns `Ok` with the session in `Authorized`, `Denied`, or `Expired`;
    /// errors are reserved for cancellation, storage failures, protocol
    /// violations, and transport failures past the bounded retries.
    pub async fn run_device_flow(&self, cancel: &CancellationToken) -> Result<AuthSession> {
        debug!(provider = %self.provider, "requesting device authorization");
        let auth = self
            .transport
            .request_device_code(&self.config)
            .await
            .map_err(|e| AuthError::Transport {
                provider: self.provider.clone(),
                phase: "device_authorization",
                detail: e.to_string(),
            })?;

        let mut session = AuthSession {
            user_code: auth.user_code,
            verification_uri: auth.verification_uri,
            interval: Duration::from_secs(auth.interval.unwrap_or(0)).max(MIN_POLL_INTERVAL),
            expires_at: Instant::now() + Duration::from_secs(auth.expires_in.max(0) as u64),
            state: DeviceFlowState::CodeRequested,
            token_expires_at: 0,
            device_code: auth.device_code,
        };

        self.prompt
            .show_verification(&session.user_code, &session.verification_uri);
        session.state = DeviceFlowState::Polling;
        info!(
            provider = %self.provider,
            user_code = %session.user_code,
            expires_in = session.remaining_secs(),
            "polling for device authorization"
        );

        let mut failures: u32 = 0;
        loop {
            // Absolute expiry wins over whatever the server last said
            if Instant::now() >= session.expires_at {
                warn!(provider = %self.provider, "device code expired before authorization");
                session.state = DeviceFlowState::Expired;
                return Ok(session);
            }

            self.wait(cancel, session.interval).await?;

            // The code may have crossed its expiry during the sleep; never
            // poll a dead code
            if Instant::now() >= session.expires_at {
                continue;
            }

            let resp = match self
                .transport
                .poll_token(&self.config, &session.device_code)
                .await
            {
                Ok(resp) => {
                    failures = 0;
                    resp
                }
                Err(e) => {
                    failures += 1;
                    if failures >= MAX_TRANSPORT_FAILURES {
                        session.state = DeviceFlowState::Failed;
                        return Err(AuthError::Transport {
                            provider: self.provider.clone(),
                            phase: "token_poll",
                            detail: format!("{} ({}s until code expiry)", e, session.remaining_secs()),
                        });
                    }
                    let backoff = RETRY_BACKOFF_BASE * 2u32.pow(failures - 1);
                    warn!(
                        provider = %self.provider,
                        attempt = failures,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "token poll failed, retrying"
                    );
                    self.wait(cancel, backoff).await?;
                    continue;
                }
            };

            match resp.error.as_deref() {
                Some("authorization_pending") => {}
                Some("slow_down") => {
                    session.interval += SLOW_DOWN_INCREMENT;
                    debug!(
                        provider = %self.provider,
                        interval_secs = session.interval.as_secs(),
                        "server asked to slow down"
                    );
                }
                Some("access_denied") => {
                    session.state = DeviceFlowState::Denied;
                    return Ok(session);
                }
                Some("expired_token") => {
                    session.state = DeviceFlowState::Expired;
                    return Ok(session);
                }
                Some(other) => {
                    return Err(AuthError::InvalidResponse {
                        provider: self.provider.clone(),
                        detail: format!("unknown token error code: {}", other),
                    });
                }
                None => {
                    let access = resp.access_token.ok_or_else(|| AuthError::InvalidResponse {
                        provider: self.provider.clone(),
                        detail: "token response carries neither access_token nor error".to_string(),
                    })?;
                    let expires_at = expiry_from_expires_in(resp.expires_in);
                    self.store_tokens(&access, resp.refresh_token.as_deref(), expires_at)?;
                    session.token_expires_at = expires_at;
                    session.state = DeviceFlowState::Authorized;
                    info!(provider = %self.provider, "device flow authorized, token stored");
                    return Ok(session);
                }
            }
        }
    }

    /// Refresh the stored access token using the stored refresh token.
    ///
    /// One attempt only; any failure surfaces as [`AuthError::Expired`] so
    /// the caller restarts the interactive flow instead of looping.
    async fn refresh(&self, refresh_token: &SecureString) -> Result<SecureString> {
        debug!(provider = %self.provider, "access token expired, refreshing");
        let resp = self
            .transport
            .refresh_token(&self.config, refresh_token.expose())
            .await
            .map_err(|e| {
                warn!(provider = %self.provider, error = %e, "token refresh transport failure");
                AuthError::Expired {
                    provider: self.provider.clone(),
                }
            })?;

        match (resp.error, resp.access_token) {
            (None, Some(access)) => {
                let expires_at = expiry_from_expires_in(resp.expires_in);
                // Keep the old refresh token when the server omits a new one
                self.store_tokens(&access, resp.refresh_token.as_deref(), expires_at)?;
                info!(provider = %self.provider, "access token refreshed");
                Ok(SecureString::new(access))
            }
            (error, _) => {
                warn!(
                    provider = %self.provider,
                    error = error.as_deref().unwrap_or("no access_token in response"),
                    "token refresh rejected"
                );
                Err(AuthError::Expired {
                    provider: self.provider.clone(),
                })
            }
        }
    }
}

#[async_trait]
impl AuthStrategy for DeviceFlowAuth {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn get_credential(&self) -> Result<SecureString> {
        let Some(access) = self
            .manager
            .get_credential(&self.provider, ACCESS_TOKEN_FIELD)?
        else {
            return Err(AuthError::NotAuthenticated {
                provider: self.provider.clone(),
            });
        };

        let expires_at = self
            .manager
            .get_credential(&self.provider, EXPIRES_AT_FIELD)?
            .and_then(|v| v.expose().parse::<i64>().ok())
            .unwrap_or(0);

        if !is_token_expired(expires_at) {
            return Ok(access);
        }

        match self
            .manager
            .get_credential(&self.provider, REFRESH_TOKEN_FIELD)?
        {
            Some(refresh) => self.refresh(&refresh).await,
            None => Err(AuthError::Expired {
                provider: self.provider.clone(),
            }),
        }
    }

    async fn run_interactive(&self, cancel: &CancellationToken) -> Result<AuthOutcome> {
        let session = self.run_device_flow(cancel).await?;
        match session.state {
            DeviceFlowState::Authorized => Ok(AuthOutcome::Authorized {
                expires_at: session.token_expires_at,
            }),
            DeviceFlowState::Denied => Err(AuthError::Denied {
                provider: self.provider.clone(),
            }),
            // Expired, plus any state run_device_flow cannot actually
            // return without an error
            _ => Err(AuthError::CodeExpired {
                provider: self.provider.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::{in_memory_manager, ScriptedPrompt};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn test_config() -> DeviceFlowConfig {
        DeviceFlowConfig {
            client_id: "keyward-test".to_string(),
            scopes: "profile".to_string(),
            device_authorization_url: "https://auth.example.com/device".to_string(),
            token_url: "https://auth.example.com/token".to_string(),
        }
    }

    fn auth_response(expires_in: i64) -> DeviceAuthorizationResponse {
        DeviceAuthorizationResponse {
            device_code: "dev-code-1".to_string(),
            user_code: "ABCD-1234".to_string(),
            verification_uri: "https://auth.example.com/activate".to_string(),
            expires_in,
            interval: None,
        }
    }

    fn pending() -> std::result::Result<TokenPollResponse, TransportError> {
        Ok(TokenPollResponse {
            error: Some("authorization_pending".to_string()),
            ..Default::default()
        })
    }

    fn poll_error(code: &str) -> std::result::Result<TokenPollResponse, TransportError> {
        Ok(TokenPollResponse {
            error: Some(code.to_string()),
            ..Default::default()
        })
    }

    fn granted(access: &str, refresh: Option<&str>) -> std::result::Result<TokenPollResponse, TransportError> {
        Ok(TokenPollResponse {
            access_token: Some(access.to_string()),
            refresh_token: refresh.map(String::from),
            expires_in: Some(3600),
            error: None,
        })
    }

    /// Transport that replays a scripted poll/refresh sequence
    struct ScriptedTransport {
        auth: DeviceAuthorizationResponse,
        polls: Mutex<VecDeque<std::result::Result<TokenPollResponse, TransportError>>>,
        refreshes: Mutex<VecDeque<std::result::Result<TokenPollResponse, TransportError>>>,
    }

    impl ScriptedTransport {
        fn new(
            auth: DeviceAuthorizationResponse,
            polls: Vec<std::result::Result<TokenPollResponse, TransportError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                auth,
                polls: Mutex::new(polls.into()),
                refreshes: Mutex::new(VecDeque::new()),
            })
        }

        fn with_refreshes(
            self: Arc<Self>,
            refreshes: Vec<std::result::Result<TokenPollResponse, TransportError>>,
        ) -> Arc<Self> {
            *self.refreshes.lock().unwrap() = refreshes.into();
            self
        }
    }

    #[async_trait]
    impl DeviceFlowTransport for ScriptedTransport {
        async fn request_device_code(
            &self,
            _config: &DeviceFlowConfig,
        ) -> std::result::Result<DeviceAuthorizationResponse, TransportError> {
            Ok(self.auth.clone())
        }

        async fn poll_token(
            &self,
            _config: &DeviceFlowConfig,
            device_code: &str,
        ) -> std::result::Result<TokenPollResponse, TransportError> {
            assert_eq!(device_code, self.auth.device_code);
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(pending)
        }

        async fn refresh_token(
            &self,
            _config: &DeviceFlowConfig,
            _refresh_token: &str,
        ) -> std::result::Result<TokenPollResponse, TransportError> {
            self.refreshes
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected refresh call")
        }
    }

    fn flow(
        manager: Arc<CredentialManager>,
        transport: Arc<ScriptedTransport>,
        prompt: Arc<ScriptedPrompt>,
    ) -> DeviceFlowAuth {
        DeviceFlowAuth::new("github", test_config(), manager, transport, prompt)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_slow_down_then_success() {
        let manager = in_memory_manager();
        let transport = ScriptedTransport::new(
            auth_response(600),
            vec![pending(), poll_error("slow_down"), granted("at-1", Some("rt-1"))],
        );
        let prompt = ScriptedPrompt::with_secret("unused");
        let auth = flow(manager.clone(), transport, prompt.clone());

        let session = auth.run_device_flow(&CancellationToken::new()).await.unwrap();
        assert_eq!(session.state, DeviceFlowState::Authorized);

        // Interval strictly increased past the 5s floor after slow_down
        assert!(session.interval > MIN_POLL_INTERVAL);
        assert_eq!(session.interval, Duration::from_secs(10));

        // Tokens stored with expiry metadata
        assert_eq!(
            manager.get_credential("github", ACCESS_TOKEN_FIELD).unwrap().unwrap().expose(),
            "at-1"
        );
        assert_eq!(
            manager.get_credential("github", REFRESH_TOKEN_FIELD).unwrap().unwrap().expose(),
            "rt-1"
        );
        assert!(manager.credential_exists("github", EXPIRES_AT_FIELD).unwrap());

        // Instructions went through the sink
        let shown = prompt.shown.lock().unwrap();
        assert_eq!(
            shown.as_slice(),
            &[("ABCD-1234".to_string(), "https://auth.example.com/activate".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_succeeding_ends_expired() {
        let manager = in_memory_manager();
        // Code expires after 7s; polls every 5s and never succeeds
        let transport = ScriptedTransport::new(auth_response(7), vec![]);
        let auth = flow(manager.clone(), transport, ScriptedPrompt::with_secret(""));

        let session = auth.run_device_flow(&CancellationToken::new()).await.unwrap();
        assert_eq!(session.state, DeviceFlowState::Expired);
        assert!(manager.get_credential("github", ACCESS_TOKEN_FIELD).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_poll_after_expiry_mid_sleep() {
        let manager = in_memory_manager();
        // Code expires 3s in, during the first 5s sleep; the queued grant
        // must never be polled
        let transport = ScriptedTransport::new(auth_response(3), vec![granted("at-late", None)]);
        let auth = flow(manager.clone(), transport.clone(), ScriptedPrompt::with_secret(""));

        let session = auth.run_device_flow(&CancellationToken::new()).await.unwrap();
        assert_eq!(session.state, DeviceFlowState::Expired);
        assert!(manager.get_credential("github", ACCESS_TOKEN_FIELD).unwrap().is_none());
        // The scripted grant is still queued: no poll happened after expiry
        assert_eq!(transport.polls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_denied_is_terminal() {
        let manager = in_memory_manager();
        let transport =
            ScriptedTransport::new(auth_response(600), vec![pending(), poll_error("access_denied")]);
        let auth = flow(manager.clone(), transport, ScriptedPrompt::with_secret(""));

        let err = auth.run_interactive(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::Denied { .. }));
        assert!(manager.get_credential("github", ACCESS_TOKEN_FIELD).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_expired_token_is_terminal() {
        let manager = in_memory_manager();
        let transport =
            ScriptedTransport::new(auth_response(600), vec![poll_error("expired_token")]);
        let auth = flow(manager, transport, ScriptedPrompt::with_secret(""));

        let err = auth.run_interactive(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::CodeExpired { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_bounded() {
        let manager = in_memory_manager();
        let transport = ScriptedTransport::new(
            auth_response(600),
            vec![
                Err(TransportError("connection reset".to_string())),
                Err(TransportError("connection reset".to_string())),
                Err(TransportError("connection reset".to_string())),
            ],
        );
        let auth = flow(manager, transport, ScriptedPrompt::with_secret(""));

        let err = auth.run_device_flow(&CancellationToken::new()).await.unwrap_err();
        match err {
            AuthError::Transport { phase, detail, .. } => {
                assert_eq!(phase, "token_poll");
                // Error reports the time left so the user knows a restart helps
                assert!(detail.contains("until code expiry"));
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_transport_failure_recovers() {
        let manager = in_memory_manager();
        let transport = ScriptedTransport::new(
            auth_response(600),
            vec![
                Err(TransportError("timeout".to_string())),
                granted("at-2", None),
            ],
        );
        let auth = flow(manager.clone(), transport, ScriptedPrompt::with_secret(""));

        let session = auth.run_device_flow(&CancellationToken::new()).await.unwrap();
        assert_eq!(session.state, DeviceFlowState::Authorized);
        assert_eq!(
            manager.get_credential("github", ACCESS_TOKEN_FIELD).unwrap().unwrap().expose(),
            "at-2"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stores_nothing() {
        let manager = in_memory_manager();
        let transport = ScriptedTransport::new(auth_response(600), vec![granted("at-3", None)]);
        let auth = flow(manager.clone(), transport, ScriptedPrompt::with_secret(""));

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = auth.run_device_flow(&cancel).await.unwrap_err();
        assert!(matches!(err, AuthError::Cancelled { .. }));
        assert!(manager.get_credential("github", ACCESS_TOKEN_FIELD).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_credential_not_authenticated() {
        let manager = in_memory_manager();
        let transport = ScriptedTransport::new(auth_response(600), vec![]);
        let auth = flow(manager, transport, ScriptedPrompt::with_secret(""));

        assert!(matches!(
            auth.get_credential().await,
            Err(AuthError::NotAuthenticated { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_credential_valid_token_no_refresh() {
        let manager = in_memory_manager();
        manager.store_credential("github", ACCESS_TOKEN_FIELD, "at-valid").unwrap();
        let future = chrono::Utc::now().timestamp_millis() + 3_600_000;
        manager
            .store_credential("github", EXPIRES_AT_FIELD, &future.to_string())
            .unwrap();

        // No scripted refreshes: a refresh call would panic
        let transport = ScriptedTransport::new(auth_response(600), vec![]);
        let auth = flow(manager, transport, ScriptedPrompt::with_secret(""));

        assert_eq!(auth.get_credential().await.unwrap().expose(), "at-valid");
    }

    #[tokio::test]
    async fn test_get_credential_refreshes_expired_token() {
        let manager = in_memory_manager();
        manager.store_credential("github", ACCESS_TOKEN_FIELD, "at-stale").unwrap();
        manager.store_credential("github", REFRESH_TOKEN_FIELD, "rt-1").unwrap();
        let past = chrono::Utc::now().timestamp_millis() - 1000;
        manager
            .store_credential("github", EXPIRES_AT_FIELD, &past.to_string())
            .unwrap();

        let transport = ScriptedTransport::new(auth_response(600), vec![])
            .with_refreshes(vec![granted("at-fresh", None)]);
        let auth = flow(manager.clone(), transport, ScriptedPrompt::with_secret(""));

        assert_eq!(auth.get_credential().await.unwrap().expose(), "at-fresh");
        assert_eq!(
            manager.get_credential("github", ACCESS_TOKEN_FIELD).unwrap().unwrap().expose(),
            "at-fresh"
        );
        // Old refresh token kept when the server omits a new one
        assert_eq!(
            manager.get_credential("github", REFRESH_TOKEN_FIELD).unwrap().unwrap().expose(),
            "rt-1"
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces_expired() {
        let manager = in_memory_manager();
        manager.store_credential("github", ACCESS_TOKEN_FIELD, "at-stale").unwrap();
        manager.store_credential("github", REFRESH_TOKEN_FIELD, "rt-dead").unwrap();
        let past = chrono::Utc::now().timestamp_millis() - 1000;
        manager
            .store_credential("github", EXPIRES_AT_FIELD, &past.to_string())
            .unwrap();

        let transport = ScriptedTransport::new(auth_response(600), vec![]).with_refreshes(vec![
            Ok(TokenPollResponse {
                error: Some("invalid_grant".to_string()),
                ..Default::default()
            }),
        ]);
        let auth = flow(manager, transport, ScriptedPrompt::with_secret(""));

        assert!(matches!(
            auth.get_credential().await,
            Err(AuthError::Expired { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let manager = in_memory_manager();
        manager.store_credential("github", ACCESS_TOKEN_FIELD, "at-stale").unwrap();
        let past = chrono::Utc::now().timestamp_millis() - 1000;
        manager
            .store_credential("github", EXPIRES_AT_FIELD, &past.to_string())
            .unwrap();

        let transport = ScriptedTransport::new(auth_response(600), vec![]);
        let auth = flow(manager, transport, ScriptedPrompt::with_secret(""));

        assert!(matches!(
            auth.get_credential().await,
            Err(AuthError::Expired { .. })
        ));
    }
}

//! Stored token field names and expiry checks

/// Field under which the access token is stored
pub const ACCESS_TOKEN_FIELD: &str = "access_token";
/// Field under which the refresh token is stored
pub const REFRESH_TOKEN_FIELD: &str = "refresh_token";
/// Field holding the access token expiry (milliseconds since Unix epoch)
pub const EXPIRES_AT_FIELD: &str = "expires_at";

/// Refresh slightly before the wire expiry to absorb clock skew
const EXPIRY_BUFFER_MS: i64 = 5 * 60 * 1000;

/// Check if a token is expired (with 5-minute buffer).
///
/// `expires_at` is milliseconds since Unix epoch; `0` means the expiry is
/// unknown and the token is assumed valid (it will fail at request time).
#[must_use]
pub fn is_token_expired(expires_at: i64) -> bool {
    if expires_at == 0 {
        return false;
    }
    chrono::Utc::now().timestamp_millis() >= expires_at - EXPIRY_BUFFER_MS
}

/// Convert a token-endpoint `expires_in` (seconds) into an absolute expiry
pub(crate) fn expiry_from_expires_in(expires_in: Option<i64>) -> i64 {
    expires_in
        .map(|secs| chrono::Utc::now().timestamp_millis() + secs * 1000)
        .unwrap_or(0)
}

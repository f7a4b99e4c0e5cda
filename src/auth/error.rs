use thiserror::Error;

use crate::store::StoreError;

/// Errors from the OAuth token lifecycle.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authorization-code exchange was rejected or never reached the server.
    #[error("Grant token exchange failed: {0}")]
    AuthExchange(String),

    /// The refresh grant failed. Needs a fresh `authorize` if the refresh
    /// token was revoked.
    #[error("Access token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Credential configuration '{0}' not found; run `crm-sync configure` first")]
    NotConfigured(String),

    #[error("Invalid authorization URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

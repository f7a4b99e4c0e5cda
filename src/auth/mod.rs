//! OAuth2 token lifecycle for the CRM API.
//!
//! Authorization-code grant → access/refresh token pair → expiry-gated
//! refresh before every API call. There is no background renewal: whoever is
//! about to call the API runs [`TokenManager::ensure_valid_token`] first.

pub mod callback;
pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod responses;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use url::Url;

use self::credentials::Credentials;
use self::endpoints::Endpoints;
use self::error::AuthError;
use self::responses::TokenResponse;
use crate::crm::session::{ApiResponse, ApiSession};
use crate::store::CredentialStore;

/// Scopes requested when the caller does not override them.
pub const DEFAULT_SCOPES: &[&str] = &[
    "ZohoCRM.modules.ALL",
    "ZohoCRM.settings.fields.READ",
    "ZohoBooks.settings.READ",
];

/// Token lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Issues, exchanges and refreshes tokens for one OAuth client, persisting
/// every change to the credential store.
pub struct TokenManager {
    session: Arc<dyn ApiSession>,
    endpoints: Endpoints,
    store: Arc<dyn CredentialStore>,
    scopes: Vec<String>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("endpoints", &self.endpoints)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

fn expiry_from(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    now + Duration::seconds(expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS))
}

/// Decode a token endpoint reply, returning the upstream body verbatim on
/// any kind of rejection.
fn parse_token_response(response: &ApiResponse) -> Result<TokenResponse, String> {
    if !response.is_success() {
        return Err(format!("HTTP {}: {}", response.status, response.body));
    }
    let token: TokenResponse = response
        .json()
        .map_err(|_| format!("unexpected response: {}", response.body))?;
    if token.error.is_some() || token.access_token.is_none() {
        return Err(response.body.clone());
    }
    Ok(token)
}

impl TokenManager {
    pub fn new(
        session: Arc<dyn ApiSession>,
        endpoints: Endpoints,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            session,
            endpoints,
            store,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the requested scopes. An empty list keeps the defaults.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        if !scopes.is_empty() {
            self.scopes = scopes;
        }
        self
    }

    /// Consent URL the user must open to grant offline access.
    ///
    /// Pure function of the credentials and scopes.
    pub fn build_authorization_url(&self, credentials: &Credentials) -> Result<Url, AuthError> {
        let url = Url::parse_with_params(
            &self.endpoints.authorize_url(),
            &[
                ("scope", self.scopes.join(",")),
                ("client_id", credentials.client_id.clone()),
                ("response_type", "code".to_string()),
                ("access_type", "offline".to_string()),
                ("redirect_uri", credentials.redirect_uri.clone()),
            ],
        )?;
        Ok(url)
    }

    /// Trade a one-time grant token for an access/refresh token pair.
    pub async fn exchange_grant_token(
        &self,
        credentials: &mut Credentials,
        grant_token: &str,
    ) -> Result<(), AuthError> {
        let form = [
            ("grant_type", "authorization_code".to_string()),
            ("client_id", credentials.client_id.clone()),
            ("client_secret", credentials.client_secret.clone()),
            ("redirect_uri", credentials.redirect_uri.clone()),
            ("code", grant_token.to_string()),
        ];

        let response = self
            .session
            .post_form(&self.endpoints.token_url(), &form)
            .await
            .map_err(|e| AuthError::AuthExchange(format!("transport error: {:#}", e)))?;
        let token = parse_token_response(&response).map_err(AuthError::AuthExchange)?;

        let now = Utc::now();
        credentials.access_token = token.access_token.unwrap_or_default();
        match token.refresh_token {
            Some(refresh_token) => credentials.refresh_token = refresh_token,
            None => tracing::warn!(
                "Token endpoint returned no refresh token; keeping the previous one"
            ),
        }
        credentials.token_expiry = Some(expiry_from(now, token.expires_in));
        self.store.save_credentials(credentials).await?;

        tracing::info!(
            config = %credentials.name,
            "Grant token exchanged; access token valid until {:?}",
            credentials.token_expiry
        );
        Ok(())
    }

    /// Refresh the access token if it is missing or expired. No-op otherwise.
    pub async fn ensure_valid_token(&self, credentials: &mut Credentials) -> Result<(), AuthError> {
        if credentials.needs_refresh(Utc::now()) {
            tracing::debug!(config = %credentials.name, "Access token expired or missing");
            self.refresh_access_token(credentials).await?;
        }
        Ok(())
    }

    /// Obtain a new access token with the stored refresh token.
    ///
    /// The refresh token itself is kept as is, even if the server sends a new one.
    pub async fn refresh_access_token(
        &self,
        credentials: &mut Credentials,
    ) -> Result<(), AuthError> {
        if credentials.refresh_token.is_empty() {
            return Err(AuthError::TokenRefresh(
                "no refresh token stored; run `crm-sync authorize` to grant access".into(),
            ));
        }

        let form = [
            ("grant_type", "refresh_token".to_string()),
            ("client_id", credentials.client_id.clone()),
            ("client_secret", credentials.client_secret.clone()),
            ("refresh_token", credentials.refresh_token.clone()),
        ];

        let response = self
            .session
            .post_form(&self.endpoints.token_url(), &form)
            .await
            .map_err(|e| AuthError::TokenRefresh(format!("transport error: {:#}", e)))?;
        let token = parse_token_response(&response).map_err(AuthError::TokenRefresh)?;

        let now = Utc::now();
        credentials.access_token = token.access_token.unwrap_or_default();
        credentials.token_expiry = Some(expiry_from(now, token.expires_in));
        self.store.save_credentials(credentials).await?;

        tracing::debug!(config = %credentials.name, "Access token refreshed");
        Ok(())
    }
}

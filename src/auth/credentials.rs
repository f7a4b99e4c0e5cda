use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Shared handle to one credential configuration.
///
/// Every token check and refresh runs with the lock held, so all users of a
/// handle observe a consistent access-token/expiry pair.
pub type SharedCredentials = Arc<tokio::sync::Mutex<Credentials>>;

/// Where a credential configuration sits in the OAuth lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No grant has been exchanged yet.
    Unauthorized,
    /// Access token present and not yet expired.
    Authorized,
    /// Access token missing or past its expiry; a refresh is needed.
    Expired,
}

impl TokenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Authorized => "authorized",
            Self::Expired => "expired",
        }
    }
}

/// OAuth client registration plus the tokens issued to it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expiry: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("access_token_set", &!self.access_token.is_empty())
            .field("refresh_token_set", &!self.refresh_token.is_empty())
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}

impl Credentials {
    pub fn new(name: &str, client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            name: name.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            ..Self::default()
        }
    }

    /// Replace the client registration. Tokens issued to a different client
    /// id are useless, so they are dropped when the id changes.
    pub fn reconfigure(&mut self, client_id: &str, client_secret: &str, redirect_uri: &str) {
        if self.client_id != client_id {
            self.access_token.clear();
            self.refresh_token.clear();
            self.token_expiry = None;
        }
        self.client_id = client_id.to_string();
        self.client_secret = client_secret.to_string();
        self.redirect_uri = redirect_uri.to_string();
    }

    /// True when the access token cannot be used at `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        match self.token_expiry {
            Some(expiry) => now >= expiry,
            None => true,
        }
    }

    pub fn token_state(&self, now: DateTime<Utc>) -> TokenState {
        if self.access_token.is_empty() && self.refresh_token.is_empty() {
            TokenState::Unauthorized
        } else if self.needs_refresh(now) {
            TokenState::Expired
        } else {
            TokenState::Authorized
        }
    }
}

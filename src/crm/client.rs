use std::sync::Arc;

use crate::auth::credentials::SharedCredentials;
use crate::auth::endpoints::Endpoints;
use crate::auth::TokenManager;

use super::error::CrmError;
use super::session::ApiSession;

/// Authenticated access to the CRM and Books APIs for one credential
/// configuration.
///
/// Every request goes through [`CrmClient::auth_headers`], which runs the
/// token pre-flight check with the credential lock held.
pub struct CrmClient {
    pub(super) session: Arc<dyn ApiSession>,
    pub(super) endpoints: Endpoints,
    tokens: Arc<TokenManager>,
    credentials: SharedCredentials,
}

impl std::fmt::Debug for CrmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmClient")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl CrmClient {
    pub fn new(
        session: Arc<dyn ApiSession>,
        endpoints: Endpoints,
        tokens: Arc<TokenManager>,
        credentials: SharedCredentials,
    ) -> Self {
        Self {
            session,
            endpoints,
            tokens,
            credentials,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Headers for one API call, refreshing the access token first if needed.
    pub async fn auth_headers(&self) -> Result<Vec<(&'static str, String)>, CrmError> {
        let mut credentials = self.credentials.lock().await;
        self.tokens.ensure_valid_token(&mut credentials).await?;
        Ok(vec![(
            "Authorization",
            format!("Zoho-oauthtoken {}", credentials.access_token),
        )])
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::client_with;
    use super::*;
    use crate::auth::credentials::Credentials;
    use crate::crm::session::ApiResponse;
    use crate::crm::testing::ScriptedSession;
    use crate::store::SqliteRecordStore;
    use crate::types::Domain;

    #[tokio::test]
    async fn test_auth_header_uses_current_token() {
        let session = Arc::new(ScriptedSession::new(|_| Ok(ApiResponse::new(200, "{}"))));
        let client = client_with(session.clone());
        let headers = client.auth_headers().await.unwrap();
        assert_eq!(headers[0], ("Authorization", "Zoho-oauthtoken T".to_string()));
        assert!(session.requests().is_empty());
    }

    #[tokio::test]
    async fn test_auth_header_refreshes_expired_token() {
        let session = Arc::new(ScriptedSession::new(|_| {
            Ok(ApiResponse::new(200, r#"{"access_token":"fresh"}"#))
        }));
        let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
        let endpoints = Endpoints::for_domain(Domain::Com);
        let tokens = Arc::new(TokenManager::new(session.clone(), endpoints.clone(), store));
        let mut creds = Credentials::new("default", "id", "secret", "http://localhost/cb");
        creds.refresh_token = "R".into();
        let client = CrmClient::new(
            session.clone(),
            endpoints,
            tokens,
            Arc::new(tokio::sync::Mutex::new(creds)),
        );

        let headers = client.auth_headers().await.unwrap();
        assert_eq!(headers[0].1, "Zoho-oauthtoken fresh");
        assert_eq!(session.requests_to("/oauth/v2/token").len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces_as_auth_error() {
        let session = Arc::new(ScriptedSession::new(|_| {
            Ok(ApiResponse::new(401, r#"{"error":"invalid_client"}"#))
        }));
        let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
        let endpoints = Endpoints::for_domain(Domain::Com);
        let tokens = Arc::new(TokenManager::new(session.clone(), endpoints.clone(), store));
        let mut creds = Credentials::new("default", "id", "secret", "http://localhost/cb");
        creds.refresh_token = "R".into();
        let client = CrmClient::new(
            session,
            endpoints,
            tokens,
            Arc::new(tokio::sync::Mutex::new(creds)),
        );

        let err = client.auth_headers().await.unwrap_err();
        assert!(err.is_auth());
        assert!(err.to_string().contains("invalid_client"));
    }
}

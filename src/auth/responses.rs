use serde::Deserialize;

/// Body returned by `/oauth/v2/token` for both grants.
///
/// The accounts server answers some failures with HTTP 200 and an `error`
/// field, so every field is optional.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub api_domain: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_full() {
        let json = r#"{
            "access_token": "1000.abc",
            "refresh_token": "1000.def",
            "api_domain": "https://www.zohoapis.com",
            "token_type": "Bearer",
            "expires_in": 3600
        }"#;
        let resp: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.access_token.as_deref(), Some("1000.abc"));
        assert_eq!(resp.refresh_token.as_deref(), Some("1000.def"));
        assert_eq!(resp.expires_in, Some(3600));
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_token_response_error_body() {
        let resp: TokenResponse = serde_json::from_str(r#"{"error": "invalid_code"}"#).unwrap();
        assert_eq!(resp.error.as_deref(), Some("invalid_code"));
        assert!(resp.access_token.is_none());
    }

    #[test]
    fn test_token_response_extra_fields() {
        let json = r#"{"access_token": "a", "scope": "ZohoCRM.modules.ALL"}"#;
        let resp: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.access_token.as_deref(), Some("a"));
        assert!(resp.expires_in.is_none());
    }
}

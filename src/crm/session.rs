use serde::de::DeserializeOwned;

/// Status and body of one HTTP exchange. The body is kept as text so error
/// paths can surface it verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// A successful response with nothing in it (`204 No Content`, or an empty body).
    pub fn is_empty(&self) -> bool {
        self.status == 204 || self.body.trim().is_empty()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Minimal async HTTP session used by the token manager and the CRM client.
///
/// The production implementation is `reqwest::Client`; tests substitute a
/// scripted transport. Transport-level failures (DNS, TLS, timeouts) are the
/// only `Err`; every HTTP status comes back as an `ApiResponse`.
#[async_trait::async_trait]
pub trait ApiSession: Send + Sync {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> anyhow::Result<ApiResponse>;

    async fn post_form(&self, url: &str, form: &[(&str, String)]) -> anyhow::Result<ApiResponse>;
}

#[async_trait::async_trait]
impl ApiSession for reqwest::Client {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> anyhow::Result<ApiResponse> {
        let mut builder = reqwest::Client::get(self, url).query(query);
        for (k, v) in headers {
            builder = builder.header(*k, v.as_str());
        }
        tracing::debug!("GET {}", url);
        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(ApiResponse { status, body })
    }

    async fn post_form(&self, url: &str, form: &[(&str, String)]) -> anyhow::Result<ApiResponse> {
        tracing::debug!("POST {}", url);
        let resp = reqwest::Client::post(self, url).form(form).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(ApiResponse { status, body })
    }
}

//! Scripted `ApiSession` for unit tests.

use std::sync::Mutex;

use super::session::{ApiResponse, ApiSession};

/// One request as seen by the scripted transport.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    /// Query parameters for GET, form fields for POST.
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type Handler = Box<dyn Fn(&RecordedRequest) -> anyhow::Result<ApiResponse> + Send + Sync>;

/// Answers every request through a closure and records what was asked.
pub(crate) struct ScriptedSession {
    handler: Handler,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedSession {
    pub fn new(
        handler: impl Fn(&RecordedRequest) -> anyhow::Result<ApiResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose URL ends with `suffix`.
    pub fn requests_to(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.ends_with(suffix))
            .collect()
    }

    fn record(&self, request: RecordedRequest) -> anyhow::Result<ApiResponse> {
        let response = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        response
    }
}

fn owned(pairs: &[(&str, String)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[async_trait::async_trait]
impl ApiSession for ScriptedSession {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> anyhow::Result<ApiResponse> {
        self.record(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            params: owned(query),
            headers: owned(headers),
        })
    }

    async fn post_form(&self, url: &str, form: &[(&str, String)]) -> anyhow::Result<ApiResponse> {
        self.record(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            params: owned(form),
            headers: Vec::new(),
        })
    }
}

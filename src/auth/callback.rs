//! One-shot local listener for the OAuth redirect.
//!
//! Serves `GET /oauth/callback?code=...` until a grant token has been
//! exchanged successfully, then shuts itself down.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::{oneshot, Mutex};

use super::credentials::SharedCredentials;
use super::TokenManager;

pub const CALLBACK_PATH: &str = "/oauth/callback";

const SUCCESS_PAGE: &str = "<!DOCTYPE html>\
<html><head><title>crm-sync</title></head>\
<body><h1>Authorization successful</h1>\
<p>Tokens have been stored. You can close this window.</p></body></html>";

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Clone)]
pub struct CallbackState {
    tokens: Arc<TokenManager>,
    credentials: SharedCredentials,
    done: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl CallbackState {
    pub fn new(
        tokens: Arc<TokenManager>,
        credentials: SharedCredentials,
        done: oneshot::Sender<()>,
    ) -> Self {
        Self {
            tokens,
            credentials,
            done: Arc::new(Mutex::new(Some(done))),
        }
    }
}

fn failure(message: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        format!("Authorization failed: {}", message),
    )
        .into_response()
}

pub async fn handle_callback(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        tracing::warn!("Callback received without a grant token");
        return failure("Grant token not found.");
    };

    let mut credentials = state.credentials.lock().await;
    if let Err(e) = state
        .tokens
        .exchange_grant_token(&mut credentials, &code)
        .await
    {
        tracing::error!("Grant token exchange failed: {}", e);
        return failure(e);
    }
    drop(credentials);

    if let Some(done) = state.done.lock().await.take() {
        let _ = done.send(());
    }
    Html(SUCCESS_PAGE).into_response()
}

pub fn router(state: CallbackState) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .with_state(state)
}

/// Serve the callback on `addr` until one exchange succeeds.
pub async fn serve_once(
    addr: SocketAddr,
    tokens: Arc<TokenManager>,
    credentials: SharedCredentials,
) -> anyhow::Result<()> {
    let (tx, rx) = oneshot::channel();
    let app = router(CallbackState::new(tokens, credentials, tx));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "Waiting for the OAuth redirect on http://{}{}",
        listener.local_addr()?,
        CALLBACK_PATH
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = rx.await;
        })
        .await?;
    tracing::info!("Callback listener stopped");
    Ok(())
}

//! Token endpoint.
//!
//! Every GET or POST, on any path, returns a freshly minted Kafka token in
//! the shape of an OAuth token response:
//!
//! ```json
//! {"access_token": "<minted token>", "token_type": "Bearer", "expires_in": 3599}
//! ```
//!
//! Claims match the OAUTHBEARER login handler's (`scope: "kafka"`, no `iss`).

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use kafka_gcp_auth::{AuthError, Credentials, mint, resolve_subject};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::net::TcpListener;

use crate::config::AppConfig;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    credentials: Credentials,
}

impl AppState {
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

/// Successful token response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: String,
}

/// Wraps [`AuthError`] so it can be returned from handlers.
#[derive(Debug)]
pub struct ServerError(AuthError);

impl From<AuthError> for ServerError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!(
            error = %self.0,
            category = %self.0.category(),
            "Token request failed"
        );
        let body = ErrorResponse {
            error: format!("{}_error", self.0.category()),
            error_description: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Builds the router.
pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(token_handler).with_state(state)
}

async fn token_handler(State(state): State<AppState>, method: Method) -> Response {
    if method != Method::GET && method != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    match issue_token(&state).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn issue_token(state: &AppState) -> Result<TokenResponse, ServerError> {
    let subject = resolve_subject(&state.credentials).await?;
    let access_token = state
        .credentials
        .fresh_access_token()
        .await
        .map_err(AuthError::from)?;
    let minted = mint(&access_token, &subject)?;

    let expires_in = (access_token.expires_at() - OffsetDateTime::now_utc())
        .whole_seconds()
        .max(0);

    tracing::debug!(principal = %minted.principal(), expires_in, "Issued Kafka token");
    Ok(TokenResponse {
        access_token: minted.into_value(),
        token_type: "Bearer".to_string(),
        expires_in,
    })
}

/// Binds the configured address and serves until Ctrl-C.
///
/// # Errors
///
/// Returns an I/O error if the address cannot be bound or serving fails.
pub async fn run(config: &AppConfig, credentials: Credentials) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.server.addr()).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        "Serving Kafka tokens; not accessible outside of the current machine when bound to localhost"
    );

    axum::serve(listener, build_router(AppState::new(credentials)))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}

//! The action-routed gateway.
//!
//! A single endpoint multiplexes every backend operation: OPTIONS preflight
//! is answered locally, POST bodies are parsed as `{action, payload}`, the
//! bearer credential (when present) is exchanged with the backend for an
//! identity, and the action dispatches to its handler. Success, failure,
//! and preflight responses are all wrapped uniformly and tagged with the
//! resolved CORS origin.
//!
//! The gateway itself is stateless; each request is handled independently
//! against the shared backend handle.

mod actions;
mod error;
mod handlers;

pub use actions::Action;
pub use error::GatewayError;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::backend::Backend;
use crate::cors::CorsPolicy;

/// Path of the single gateway endpoint.
pub const GATEWAY_PATH: &str = "/api/gateway";

#[derive(Clone)]
pub struct GatewayState {
    pub backend: Arc<dyn Backend>,
    pub cors: CorsPolicy,
    /// Default redirect target for signup confirmations.
    pub site_url: String,
}

/// Build the gateway router. POST dispatches, OPTIONS answers preflight;
/// axum rejects every other method with 405 before any parsing.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route(GATEWAY_PATH, post(dispatch).options(preflight))
        .with_state(state)
}

#[derive(Deserialize)]
struct GatewayRequest {
    #[serde(default)]
    action: String,
    #[serde(default)]
    payload: Value,
}

/// Answer a cross-origin preflight: CORS headers, empty body, no backend
/// contact.
async fn preflight(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    let mut response = StatusCode::OK.into_response();
    state
        .cors
        .apply(response.headers_mut(), request_origin(&headers));
    response
}

async fn dispatch(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (status, body_json) = match handle(&state, &headers, &body).await {
        Ok(data) => (StatusCode::OK, json!({ "data": data })),
        Err(e) => (e.status(), e.body()),
    };
    let mut response = (status, Json(body_json)).into_response();
    state
        .cors
        .apply(response.headers_mut(), request_origin(&headers));
    response
}

async fn handle(
    state: &GatewayState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Value, GatewayError> {
    if body.is_empty() {
        return Err(GatewayError::Parse("missing request body".to_string()));
    }
    let request: GatewayRequest =
        serde_json::from_slice(body).map_err(|e| GatewayError::Parse(e.to_string()))?;

    // Resolve the caller's identity up front. A failed exchange degrades to
    // anonymous; each handler decides whether anonymity is acceptable.
    let bearer = bearer_token(headers);
    let user = match bearer.as_deref() {
        Some(token) => match state.backend.resolve_user(token).await {
            Ok(user) => Some(user),
            Err(e) => {
                debug!(error = %e, "bearer credential did not resolve, continuing anonymously");
                None
            }
        },
        None => None,
    };

    let Some(action) = Action::parse(&request.action) else {
        return Err(GatewayError::UnknownAction(request.action));
    };

    handlers::run(state, action, request.payload, bearer.as_deref(), user.as_ref()).await
}

/// Extract the bearer credential from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn request_origin(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::ORIGIN)?.to_str().ok()
}

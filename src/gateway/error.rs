//! Gateway error taxonomy and response shaping.

use axum::http::StatusCode;
use serde_json::{Value, json};
use tracing::error;

use crate::backend::BackendError;

/// Everything that can terminate a gateway request. Each variant maps to a
/// status code and a `{"error", "details"?}` body; the dispatcher adds the
/// CORS headers so the wrapping is uniform across success and failure.
#[derive(Debug)]
pub enum GatewayError {
    /// Request body was not a well-formed `{action, payload}` document.
    Parse(String),
    /// Payload failed an explicit per-action requirement.
    BadRequest(String),
    /// The action needs a resolved identity and none was available.
    NotAuthenticated,
    /// The action name is not in the fixed set.
    UnknownAction(String),
    /// The backend rejected the operation; message passed through.
    Backend(String),
    /// A session refresh was rejected; distinguished so it maps to 401.
    RefreshFailed(String),
    /// Anything unexpected. Only the error's own message is exposed.
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Parse(_) | Self::BadRequest(_) | Self::UnknownAction(_) | Self::Backend(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotAuthenticated | Self::RefreshFailed(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Self::Parse(details) => json!({ "error": "Invalid JSON", "details": details }),
            Self::BadRequest(message) => json!({ "error": message }),
            Self::NotAuthenticated => json!({ "error": "Not authenticated" }),
            Self::UnknownAction(action) => {
                json!({ "error": format!("Unknown action: {action}") })
            }
            Self::Backend(message) | Self::RefreshFailed(message) => {
                json!({ "error": message })
            }
            Self::Internal(message) => json!({ "error": message }),
        }
    }
}

impl From<BackendError> for GatewayError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Transport(e) => {
                error!(error = %e, "backend call failed");
                Self::Internal(e.to_string())
            }
            BackendError::NotFound(message) | BackendError::Rejected(message) => {
                Self::Backend(message)
            }
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        error!(error = %e, "response serialization failed");
        Self::Internal(e.to_string())
    }
}

//! API error type that maps [`BridgeError`] variants to HTTP responses of
//! the form `{"error": "<message>"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mailbridge_types::{BridgeError, error::GRANT_EXPIRED_MESSAGE};
use serde_json::json;

/// Message for callers with no resolvable identity.
pub const UNAUTHORIZED: &str = "Unauthorized";

/// Wrapper around [`BridgeError`] that implements [`IntoResponse`].
///
/// `fallback` replaces upstream failures that carry no message of their own.
pub struct ApiError {
    pub error: BridgeError,
    pub fallback: Option<&'static str>,
}

impl ApiError {
    #[must_use]
    pub fn unauthorized() -> Self {
        BridgeError::Unauthenticated(UNAUTHORIZED.into()).into()
    }

    #[must_use]
    pub fn or(mut self, fallback: &'static str) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Returns `(status, message)` for the wrapped error.
    fn classify(&self) -> (StatusCode, String) {
        let fallback = |msg: &str| {
            if msg.trim().is_empty() {
                self.fallback.unwrap_or("Internal server error").to_string()
            } else {
                msg.to_string()
            }
        };
        match &self.error {
            BridgeError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            e if e.is_expired_grant() => {
                (StatusCode::UNAUTHORIZED, GRANT_EXPIRED_MESSAGE.to_string())
            }
            BridgeError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            BridgeError::Api { status, detail } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                detail.clone(),
            ),
            BridgeError::Upstream { body, .. } => (StatusCode::INTERNAL_SERVER_ERROR, fallback(body)),
            BridgeError::Http(msg) => (StatusCode::INTERNAL_SERVER_ERROR, fallback(msg)),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = self.classify();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.error, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.error, "request rejected");
        }
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        Self {
            error,
            fallback: None,
        }
    }
}

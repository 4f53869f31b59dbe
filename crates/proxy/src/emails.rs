//! `POST /api/emails/send`: forwards the caller's message to the mail
//! service and passes its status and body through.

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::sync::Arc;

use crate::{
    AppState,
    error::ApiError,
    session::{Caller, require_identity},
};

const SEND_FALLBACK: &str = "Failed to send email";

pub async fn send_email(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    let identity = require_identity(&state, &caller).await?;

    // The bridge-issued token when available, else whatever the caller sent.
    let token = match state.bridge.resolve_backend_token(&identity).await {
        Some(t) => Some(t.access_token),
        None => caller.bearer().map(str::to_string),
    };

    let url = format!("{}/api/emails/send", state.config.load().mail_url()?);
    let mut builder = state
        .http
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .body(body);
    if let Some(token) = &token {
        builder = builder.bearer_auth(token);
    }

    tracing::debug!(url = %url, authenticated = token.is_some(), "forwarding email send");
    let upstream = builder
        .send()
        .await
        .map_err(|e| ApiError::from(mailbridge_types::BridgeError::from(e)).or(SEND_FALLBACK))?;

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| ApiError::from(mailbridge_types::BridgeError::from(e)).or(SEND_FALLBACK))?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "mail service rejected send");
    }
    Ok((status, [(CONTENT_TYPE, content_type)], bytes).into_response())
}

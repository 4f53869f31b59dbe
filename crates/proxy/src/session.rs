//! Caller extraction and the `/api/session/*` routes.
//!
//! - `POST /api/session/token`    -> `{access_token}` for the caller's session.
//! - `POST /api/session/sign-out` -> ends the upstream session, clears tokens.
//! - `POST /api/session/grant`    -> stores the caller's Google grant.

use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
    response::IntoResponse,
};
use mailbridge_types::{BridgeError, Identity, OAuthToken, SessionRef};
use serde::Deserialize;
use serde_json::json;
use std::{convert::Infallible, sync::Arc};

use crate::{AppState, error::ApiError};

/// Header carrying the upstream session token for callers that cannot send
/// the cookie. Holds the same signed JWT as the cookie, never a bare id.
pub const SESSION_HEADER: &str = "x-session-token";
/// Cookie Clerk stores its session token in.
pub const SESSION_COOKIE: &str = "__session";

/// What the caller presented: session token (header, then cookie) and bearer.
#[derive(Debug, Clone, Default)]
pub struct Caller(pub SessionRef);

fn header_str<'a>(headers: &'a HeaderMap, name: impl axum::http::header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl Caller {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let session_id = header_str(headers, SESSION_HEADER)
            .or_else(|| cookie(headers, SESSION_COOKIE))
            .and_then(non_blank);
        let bearer = header_str(headers, AUTHORIZATION)
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(non_blank);
        Self(SessionRef { session_id, bearer })
    }

    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.0.bearer.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// The caller's identity, or 401 `Unauthorized`.
pub(crate) async fn require_identity(
    state: &AppState,
    caller: &Caller,
) -> Result<Identity, ApiError> {
    state
        .bridge
        .identify(&caller.0)
        .await?
        .ok_or_else(ApiError::unauthorized)
}

pub async fn session_token(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    let identity = require_identity(&state, &caller).await?;
    let token = state
        .bridge
        .resolve_backend_token(&identity)
        .await
        .ok_or_else(ApiError::unauthorized)?;
    Ok(Json(json!({ "access_token": token.access_token })))
}

/// Anonymous callers, and callers whose grant has already expired, have
/// nothing left to end; the call still succeeds.
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<StatusCode, ApiError> {
    let identity = match state.bridge.identify(&caller.0).await {
        Ok(identity) => identity,
        Err(e) if e.is_expired_grant() => None,
        Err(e) => return Err(e.into()),
    };
    if let Some(identity) = identity {
        state
            .bridge
            .sign_out(&caller.0, &identity.session_key())
            .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct GrantBody {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl GrantBody {
    fn into_token(self) -> Result<OAuthToken, BridgeError> {
        if self.access_token.trim().is_empty() {
            return Err(BridgeError::Validation("access_token is required".into()));
        }
        let mut token = OAuthToken::new(self.access_token);
        if let Some(secs) = self.expires_in {
            token = token.with_expiry(secs);
        }
        if let Some(refresh) = self.refresh_token.filter(|r| !r.is_empty()) {
            token = token.with_refresh(refresh);
        }
        Ok(token)
    }
}

pub async fn store_grant(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<GrantBody>,
) -> Result<StatusCode, ApiError> {
    let identity = require_identity(&state, &caller).await?;
    let token = body.into_token()?;
    let key = identity.session_key();
    state.grants.save_grant(&key, &token).await?;
    tracing::info!(session = %key, "google grant stored");
    Ok(StatusCode::NO_CONTENT)
}

//! Authenticated JSON request wrapper shared by every feature module.
//!
//! Each call reads the session's cached backend token from the
//! [`TokenStore`]; there is no client-side notion of a "current user" beyond
//! the session key the client was built for.

use mailbridge_types::{
    BridgeError, OAuthToken, SessionKey, TokenKind, TokenStore, traits::Result,
};
use reqwest::{Method, header::CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Message for operations that refuse to run without a cached token.
pub const NOT_AUTHENTICATED: &str = "Not authenticated";

/// How to issue one request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    /// Attach the cached bearer token when one exists.
    pub require_auth: bool,
    /// Error text used when a failure response carries no usable `detail`.
    pub error_fallback: Option<&'static str>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            require_auth: true,
            error_fallback: None,
        }
    }
}

impl RequestOptions {
    #[must_use]
    pub fn get() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn post(body: Option<Value>) -> Self {
        Self {
            method: Method::POST,
            body,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn patch(body: Value) -> Self {
        Self {
            method: Method::PATCH,
            body: Some(body),
            ..Self::default()
        }
    }

    /// Send without the bearer token even if one is cached.
    #[must_use]
    pub fn public(mut self) -> Self {
        self.require_auth = false;
        self
    }

    #[must_use]
    pub fn fallback(mut self, message: &'static str) -> Self {
        self.error_fallback = Some(message);
        self
    }
}

/// The message carried by a failed response.
///
/// A string `detail` is used verbatim, any other `detail` value is rendered
/// as JSON. An unparsable body or a missing/empty `detail` falls back to
/// `fallback`, then to `"HTTP error! status: <code>"`.
fn error_detail(status: u16, body: &str, fallback: Option<&str>) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned());
    match detail {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Null | Value::String(_)) | None => fallback.map_or_else(
            || format!("HTTP error! status: {status}"),
            str::to_string,
        ),
        Some(other) => other.to_string(),
    }
}

/// One backend (or auxiliary service) reached on behalf of one session.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    session: SessionKey,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
        session: SessionKey,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            session,
        }
    }

    /// The same session pointed at another service.
    #[must_use]
    pub fn rebased(&self, base_url: impl Into<String>) -> Self {
        Self::new(
            self.http.clone(),
            base_url,
            Arc::clone(&self.store),
            self.session.clone(),
        )
    }

    #[must_use]
    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The session's cached backend token, if any.
    pub async fn token(&self) -> Option<OAuthToken> {
        match self.store.load(&self.session, TokenKind::Backend).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(session = %self.session, error = %e, "token store read failed");
                None
            }
        }
    }

    /// Replace the session's cached backend token.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be written.
    pub async fn set_token(&self, token: &OAuthToken) -> Result<()> {
        self.store
            .save(&self.session, TokenKind::Backend, token)
            .await
    }

    /// Drop the session's cached backend token.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be written.
    pub async fn clear_token(&self) -> Result<()> {
        self.store.remove(&self.session, TokenKind::Backend).await
    }

    /// The cached token, or [`BridgeError::Unauthenticated`] before any
    /// network call.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated("Not authenticated")` when nothing is cached.
    pub async fn require_token(&self) -> Result<OAuthToken> {
        self.token()
            .await
            .ok_or_else(|| BridgeError::Unauthenticated(NOT_AUTHENTICATED.into()))
    }

    /// Issue one request against `endpoint` (relative to the base URL).
    ///
    /// Returns `{}` for 204 without reading the body, the parsed JSON body
    /// for any other 2xx.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Api`] for non-2xx responses, carrying the normalized
    ///   detail message.
    /// - [`BridgeError::Http`] on transport failure.
    /// - [`BridgeError::Serialization`] if a 2xx body is not JSON.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<Value> {
        let url = format!("{}{endpoint}", self.base_url);
        let mut builder = self
            .http
            .request(options.method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");

        if options.require_auth
            && let Some(token) = self.token().await
        {
            builder = builder.bearer_auth(&token.access_token);
        }
        if let Some(body) = &options.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        tracing::debug!(method = %options.method, url = %url, "api request");
        let resp = builder.send().await?;
        let status = resp.status();

        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail = error_detail(status.as_u16(), &body, options.error_fallback);
            tracing::debug!(status = status.as_u16(), detail = %detail, "api error");
            return Err(BridgeError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// [`request`](Self::request), decoded into `T`.
    ///
    /// # Errors
    ///
    /// As for `request`, plus [`BridgeError::Serialization`] if the body does
    /// not match `T`.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let value = self.request(endpoint, options).await?;
        Ok(serde_json::from_value(value)?)
    }
}

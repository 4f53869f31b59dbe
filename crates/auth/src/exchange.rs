//! Identity exchange against the mail backend.
//!
//! `POST {backend}/api/auth/google-auth` with `{email, name, google_id}`
//! returns `{access_token}`, the bearer every backend call carries. The
//! endpoint is used for every identity system, not only Google.

use arc_swap::ArcSwap;
use mailbridge_config::Config;
use mailbridge_types::{BridgeError, Identity, OAuthToken, traits::Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::http_util::send_checked;

const EXCHANGE_PATH: &str = "/api/auth/google-auth";

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    email: &'a str,
    name: &'a str,
    google_id: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
}

/// Trades an [`Identity`] for a backend bearer token.
///
/// The backend URL is read from the live configuration on every call so a
/// hot reload takes effect for the next exchange.
#[derive(Clone)]
pub struct BackendExchange {
    http: reqwest::Client,
    config: Arc<ArcSwap<Config>>,
}

impl BackendExchange {
    #[must_use]
    pub fn new(http: reqwest::Client, config: Arc<ArcSwap<Config>>) -> Self {
        Self { http, config }
    }

    /// Perform the exchange.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Config`] if the backend URL is not configured.
    /// - [`BridgeError::Upstream`] on a non-2xx response.
    /// - [`BridgeError::Auth`] if the response carries no `access_token`.
    pub async fn exchange(&self, identity: &Identity) -> Result<OAuthToken> {
        let url = format!("{}{EXCHANGE_PATH}", self.config.load().backend_url()?);
        let body = ExchangeRequest {
            email: identity.email.trim(),
            name: identity.display_name_or_email(),
            google_id: identity.provider_id_or_email(),
        };

        tracing::debug!(url = %url, provider = %identity.provider, "exchanging identity for backend token");
        let resp = send_checked(self.http.post(&url).json(&body)).await?;
        let parsed: ExchangeResponse = resp.json().await?;
        parsed
            .access_token
            .filter(|t| !t.is_empty())
            .map(OAuthToken::new)
            .ok_or_else(|| BridgeError::Auth("identity exchange returned no access_token".into()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use mailbridge_types::IdentityProvider;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Config pointing the backend at `base`.
    pub(crate) fn config_for(base: &str) -> Arc<ArcSwap<Config>> {
        let mut cfg = Config::default();
        cfg.backend.base_url = Some(base.to_string());
        Arc::new(ArcSwap::from_pointee(cfg))
    }

    /// Serve `router` on an ephemeral local port and return its base URL.
    pub(crate) async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// A fake backend whose exchange endpoint echoes the request body and
    /// counts calls.
    pub(crate) async fn fake_backend(calls: Arc<AtomicUsize>, status: StatusCode) -> String {
        let router = Router::new().route(
            EXCHANGE_PATH,
            post(move |Json(body): Json<Value>| {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    (
                        status,
                        Json(json!({
                            "access_token": format!("jwt-{}-{n}", body["email"].as_str().unwrap_or("")),
                            "echo": body,
                        })),
                    )
                }
            }),
        );
        serve(router).await
    }

    #[tokio::test]
    async fn test_exchange_sends_wire_names() {
        let router = Router::new().route(
            EXCHANGE_PATH,
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["email"], "ada@example.com");
                assert_eq!(body["name"], "Ada");
                assert_eq!(body["google_id"], "user_123");
                Json(json!({"access_token": "backend-jwt", "token_type": "bearer"}))
            }),
        );
        let base = serve(router).await;
        let ex = BackendExchange::new(reqwest::Client::new(), config_for(&base));
        let id = Identity::new(IdentityProvider::Clerk, "ada@example.com", "user_123")
            .with_display_name("Ada");
        let tok = ex.exchange(&id).await.unwrap();
        assert_eq!(tok.access_token, "backend-jwt");
    }

    #[tokio::test]
    async fn test_exchange_name_falls_back_to_email() {
        let router = Router::new().route(
            EXCHANGE_PATH,
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["name"], "bob@example.com");
                assert_eq!(body["google_id"], "bob@example.com");
                Json(json!({"access_token": "t"}))
            }),
        );
        let base = serve(router).await;
        let ex = BackendExchange::new(reqwest::Client::new(), config_for(&base));
        let id = Identity::new(IdentityProvider::Google, "bob@example.com", "");
        assert_eq!(ex.exchange(&id).await.unwrap().access_token, "t");
    }

    #[tokio::test]
    async fn test_exchange_non_success_is_upstream_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = fake_backend(Arc::clone(&calls), StatusCode::FORBIDDEN).await;
        let ex = BackendExchange::new(reqwest::Client::new(), config_for(&base));
        let id = Identity::new(IdentityProvider::Google, "a@example.com", "1");
        let err = ex.exchange(&id).await.unwrap_err();
        assert!(matches!(err, BridgeError::Upstream { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_exchange_missing_token_field() {
        let router = Router::new().route(EXCHANGE_PATH, post(|| async { Json(json!({})) }));
        let base = serve(router).await;
        let ex = BackendExchange::new(reqwest::Client::new(), config_for(&base));
        let id = Identity::new(IdentityProvider::Google, "a@example.com", "1");
        assert!(matches!(
            ex.exchange(&id).await.unwrap_err(),
            BridgeError::Auth(_)
        ));
    }

    #[tokio::test]
    async fn test_exchange_without_backend_url() {
        let ex = BackendExchange::new(
            reqwest::Client::new(),
            Arc::new(ArcSwap::from_pointee(Config::default())),
        );
        let id = Identity::new(IdentityProvider::Google, "a@example.com", "1");
        assert!(matches!(
            ex.exchange(&id).await.unwrap_err(),
            BridgeError::Config(_)
        ));
    }
}

//! Password accounts and service health.

use mailbridge_types::{OAuthToken, traits::Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::{ApiClient, RequestOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

pub struct AccountApi<'a> {
    client: &'a ApiClient,
}

impl ApiClient {
    #[must_use]
    pub fn account(&self) -> AccountApi<'_> {
        AccountApi { client: self }
    }
}

impl AccountApi<'_> {
    /// Sign in with a password and cache the issued token for the session.
    ///
    /// # Errors
    ///
    /// Returns the backend's error for bad credentials.
    pub async fn login(&self, req: &LoginRequest) -> Result<AuthResponse> {
        let resp: AuthResponse = self
            .client
            .request_as(
                "/api/auth/login",
                RequestOptions::post(Some(serde_json::to_value(req)?)).public(),
            )
            .await?;
        self.client
            .set_token(&OAuthToken::new(&resp.access_token))
            .await?;
        Ok(resp)
    }

    /// Register and cache the issued token for the session.
    ///
    /// # Errors
    ///
    /// Returns the backend's error (e.g. an email already in use).
    pub async fn signup(&self, req: &SignupRequest) -> Result<AuthResponse> {
        let resp: AuthResponse = self
            .client
            .request_as(
                "/api/auth/signup",
                RequestOptions::post(Some(serde_json::to_value(req)?)).public(),
            )
            .await?;
        self.client
            .set_token(&OAuthToken::new(&resp.access_token))
            .await?;
        Ok(resp)
    }

    /// # Errors
    ///
    /// Returns the backend's error, typically 401 without a cached token.
    pub async fn me(&self) -> Result<User> {
        self.client
            .request_as("/api/auth/me", RequestOptions::get())
            .await
    }

    /// # Errors
    ///
    /// Returns a transport or backend error if the service is down.
    pub async fn health(&self) -> Result<Health> {
        self.client
            .request_as("/health", RequestOptions::get().public())
            .await
    }
}

//! Google OAuth 2.0: login URL building, token exchange and refresh
//! parameters, the per-request [`GoogleOAuthClient`], and the
//! [`GoogleProvider`] identity source.
//!
//! The login flow uses PKCE (S256) with offline access so a refresh token is
//! issued alongside the calendar-scoped access token.

use async_trait::async_trait;
use mailbridge_types::{
    AuthProvider, BridgeError, Identity, IdentityProvider, OAuthToken, SessionRef,
    traits::Result,
};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use std::fmt;

use crate::{exchange::BackendExchange, http_util::send_checked};

/// Local callback port for the OAuth redirect.
pub const CALLBACK_PORT: u16 = 8085;

/// Scopes requested at login: identity plus read/write calendar access.
pub const SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/calendar",
];

/// Redirect URI registered for the local callback listener.
#[must_use]
pub fn redirect_uri(port: u16) -> String {
    format!("http://localhost:{port}/callback")
}

/// Build the authorization URL with PKCE S256 parameters.
#[must_use]
pub fn build_auth_url(
    auth_url: &str,
    client_id: &str,
    redirect_uri: &str,
    code_challenge: &str,
    state: &str,
) -> String {
    let scope = SCOPES.join(" ");
    let query = serde_urlencoded::to_string([
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("scope", scope.as_str()),
        ("state", state),
        ("code_challenge", code_challenge),
        ("code_challenge_method", "S256"),
        ("access_type", "offline"),
        ("prompt", "consent"),
    ])
    .unwrap_or_default();
    format!("{auth_url}?{query}")
}

/// Form parameters for the authorization-code exchange.
#[must_use]
pub fn token_form_params(
    client_id: &str,
    client_secret: &str,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> Vec<(String, String)> {
    vec![
        ("grant_type".into(), "authorization_code".into()),
        ("client_id".into(), client_id.into()),
        ("client_secret".into(), client_secret.into()),
        ("code".into(), code.into()),
        ("redirect_uri".into(), redirect_uri.into()),
        ("code_verifier".into(), code_verifier.into()),
    ]
}

/// Form parameters for a refresh-token grant.
#[must_use]
pub fn refresh_form_params(
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Vec<(String, String)> {
    vec![
        ("grant_type".into(), "refresh_token".into()),
        ("client_id".into(), client_id.into()),
        ("client_secret".into(), client_secret.into()),
        ("refresh_token".into(), refresh_token.into()),
    ]
}

/// Parse the token endpoint JSON response into an [`OAuthToken`].
///
/// # Errors
///
/// Returns an error if the response is missing the `access_token` field.
pub fn parse_token_response(json: &serde_json::Value) -> Result<OAuthToken> {
    let access_token = json
        .get("access_token")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| BridgeError::Auth("missing access_token".into()))?
        .to_string();

    let mut token = OAuthToken::new(access_token);
    if let Some(r) = json
        .get("refresh_token")
        .and_then(serde_json::Value::as_str)
    {
        token = token.with_refresh(r);
    }
    if let Some(exp) = json.get("expires_in").and_then(serde_json::Value::as_u64) {
        token = token.with_expiry(exp);
    }
    Ok(token)
}

/// Trade a refresh token for a fresh access token.
///
/// Google does not always return a new refresh token; the old one is kept
/// in that case.
///
/// # Errors
///
/// Returns [`BridgeError::Upstream`] when Google rejects the grant (the body
/// then usually contains `invalid_grant`), or a transport/parse error.
pub async fn refresh_grant(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &SecretString,
    refresh_token: &str,
) -> Result<OAuthToken> {
    let params = refresh_form_params(client_id, client_secret.expose_secret(), refresh_token);
    let resp = send_checked(
        http.post(token_url)
            .header("Accept", "application/json")
            .form(&params),
    )
    .await?;
    let json: serde_json::Value = resp.json().await?;
    let mut token = parse_token_response(&json)?;
    if token.refresh_token.is_none() {
        token = token.with_refresh(refresh_token);
    }
    Ok(token)
}

// ── Per-request client ────────────────────────────────────────────────────────

/// The Google access token a calendar call is made with.
///
/// Construction rejects blank tokens, so holding one means a credential was
/// actually presented.
#[derive(Clone)]
pub struct GoogleCredential {
    access_token: SecretString,
}

impl GoogleCredential {
    /// A credential from a raw bearer string; `None` if it is blank.
    #[must_use]
    pub fn from_bearer(token: &str) -> Option<Self> {
        let token = token.trim();
        (!token.is_empty()).then(|| Self {
            access_token: SecretString::from(token.to_string()),
        })
    }

    /// A credential from a stored grant; `None` if its access token is blank.
    #[must_use]
    pub fn from_token(token: &OAuthToken) -> Option<Self> {
        Self::from_bearer(&token.access_token)
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl fmt::Debug for GoogleCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleCredential")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// An OAuth2 client value: application credentials plus the caller's
/// access token. Built once per request; performs no I/O on construction.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    client_id: String,
    client_secret: SecretString,
    credential: GoogleCredential,
}

impl GoogleOAuthClient {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        credential: GoogleCredential,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            credential,
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    #[must_use]
    pub fn credential(&self) -> &GoogleCredential {
        &self.credential
    }

    /// Attach the caller's access token to an outgoing request.
    #[must_use]
    pub fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(self.credential.access_token())
    }
}

impl fmt::Debug for GoogleOAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleOAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("credential", &self.credential)
            .finish()
    }
}

// ── Identity provider ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Identity from a Google access token, resolved through the `OpenID`
/// userinfo endpoint.
pub struct GoogleProvider {
    http: reqwest::Client,
    exchange: BackendExchange,
    userinfo_url: String,
    revoke_url: String,
}

impl GoogleProvider {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        exchange: BackendExchange,
        userinfo_url: impl Into<String>,
        revoke_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            exchange,
            userinfo_url: userinfo_url.into(),
            revoke_url: revoke_url.into(),
        }
    }

    /// Look up the identity behind an access token.
    ///
    /// # Errors
    ///
    /// See [`fetch_userinfo`].
    pub async fn identity_for_token(&self, access_token: &str) -> Result<Identity> {
        fetch_userinfo(&self.http, &self.userinfo_url, access_token).await
    }
}

/// Query the userinfo endpoint with an access token.
///
/// # Errors
///
/// Returns [`BridgeError::GrantExpired`] when Google no longer accepts the
/// token (401, or an `invalid_grant`/`invalid_token` body), otherwise an
/// upstream or transport error.
pub async fn fetch_userinfo(
    http: &reqwest::Client,
    userinfo_url: &str,
    access_token: &str,
) -> Result<Identity> {
    let req = http.get(userinfo_url).bearer_auth(access_token);
    let info: UserInfo = match send_checked(req).await {
        Ok(resp) => resp.json().await?,
        Err(e) if e.is_expired_grant() || rejects_token(&e) => {
            tracing::debug!(error = %e, "google rejected access token");
            return Err(BridgeError::GrantExpired);
        }
        Err(e) => return Err(e),
    };
    let mut identity = Identity::new(
        IdentityProvider::Google,
        info.email.unwrap_or_default(),
        info.sub,
    );
    if let Some(name) = info.name {
        identity = identity.with_display_name(name);
    }
    Ok(identity)
}

fn rejects_token(e: &BridgeError) -> bool {
    matches!(e, BridgeError::Upstream { body, .. } if body.contains("invalid_token"))
}

#[async_trait]
impl AuthProvider for GoogleProvider {
    fn kind(&self) -> IdentityProvider {
        IdentityProvider::Google
    }

    async fn get_identity(&self, session: &SessionRef) -> Result<Option<Identity>> {
        match session.bearer.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => self.identity_for_token(token).await.map(Some),
            _ => Ok(None),
        }
    }

    async fn exchange_token(&self, identity: &Identity) -> Result<OAuthToken> {
        self.exchange.exchange(identity).await
    }

    async fn sign_out(&self, session: &SessionRef) -> Result<()> {
        let Some(token) = session.bearer.as_deref() else {
            return Ok(());
        };
        send_checked(self.http.post(&self.revoke_url).form(&[("token", token)])).await?;
        tracing::info!("google grant revoked");
        Ok(())
    }
}

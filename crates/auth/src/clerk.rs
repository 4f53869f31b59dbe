//! Clerk identity provider.
//!
//! The caller presents the Clerk session token (the `__session` JWT). Its
//! RS256 signature is checked against the instance JWKS and its `exp`/`nbf`
//! window enforced before the `sid` claim is trusted. The session is then
//! looked up through Clerk's Backend API with the secret key; only `active`
//! sessions yield an identity. A bare session id is never accepted.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, jwk::JwkSet};
use mailbridge_types::{
    AuthProvider, BridgeError, Identity, IdentityProvider, OAuthToken, SessionRef,
    traits::Result,
};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::{exchange::BackendExchange, http_util::send_checked};

#[derive(Deserialize)]
struct ClerkSession {
    user_id: String,
    status: String,
}

#[derive(Deserialize)]
struct ClerkEmail {
    id: String,
    email_address: String,
}

#[derive(Deserialize)]
struct ClerkUser {
    id: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    primary_email_address_id: Option<String>,
    #[serde(default)]
    email_addresses: Vec<ClerkEmail>,
}

impl ClerkUser {
    fn primary_email(&self) -> Option<&str> {
        let primary = self.primary_email_address_id.as_deref();
        self.email_addresses
            .iter()
            .find(|e| Some(e.id.as_str()) == primary)
            .or_else(|| self.email_addresses.first())
            .map(|e| e.email_address.as_str())
    }

    fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    fn into_identity(self) -> Identity {
        let email = self.primary_email().unwrap_or_default().to_string();
        let name = self.full_name();
        let mut identity = Identity::new(IdentityProvider::Clerk, email, self.id);
        if let Some(name) = name {
            identity = identity.with_display_name(name);
        }
        identity
    }
}

/// An unknown `kid` triggers a JWKS refetch at most this often.
const JWKS_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct SessionClaims {
    sid: String,
}

struct CachedJwks {
    keys: JwkSet,
    fetched: Instant,
}

/// Resolves identities from Clerk sessions.
pub struct ClerkProvider {
    http: reqwest::Client,
    exchange: BackendExchange,
    api_base: String,
    secret_key: SecretString,
    jwks: Mutex<Option<CachedJwks>>,
}

impl ClerkProvider {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        exchange: BackendExchange,
        api_base: impl Into<String>,
        secret_key: SecretString,
    ) -> Self {
        Self {
            http,
            exchange,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key,
            jwks: Mutex::new(None),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let req = self
            .http
            .get(format!("{}{path}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret());
        Ok(send_checked(req).await?.json().await?)
    }

    /// Signing key for `kid`, refetching the JWKS when the key is unknown.
    async fn decoding_key(&self, kid: &str) -> Result<Option<DecodingKey>> {
        let mut cache = self.jwks.lock().await;
        let refetch = cache.as_ref().is_none_or(|c| {
            c.keys.find(kid).is_none() && c.fetched.elapsed() >= JWKS_REFETCH_INTERVAL
        });
        if refetch {
            let keys: JwkSet = self.get_json("/v1/jwks").await?;
            tracing::debug!(keys = keys.keys.len(), "clerk jwks fetched");
            *cache = Some(CachedJwks {
                keys,
                fetched: Instant::now(),
            });
        }
        let Some(jwk) = cache.as_ref().and_then(|c| c.keys.find(kid)) else {
            return Ok(None);
        };
        Ok(DecodingKey::from_jwk(jwk).ok())
    }

    /// The `sid` of a session token whose signature and time window check
    /// out. Anything else, including a bare `sess_...` id, yields `None`.
    async fn verified_session_id(&self, token: &str) -> Result<Option<String>> {
        let token = token.trim();
        let header = match decode_header(token) {
            Ok(h) if h.alg == Algorithm::RS256 => h,
            Ok(h) => {
                tracing::debug!(alg = ?h.alg, "clerk session token has unexpected alg");
                return Ok(None);
            }
            Err(_) => return Ok(None),
        };
        let Some(kid) = header.kid else {
            return Ok(None);
        };
        let Some(key) = self.decoding_key(&kid).await? else {
            tracing::debug!(kid = %kid, "clerk session token signed by unknown key");
            return Ok(None);
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_nbf = true;
        validation.validate_aud = false;
        match decode::<SessionClaims>(token, &key, &validation) {
            Ok(data) => Ok(Some(data.claims.sid)),
            Err(e) => {
                tracing::debug!(error = %e, "clerk session token rejected");
                Ok(None)
            }
        }
    }

    async fn session_id(&self, session: &SessionRef) -> Result<Option<String>> {
        match session.session_id.as_deref() {
            Some(token) => self.verified_session_id(token).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AuthProvider for ClerkProvider {
    fn kind(&self) -> IdentityProvider {
        IdentityProvider::Clerk
    }

    async fn get_identity(&self, session: &SessionRef) -> Result<Option<Identity>> {
        let Some(sid) = self.session_id(session).await? else {
            return Ok(None);
        };

        let clerk_session: ClerkSession = match self.get_json(&format!("/v1/sessions/{sid}")).await
        {
            Ok(s) => s,
            Err(BridgeError::Upstream {
                status: 401 | 404, ..
            }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if clerk_session.status != "active" {
            tracing::debug!(status = %clerk_session.status, "clerk session not active");
            return Ok(None);
        }

        let user: ClerkUser = self
            .get_json(&format!("/v1/users/{}", clerk_session.user_id))
            .await?;
        Ok(Some(user.into_identity()))
    }

    async fn exchange_token(&self, identity: &Identity) -> Result<OAuthToken> {
        self.exchange.exchange(identity).await
    }

    async fn sign_out(&self, session: &SessionRef) -> Result<()> {
        let Some(sid) = self.session_id(session).await? else {
            return Ok(());
        };
        let req = self
            .http
            .post(format!("{}/v1/sessions/{sid}/revoke", self.api_base))
            .bearer_auth(self.secret_key.expose_secret());
        send_checked(req).await?;
        tracing::info!(session = %sid, "clerk session revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::tests::{config_for, serve};
    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
    };
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::{SystemTime, UNIX_EPOCH},
    };

    const KID: &str = "ins_test_1";
    const SIGNING_KEY: &[u8] = include_bytes!("../testdata/clerk_rs256.pem");
    const MODULUS: &str = include_str!("../testdata/clerk_rs256.n");

    fn now() -> i64 {
        i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()).unwrap()
    }

    fn sign(claims: &Value) -> String {
        let header = Header {
            kid: Some(KID.into()),
            ..Header::new(Algorithm::RS256)
        };
        encode(&header, claims, &EncodingKey::from_rsa_pem(SIGNING_KEY).unwrap()).unwrap()
    }

    fn session_token(sid: &str) -> String {
        sign(&json!({"sid": sid, "sub": "user_1", "nbf": now() - 5, "exp": now() + 300}))
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer sk_test_123")
    }

    async fn session(Path(sid): Path<String>, headers: HeaderMap) -> impl IntoResponse {
        if !authorized(&headers) {
            return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
        }
        match sid.as_str() {
            "sess_active" => Json(json!({"id": sid, "user_id": "user_1", "status": "active"}))
                .into_response(),
            "sess_ended" => Json(json!({"id": sid, "user_id": "user_1", "status": "ended"}))
                .into_response(),
            _ => (StatusCode::NOT_FOUND, Json(json!({"errors": []}))).into_response(),
        }
    }

    async fn user(Path(uid): Path<String>) -> impl IntoResponse {
        Json(json!({
            "id": uid,
            "first_name": "Ada",
            "last_name": "Lovelace",
            "primary_email_address_id": "idn_2",
            "email_addresses": [
                {"id": "idn_1", "email_address": "old@example.com"},
                {"id": "idn_2", "email_address": "ada@example.com"}
            ]
        }))
    }

    struct Fake {
        provider: ClerkProvider,
        revoked: Arc<AtomicBool>,
        session_lookups: Arc<AtomicUsize>,
    }

    async fn fake() -> Fake {
        let revoked = Arc::new(AtomicBool::new(false));
        let session_lookups = Arc::new(AtomicUsize::new(0));
        let lookups = Arc::clone(&session_lookups);
        let revoke_flag = Arc::clone(&revoked);
        let router = Router::new()
            .route(
                "/v1/jwks",
                get(|| async {
                    Json(json!({"keys": [{
                        "kty": "RSA",
                        "kid": KID,
                        "use": "sig",
                        "alg": "RS256",
                        "n": MODULUS.trim(),
                        "e": "AQAB"
                    }]}))
                }),
            )
            .route(
                "/v1/sessions/{sid}",
                get(move |sid: Path<String>, headers: HeaderMap| {
                    lookups.fetch_add(1, Ordering::SeqCst);
                    session(sid, headers)
                }),
            )
            .route("/v1/users/{uid}", get(user))
            .route(
                "/v1/sessions/{sid}/revoke",
                post(move || {
                    let revoked = Arc::clone(&revoke_flag);
                    async move {
                        revoked.store(true, Ordering::SeqCst);
                        Json(json!({"status": "revoked"}))
                    }
                }),
            );
        let base = serve(router).await;
        let provider = ClerkProvider::new(
            reqwest::Client::new(),
            BackendExchange::new(reqwest::Client::new(), config_for(&base)),
            format!("{base}/"),
            SecretString::from("sk_test_123".to_string()),
        );
        Fake {
            provider,
            revoked,
            session_lookups,
        }
    }

    fn presenting(token: &str) -> SessionRef {
        SessionRef {
            session_id: Some(token.into()),
            bearer: None,
        }
    }

    async fn identify(p: &ClerkProvider, token: &str) -> Option<Identity> {
        p.get_identity(&presenting(token)).await.unwrap()
    }

    #[tokio::test]
    async fn test_active_session_resolves_primary_email() {
        let f = fake().await;
        let id = identify(&f.provider, &session_token("sess_active")).await.unwrap();
        assert_eq!(id.provider, IdentityProvider::Clerk);
        assert_eq!(id.email, "ada@example.com");
        assert_eq!(id.display_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(id.session_key().as_str(), "clerk:user_1");
    }

    #[tokio::test]
    async fn test_ended_or_unknown_session_is_anonymous() {
        let f = fake().await;
        assert!(identify(&f.provider, &session_token("sess_ended")).await.is_none());
        assert!(identify(&f.provider, &session_token("sess_missing")).await.is_none());
        assert!(
            f.provider
                .get_identity(&SessionRef::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_bare_session_id_is_not_a_credential() {
        let f = fake().await;
        assert!(identify(&f.provider, "sess_active").await.is_none());
        assert!(identify(&f.provider, "  ").await.is_none());
        assert_eq!(f.session_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsigned_token_is_rejected() {
        let f = fake().await;
        let claims = URL_SAFE_NO_PAD.encode(br#"{"sid":"sess_active"}"#);
        let unsigned = format!("eyJhbGciOiJub25lIn0.{claims}.not-a-signature");
        assert!(identify(&f.provider, &unsigned).await.is_none());
        assert_eq!(f.session_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tampered_claims_fail_signature_check() {
        let f = fake().await;
        let genuine = session_token("sess_ended");
        let mut parts = genuine.split('.');
        let (head, _, sig) = (parts.next().unwrap(), parts.next(), parts.next().unwrap());
        let forged_claims = URL_SAFE_NO_PAD.encode(
            json!({"sid": "sess_active", "sub": "user_1", "exp": now() + 300}).to_string(),
        );
        let forged = format!("{head}.{forged_claims}.{sig}");
        assert!(identify(&f.provider, &forged).await.is_none());
        assert_eq!(f.session_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_or_premature_token_is_rejected() {
        let f = fake().await;
        let expired = sign(&json!({"sid": "sess_active", "exp": now() - 600}));
        let premature =
            sign(&json!({"sid": "sess_active", "nbf": now() + 600, "exp": now() + 900}));
        assert!(identify(&f.provider, &expired).await.is_none());
        assert!(identify(&f.provider, &premature).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_signing_key_is_rejected() {
        let f = fake().await;
        let header = Header {
            kid: Some("ins_other".into()),
            ..Header::new(Algorithm::RS256)
        };
        let claims = json!({"sid": "sess_active", "exp": now() + 300});
        let token =
            encode(&header, &claims, &EncodingKey::from_rsa_pem(SIGNING_KEY).unwrap()).unwrap();
        assert!(identify(&f.provider, &token).await.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_revokes_session() {
        let f = fake().await;
        f.provider
            .sign_out(&presenting(&session_token("sess_active")))
            .await
            .unwrap();
        assert!(f.revoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_sign_out_ignores_bare_session_id() {
        let f = fake().await;
        f.provider.sign_out(&presenting("sess_active")).await.unwrap();
        assert!(!f.revoked.load(Ordering::SeqCst));
    }
}

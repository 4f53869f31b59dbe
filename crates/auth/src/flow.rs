//! Interactive sign-in flows for the CLI.

use mailbridge_config::Config;
use mailbridge_types::{
    BridgeError, Identity, IdentityProvider, OAuthToken, SessionKey, SessionRef, TokenKind,
    traits::Result,
};

use crate::{bridge::CredentialBridge, callback, google, pkce::PkceSession};

/// What a completed sign-in produced.
#[derive(Debug)]
pub struct LoginOutcome {
    pub identity: Identity,
    /// `None` if the backend refused the exchange; the Google grant is still
    /// stored in that case.
    pub backend_token: Option<OAuthToken>,
}

/// Google PKCE flow: open the consent page, wait for the redirect, store the
/// grant under `key`, then exchange the Google identity for a backend token.
///
/// # Errors
///
/// Returns an error on missing client credentials, a state mismatch, a
/// missing `code`, a rejected code exchange, or an unreadable identity.
pub async fn login_google(
    config: &Config,
    http: &reqwest::Client,
    bridge: &CredentialBridge,
    key: &SessionKey,
) -> Result<LoginOutcome> {
    let (client_id, client_secret) = config.google_client()?;
    let pkce = PkceSession::generate();
    let redirect = google::redirect_uri(google::CALLBACK_PORT);
    let auth_url = google::build_auth_url(
        &config.google.auth_url,
        client_id,
        &redirect,
        &pkce.challenge,
        &pkce.state,
    );

    let listener = callback::bind_callback(google::CALLBACK_PORT).await?;
    open_browser(&auth_url);

    let params = callback::accept_callback(listener).await?;
    if let Some(err) = params.get("error") {
        return Err(BridgeError::Auth(format!("google sign-in refused: {err}")));
    }

    if !pkce.state_matches(params.get("state").map(String::as_str)) {
        return Err(BridgeError::Auth(
            "state mismatch, possible CSRF attack".into(),
        ));
    }

    let code = params
        .get("code")
        .ok_or_else(|| BridgeError::Auth("missing code parameter in callback".into()))?;

    let form = google::token_form_params(client_id, client_secret, code, &pkce.verifier, &redirect);
    let resp = http
        .post(&config.google.token_url)
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await?;
    let json: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| BridgeError::Auth(format!("failed to parse token response: {e}")))?;
    let grant = google::parse_token_response(&json)?;

    bridge.store().save(key, TokenKind::Google, &grant).await?;
    tracing::info!(session = %key, "google grant stored");

    let identity = google::fetch_userinfo(http, &config.google.userinfo_url, &grant.access_token)
        .await
        .map_err(|e| match e {
            BridgeError::GrantExpired => {
                BridgeError::Auth("google rejected the new access token".into())
            }
            other => other,
        })?;

    let backend_token = bridge.resolve_for_key(key, &identity).await;
    Ok(LoginOutcome {
        identity,
        backend_token,
    })
}

/// Exchange an identity given on the command line, without a browser.
///
/// # Errors
///
/// Returns [`BridgeError::Validation`] when the email is blank and
/// [`BridgeError::Auth`] when the backend refuses the exchange.
pub async fn login_with_email(
    bridge: &CredentialBridge,
    key: &SessionKey,
    email: &str,
    name: Option<&str>,
) -> Result<LoginOutcome> {
    let email = email.trim();
    if email.is_empty() {
        return Err(BridgeError::Validation("email is required".into()));
    }
    let mut identity = Identity::new(IdentityProvider::Google, email, email);
    if let Some(name) = name {
        identity = identity.with_display_name(name);
    }
    let backend_token = bridge.resolve_for_key(key, &identity).await;
    if backend_token.is_none() {
        return Err(BridgeError::Auth(
            "the backend did not issue a token; see the log for details".into(),
        ));
    }
    Ok(LoginOutcome {
        identity,
        backend_token,
    })
}

/// End the profile's session: hand the stored Google grant to the provider
/// for upstream revocation, then clear every token kept under `key`.
///
/// Prefers the refresh token, since revoking it ends the whole grant.
///
/// # Errors
///
/// Returns a storage error if the store cannot be read or written. Upstream
/// revocation failures are only logged.
pub async fn logout(bridge: &CredentialBridge, key: &SessionKey) -> Result<()> {
    let bearer = bridge
        .store()
        .load(key, TokenKind::Google)
        .await?
        .map(|grant| grant.refresh_token.unwrap_or(grant.access_token));
    let session = SessionRef {
        session_id: None,
        bearer,
    };
    bridge.sign_out(&session, key).await
}

fn open_browser(url: &str) {
    eprintln!("Opening browser: {url}");
    if let Err(e) = open::that(url) {
        tracing::warn!(error = %e, "failed to open browser");
        eprintln!("Please open the following URL manually to complete sign-in:");
        eprintln!("{url}");
    }
}

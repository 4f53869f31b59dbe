//! Lifecycle of stored Google grants used by the calendar proxy when
//! `calendar.token_source: session`.
//!
//! - Load the session's grant from the [`TokenStore`].
//! - Refresh it through Google's token endpoint when it has expired.
//! - Hold off repeated refresh attempts per session for 30 s.
//! - Drop grants Google reports as revoked (`invalid_grant`).

use arc_swap::ArcSwap;
use mailbridge_config::Config;
use mailbridge_types::{
    BridgeError, OAuthToken, SessionKey, TokenKind, TokenState, TokenStore, traits::Result,
};
use secrecy::SecretString;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::google;

const REFRESH_COOLDOWN: Duration = Duration::from_secs(30);

/// Reason given when the session holds no Google grant at all.
pub const NO_GRANT_MESSAGE: &str = "No access token provided";

/// Reason given while a failed refresh is cooling down.
pub const REFRESH_COOLDOWN_MESSAGE: &str =
    "Calendar access is temporarily unavailable. Please try again shortly.";

struct RefreshState {
    last_refresh_attempt: Option<Instant>,
}

pub struct GrantManager {
    store: Arc<dyn TokenStore>,
    http: reqwest::Client,
    config: Arc<ArcSwap<Config>>,
    state: Mutex<HashMap<SessionKey, RefreshState>>,
}

impl GrantManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        http: reqwest::Client,
        config: Arc<ArcSwap<Config>>,
    ) -> Self {
        Self {
            store,
            http,
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// A usable Google grant for the session, refreshing it if expired.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Unauthenticated`] if the session holds no grant.
    /// - [`BridgeError::GrantExpired`] if the grant is expired and cannot be
    ///   renewed, or Google rejected the refresh.
    /// - [`BridgeError::Api`] with status 503 while the refresh cooldown is
    ///   active.
    pub async fn get_grant(&self, key: &SessionKey) -> Result<OAuthToken> {
        let token = self
            .store
            .load(key, TokenKind::Google)
            .await?
            .ok_or_else(|| BridgeError::Unauthenticated(NO_GRANT_MESSAGE.into()))?;

        match token.state() {
            TokenState::Usable => Ok(token),
            TokenState::NeedsRefresh => self.refresh(key, &token).await,
            TokenState::Dead => Err(BridgeError::GrantExpired),
        }
    }

    /// Whether the session holds a grant that is usable or renewable.
    pub async fn has_grant(&self, key: &SessionKey) -> bool {
        match self.store.load(key, TokenKind::Google).await {
            Ok(Some(t)) => t.state() != TokenState::Dead,
            _ => false,
        }
    }

    /// Store a grant for the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails to persist the token.
    pub async fn save_grant(&self, key: &SessionKey, token: &OAuthToken) -> Result<()> {
        self.store.save(key, TokenKind::Google, token).await
    }

    async fn refresh(&self, key: &SessionKey, token: &OAuthToken) -> Result<OAuthToken> {
        {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(rs) = state.get(key)
                && let Some(last) = rs.last_refresh_attempt
                && last.elapsed() < REFRESH_COOLDOWN
            {
                tracing::debug!(session = %key, "google grant refresh cooling down");
                return Err(BridgeError::Api {
                    status: 503,
                    detail: REFRESH_COOLDOWN_MESSAGE.into(),
                });
            }
            state.insert(
                key.clone(),
                RefreshState {
                    last_refresh_attempt: Some(Instant::now()),
                },
            );
        }

        let Some(refresh_token) = token.refresh_token.as_deref() else {
            return Err(BridgeError::GrantExpired);
        };
        let (token_url, client_id, client_secret) = {
            let config = self.config.load();
            let (id, secret) = config.google_client()?;
            (
                config.google.token_url.clone(),
                id.to_string(),
                SecretString::from(secret.to_string()),
            )
        };

        tracing::debug!(session = %key, "refreshing google grant");
        match google::refresh_grant(&self.http, &token_url, &client_id, &client_secret, refresh_token)
            .await
        {
            Ok(fresh) => {
                self.save_grant(key, &fresh).await?;
                tracing::info!(session = %key, "google grant refreshed");
                Ok(fresh)
            }
            Err(e) if e.is_expired_grant() => {
                tracing::warn!(session = %key, error = %e, "google grant revoked; dropping it");
                self.store.remove(key, TokenKind::Google).await?;
                Err(BridgeError::GrantExpired)
            }
            Err(e) => Err(e),
        }
    }
}

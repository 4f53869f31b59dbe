//! Stored credentials.
//!
//! Backend bearers carry no expiry and stay usable until the backend rejects
//! them. Google grants expire after about an hour and usually carry a refresh
//! token.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds before the real expiry at which a grant is already treated as
/// expired, so a calendar call never starts with a token about to lapse.
pub const EXPIRY_SKEW_SECS: u64 = 60;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// A bearer credential as kept in a [`TokenStore`](crate::TokenStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl OAuthToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            token_type: Some("Bearer".to_string()),
        }
    }

    /// Expire `expires_in_secs` seconds from now, the way token endpoints
    /// report lifetimes.
    #[must_use]
    pub fn with_expiry(mut self, expires_in_secs: u64) -> Self {
        self.expires_at = Some(unix_now().saturating_add(expires_in_secs));
        self
    }

    #[must_use]
    pub fn with_refresh(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// `true` once the token is within [`EXPIRY_SKEW_SECS`] of its expiry.
    /// Tokens without an expiry never expire locally.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| unix_now().saturating_add(EXPIRY_SKEW_SECS) >= at)
    }

    #[must_use]
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|r| !r.is_empty())
    }

    #[must_use]
    pub fn state(&self) -> TokenState {
        match (self.is_expired(), self.can_refresh()) {
            (false, _) => TokenState::Usable,
            (true, true) => TokenState::NeedsRefresh,
            (true, false) => TokenState::Dead,
        }
    }
}

/// What a caller has to do before using a stored token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Usable,
    /// Expired, but the refresh token can mint a new one.
    NeedsRefresh,
    /// Expired with nothing to refresh it; the user must sign in again.
    Dead,
}

/// Which credential a stored token represents within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Bearer issued by the mail backend after identity exchange.
    Backend,
    /// Google OAuth grant used for calendar calls.
    Google,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Google => "google",
        }
    }

    #[must_use]
    pub fn all() -> &'static [Self] {
        &[Self::Backend, Self::Google]
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Async traits shared across all mailbridge crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `mailbridge-types`, not on each other.

use crate::{Identity, IdentityProvider, OAuthToken, SessionKey, SessionRef, TokenKind};
use async_trait::async_trait;

pub use crate::error::Result;

/// Session-scoped storage for bearer tokens, keyed by `(session, kind)`.
///
/// There is no process-wide "current token": every read and write names the
/// session it belongs to.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the token of the given kind for a session.
    async fn load(&self, session: &SessionKey, kind: TokenKind) -> Result<Option<OAuthToken>>;
    /// Persist (or overwrite) the token of the given kind for a session.
    async fn save(&self, session: &SessionKey, kind: TokenKind, token: &OAuthToken) -> Result<()>;
    /// Remove the token of the given kind for a session. Removing a missing
    /// token is not an error.
    async fn remove(&self, session: &SessionKey, kind: TokenKind) -> Result<()>;

    /// Remove every token belonging to a session.
    async fn remove_session(&self, session: &SessionKey) -> Result<()> {
        for kind in TokenKind::all() {
            self.remove(session, *kind).await?;
        }
        Ok(())
    }

    /// List the sessions that currently hold at least one token.
    async fn list_sessions(&self) -> Result<Vec<SessionKey>> {
        Ok(Vec::new())
    }
}

/// An upstream identity system (Clerk, Google) that can vouch for a caller
/// and trade that identity for a backend bearer token.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Which identity system this is.
    fn kind(&self) -> IdentityProvider;

    /// Resolve the caller's identity from what it presented.
    ///
    /// Returns `Ok(None)` when the caller is simply not signed in, and
    /// [`BridgeError::GrantExpired`](crate::BridgeError::GrantExpired) when a
    /// credential it presented was once valid but is no longer accepted.
    async fn get_identity(&self, session: &SessionRef) -> Result<Option<Identity>>;

    /// Trade an identity for a backend bearer token.
    async fn exchange_token(&self, identity: &Identity) -> Result<OAuthToken>;

    /// End the upstream session. The default does nothing.
    async fn sign_out(&self, _session: &SessionRef) -> Result<()> {
        Ok(())
    }
}

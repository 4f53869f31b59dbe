//! Process-local token store used by the proxy server.

use async_trait::async_trait;
use mailbridge_types::{OAuthToken, SessionKey, TokenKind, TokenStore, traits::Result};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

type Sessions = BTreeMap<SessionKey, HashMap<TokenKind, OAuthToken>>;

/// Tokens grouped per session. A session whose last token is removed
/// disappears from [`list_sessions`](TokenStore::list_sessions).
#[derive(Default)]
pub struct InMemoryTokenStore {
    sessions: RwLock<Sessions>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Every write leaves the map consistent, so a poisoned lock is still
    // safe to use.
    fn read(&self) -> RwLockReadGuard<'_, Sessions> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Sessions> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self, session: &SessionKey, kind: TokenKind) -> Result<Option<OAuthToken>> {
        Ok(self
            .read()
            .get(session)
            .and_then(|tokens| tokens.get(&kind))
            .cloned())
    }

    async fn save(&self, session: &SessionKey, kind: TokenKind, token: &OAuthToken) -> Result<()> {
        self.write()
            .entry(session.clone())
            .or_default()
            .insert(kind, token.clone());
        Ok(())
    }

    async fn remove(&self, session: &SessionKey, kind: TokenKind) -> Result<()> {
        let mut sessions = self.write();
        if let Some(tokens) = sessions.get_mut(session) {
            tokens.remove(&kind);
            if tokens.is_empty() {
                sessions.remove(session);
            }
        }
        Ok(())
    }

    async fn remove_session(&self, session: &SessionKey) -> Result<()> {
        self.write().remove(session);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionKey>> {
        Ok(self.read().keys().cloned().collect())
    }
}

//! Credential bridge: trades an upstream identity for a backend bearer token
//! and caches it per session.
//!
//! Responsibilities:
//! - Resolve the caller's identity through the configured [`AuthProvider`].
//! - Return the session's cached backend token, or exchange for one.
//! - Serialize concurrent exchanges for the same session key.
//! - Clear the session's tokens on sign-out.

use mailbridge_types::{
    AuthProvider, Identity, OAuthToken, SessionKey, SessionRef, TokenKind, TokenStore,
    traits::Result,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

pub struct CredentialBridge {
    provider: Arc<dyn AuthProvider>,
    store: Arc<dyn TokenStore>,
    /// One async lock per session key with an exchange in flight.
    inflight: Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl CredentialBridge {
    pub fn new(provider: Arc<dyn AuthProvider>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            provider,
            store,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Resolve who the caller is.
    ///
    /// # Errors
    ///
    /// Propagates provider failures other than "not signed in".
    pub async fn identify(&self, session: &SessionRef) -> Result<Option<Identity>> {
        if session.is_anonymous() {
            return Ok(None);
        }
        self.provider.get_identity(session).await
    }

    /// The backend token for `identity`, cached under its own session key.
    pub async fn resolve_backend_token(&self, identity: &Identity) -> Option<OAuthToken> {
        self.resolve_for_key(&identity.session_key(), identity).await
    }

    /// The backend token for `identity`, cached under `key`.
    ///
    /// Never fails: a blank email yields `None` without a network call, and
    /// exchange failures are logged and yield `None`.
    pub async fn resolve_for_key(&self, key: &SessionKey, identity: &Identity) -> Option<OAuthToken> {
        if !identity.has_email() {
            tracing::debug!(session = %key, "identity has no email; skipping exchange");
            return None;
        }
        if let Some(token) = self.cached_token(key).await {
            return Some(token);
        }

        let lock = self.lock_for(key);
        let guard = lock.lock().await;

        // Another task may have finished the exchange while we waited.
        let result = if let Some(token) = self.cached_token(key).await {
            Some(token)
        } else {
            self.exchange_and_store(key, identity).await
        };

        drop(guard);
        self.release_lock(key, lock);
        result
    }

    async fn exchange_and_store(&self, key: &SessionKey, identity: &Identity) -> Option<OAuthToken> {
        match self.provider.exchange_token(identity).await {
            Ok(token) => {
                if let Err(e) = self.store.save(key, TokenKind::Backend, &token).await {
                    tracing::warn!(session = %key, error = %e, "failed to cache backend token");
                }
                tracing::info!(session = %key, provider = %identity.provider, "backend token issued");
                Some(token)
            }
            Err(e) => {
                tracing::warn!(session = %key, provider = %identity.provider, error = %e, "failed to get backend token");
                None
            }
        }
    }

    /// The session's cached backend token, if any.
    pub async fn cached_token(&self, key: &SessionKey) -> Option<OAuthToken> {
        match self.store.load(key, TokenKind::Backend).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(session = %key, error = %e, "token store read failed");
                None
            }
        }
    }

    /// Forget the session's backend token. Clearing an empty session is fine.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be written.
    pub async fn clear_token(&self, key: &SessionKey) -> Result<()> {
        self.store.remove(key, TokenKind::Backend).await
    }

    /// End the upstream session, then drop every token cached for `key`.
    ///
    /// A failing upstream sign-out is logged; local tokens are cleared
    /// regardless.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be written.
    pub async fn sign_out(&self, session: &SessionRef, key: &SessionKey) -> Result<()> {
        if let Err(e) = self.provider.sign_out(session).await {
            tracing::warn!(session = %key, provider = %self.provider.kind(), error = %e, "upstream sign-out failed");
        }
        self.store.remove_session(key).await?;
        tracing::info!(session = %key, "signed out");
        Ok(())
    }

    fn lock_for(&self, key: &SessionKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self
            .inflight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(map.entry(key.clone()).or_default())
    }

    fn release_lock(&self, key: &SessionKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut map = self
            .inflight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        drop(lock);
        // Only the map still holds it: nobody else is waiting.
        if map.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mailbridge_store::InMemoryTokenStore;
    use mailbridge_types::{BridgeError, IdentityProvider};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeProvider {
        exchanges: AtomicUsize,
        fail: AtomicBool,
        signed_out: AtomicBool,
    }

    #[async_trait]
    impl AuthProvider for FakeProvider {
        fn kind(&self) -> IdentityProvider {
            IdentityProvider::Google
        }

        async fn get_identity(&self, session: &SessionRef) -> Result<Option<Identity>> {
            Ok(session
                .bearer
                .as_ref()
                .map(|b| Identity::new(IdentityProvider::Google, format!("{b}@example.com"), b)))
        }

        async fn exchange_token(&self, identity: &Identity) -> Result<OAuthToken> {
            let n = self.exchanges.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(BridgeError::Upstream {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(OAuthToken::new(format!("jwt-{}-{n}", identity.provider_id)))
        }

        async fn sign_out(&self, _session: &SessionRef) -> Result<()> {
            self.signed_out.store(true, Ordering::SeqCst);
            Err(BridgeError::Auth("revocation endpoint down".into()))
        }
    }

    fn bridge() -> (Arc<FakeProvider>, CredentialBridge) {
        let provider = Arc::new(FakeProvider::default());
        let bridge = CredentialBridge::new(
            Arc::clone(&provider) as Arc<dyn AuthProvider>,
            Arc::new(InMemoryTokenStore::new()),
        );
        (provider, bridge)
    }

    fn ada() -> Identity {
        Identity::new(IdentityProvider::Google, "ada@example.com", "ada")
    }

    #[tokio::test]
    async fn test_second_resolve_uses_cache() {
        let (provider, bridge) = bridge();
        let first = bridge.resolve_backend_token(&ada()).await.unwrap();
        let second = bridge.resolve_backend_token(&ada()).await.unwrap();
        assert_eq!(first.access_token, second.access_token);
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_exchange_once() {
        let (provider, bridge) = bridge();
        let bridge = Arc::new(bridge);
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let bridge = Arc::clone(&bridge);
                tokio::spawn(async move { bridge.resolve_backend_token(&ada()).await })
            })
            .collect();
        for t in tasks {
            assert!(t.await.unwrap().is_some());
        }
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 1);
        assert!(bridge.inflight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_email_skips_exchange() {
        let (provider, bridge) = bridge();
        let id = Identity::new(IdentityProvider::Google, "  ", "x");
        assert!(bridge.resolve_backend_token(&id).await.is_none());
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_exchange_is_none_and_not_cached() {
        let (provider, bridge) = bridge();
        provider.fail.store(true, Ordering::SeqCst);
        assert!(bridge.resolve_backend_token(&ada()).await.is_none());
        assert!(bridge.cached_token(&ada().session_key()).await.is_none());

        provider.fail.store(false, Ordering::SeqCst);
        assert!(bridge.resolve_backend_token(&ada()).await.is_some());
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_tokens() {
        let (_, bridge) = bridge();
        let bob = Identity::new(IdentityProvider::Google, "bob@example.com", "bob");
        let a = bridge.resolve_backend_token(&ada()).await.unwrap();
        let b = bridge.resolve_backend_token(&bob).await.unwrap();
        assert_ne!(a.access_token, b.access_token);
    }

    #[tokio::test]
    async fn test_clear_forces_new_exchange() {
        let (provider, bridge) = bridge();
        let key = ada().session_key();
        bridge.clear_token(&key).await.unwrap();
        bridge.resolve_backend_token(&ada()).await.unwrap();
        bridge.clear_token(&key).await.unwrap();
        assert!(bridge.cached_token(&key).await.is_none());
        bridge.resolve_backend_token(&ada()).await.unwrap();
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sign_out_clears_even_if_upstream_fails() {
        let (provider, bridge) = bridge();
        let key = ada().session_key();
        bridge.resolve_backend_token(&ada()).await.unwrap();
        bridge
            .store()
            .save(&key, TokenKind::Google, &OAuthToken::new("ya29"))
            .await
            .unwrap();

        let session = SessionRef {
            session_id: None,
            bearer: Some("ada".into()),
        };
        bridge.sign_out(&session, &key).await.unwrap();
        assert!(provider.signed_out.load(Ordering::SeqCst));
        assert!(bridge.cached_token(&key).await.is_none());
        assert!(
            bridge
                .store()
                .load(&key, TokenKind::Google)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_identify_anonymous_skips_provider() {
        let (_, bridge) = bridge();
        assert!(
            bridge
                .identify(&SessionRef::default())
                .await
                .unwrap()
                .is_none()
        );
        let id = bridge
            .identify(&SessionRef {
                session_id: None,
                bearer: Some("ada".into()),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id.email, "ada@example.com");
    }
}

//! Builds the configured [`AuthProvider`].

use arc_swap::ArcSwap;
use mailbridge_config::Config;
use mailbridge_types::{AuthProvider, BridgeError, IdentityProvider, traits::Result};
use secrecy::SecretString;
use std::sync::Arc;

use crate::{clerk::ClerkProvider, exchange::BackendExchange, google::GoogleProvider};

/// Create the identity provider named by `auth.provider`.
///
/// The choice is made once; endpoint URLs and the Clerk secret are captured
/// at construction, while the backend URL is read per exchange.
///
/// # Errors
///
/// Returns [`BridgeError::Config`] if Clerk is selected without a secret key.
pub fn make_provider(
    config: &Arc<ArcSwap<Config>>,
    http: reqwest::Client,
) -> Result<Arc<dyn AuthProvider>> {
    let snapshot = config.load();
    let exchange = BackendExchange::new(http.clone(), Arc::clone(config));
    match snapshot.auth.provider {
        IdentityProvider::Clerk => {
            let secret = snapshot
                .auth
                .clerk_secret_key
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    BridgeError::Config("missing required setting `auth.clerk_secret_key`".into())
                })?;
            Ok(Arc::new(ClerkProvider::new(
                http,
                exchange,
                snapshot.auth.clerk_api_base.clone(),
                SecretString::from(secret.to_string()),
            )))
        }
        IdentityProvider::Google => Ok(Arc::new(GoogleProvider::new(
            http,
            exchange,
            snapshot.google.userinfo_url.clone(),
            snapshot.google.revoke_url.clone(),
        ))),
    }
}

//! Per-login PKCE material (RFC 7636, S256) and the anti-CSRF `state`.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore as _;
use sha2::{Digest, Sha256};

/// Secrets for one Google sign-in attempt. The verifier and state never
/// leave the process; only the challenge and state go into the consent URL.
#[derive(Debug, Clone)]
pub struct PkceSession {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceSession {
    #[must_use]
    pub fn generate() -> Self {
        let verifier = URL_SAFE_NO_PAD.encode(random_bytes::<32>());
        let challenge = s256(&verifier);
        let state = URL_SAFE_NO_PAD.encode(random_bytes::<16>());
        Self {
            verifier,
            challenge,
            state,
        }
    }

    /// Whether the `state` echoed back by the redirect is ours.
    #[must_use]
    pub fn state_matches(&self, received: Option<&str>) -> bool {
        received == Some(self.state.as_str())
    }
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// `BASE64URL(SHA256(verifier))` without padding.
#[must_use]
pub fn s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

//! Upstream identities, session references and cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which upstream identity system vouched for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityProvider {
    Clerk,
    Google,
}

impl fmt::Display for IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clerk => write!(f, "clerk"),
            Self::Google => write!(f, "google"),
        }
    }
}

impl std::str::FromStr for IdentityProvider {
    type Err = crate::BridgeError;

    /// Parse a provider name or alias into an [`IdentityProvider`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Config`] for unknown names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clerk" => Ok(Self::Clerk),
            "google" | "nextauth" => Ok(Self::Google),
            other => Err(crate::BridgeError::Config(format!(
                "unknown identity provider: {other}"
            ))),
        }
    }
}

/// A signed-in user as reported by the upstream identity system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub provider: IdentityProvider,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Provider-assigned subject (Clerk user id, Google `sub`).
    pub provider_id: String,
}

impl Identity {
    /// Create an identity with no display name.
    pub fn new(
        provider: IdentityProvider,
        email: impl Into<String>,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            email: email.into(),
            display_name: None,
            provider_id: provider_id.into(),
        }
    }

    /// Attach a display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Returns `true` if the identity carries a usable email address.
    #[must_use]
    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }

    /// The display name, falling back to the email address.
    #[must_use]
    pub fn display_name_or_email(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }

    /// The provider id, falling back to the email address.
    #[must_use]
    pub fn provider_id_or_email(&self) -> &str {
        if self.provider_id.is_empty() {
            &self.email
        } else {
            &self.provider_id
        }
    }

    /// The cache key for tokens belonging to this identity.
    #[must_use]
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(format!("{}:{}", self.provider, self.provider_id_or_email()))
    }
}

/// Key under which a session's tokens are cached.
///
/// Tokens are always scoped to one key so that concurrent users served by the
/// same process never observe each other's credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// What a caller presented to identify itself: an upstream session token
/// (e.g. Clerk's `__session` JWT) and/or a bearer credential. Nothing here is
/// trusted until a provider verifies it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRef {
    pub session_id: Option<String>,
    pub bearer: Option<String>,
}

impl SessionRef {
    /// Returns `true` if the caller presented nothing at all.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.session_id.is_none() && self.bearer.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_provider_display_and_parse() {
        assert_eq!(IdentityProvider::Clerk.to_string(), "clerk");
        assert_eq!(IdentityProvider::Google.to_string(), "google");
        assert_eq!(
            IdentityProvider::from_str("nextauth").unwrap(),
            IdentityProvider::Google
        );
        assert!(IdentityProvider::from_str("okta").is_err());
    }

    #[test]
    fn test_session_key_scoped_by_provider_and_subject() {
        let a = Identity::new(IdentityProvider::Google, "a@example.com", "111");
        let b = Identity::new(IdentityProvider::Clerk, "a@example.com", "111");
        assert_eq!(a.session_key().as_str(), "google:111");
        assert_ne!(a.session_key(), b.session_key());
    }

    #[test]
    fn test_session_key_falls_back_to_email() {
        let id = Identity::new(IdentityProvider::Google, "a@example.com", "");
        assert_eq!(id.session_key().as_str(), "google:a@example.com");
    }

    #[test]
    fn test_display_name_fallback() {
        let id = Identity::new(IdentityProvider::Clerk, "a@example.com", "user_1");
        assert_eq!(id.display_name_or_email(), "a@example.com");
        let id = id.with_display_name("Ada");
        assert_eq!(id.display_name_or_email(), "Ada");
    }

    #[test]
    fn test_has_email_rejects_blank() {
        assert!(!Identity::new(IdentityProvider::Google, "  ", "1").has_email());
        assert!(Identity::new(IdentityProvider::Google, "x@y.z", "1").has_email());
    }

    #[test]
    fn test_anonymous_session_ref() {
        assert!(SessionRef::default().is_anonymous());
        let s = SessionRef {
            session_id: Some("sess_1".into()),
            bearer: None,
        };
        assert!(!s.is_anonymous());
    }
}

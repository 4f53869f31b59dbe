//! Unified error type for the mailbridge workspace.

use thiserror::Error;

/// Message returned to callers whose upstream grant is no longer accepted.
pub const GRANT_EXPIRED_MESSAGE: &str = "Authentication expired. Please sign in again.";

/// Substring the OAuth provider uses for revoked or expired grants.
const INVALID_GRANT: &str = "invalid_grant";

/// Enumerates all error kinds that can occur across mailbridge crates.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No identity or credential is present; the reason is shown to the user.
    #[error("{0}")]
    Unauthenticated(String),

    /// The identity is present but the upstream provider rejected its grant.
    #[error("{}", GRANT_EXPIRED_MESSAGE)]
    GrantExpired,

    /// OAuth or identity-provider failure.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Missing or malformed input caught before any network call.
    #[error("{0}")]
    Validation(String),

    /// The mail backend returned a non-success status; `detail` is its message.
    #[error("{detail}")]
    Api { status: u16, detail: String },

    /// An upstream provider (Google, Clerk) returned a non-success status.
    #[error("upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistent storage (`SQLite`) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for BridgeError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl BridgeError {
    /// Returns `true` if the upstream provider no longer accepts the caller's
    /// grant: an explicit 401, or any failure mentioning `invalid_grant`.
    #[must_use]
    pub fn is_expired_grant(&self) -> bool {
        match self {
            Self::GrantExpired => true,
            Self::Upstream { status, body } => *status == 401 || body.contains(INVALID_GRANT),
            Self::Auth(msg) | Self::Http(msg) => msg.contains(INVALID_GRANT),
            _ => false,
        }
    }

    /// Returns `true` if the error should be reported as "not signed in".
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_displays_detail_verbatim() {
        let err = BridgeError::Api {
            status: 404,
            detail: "Not found".to_string(),
        };
        assert_eq!(err.to_string(), "Not found");
    }

    #[test]
    fn test_grant_expired_message() {
        assert_eq!(
            BridgeError::GrantExpired.to_string(),
            "Authentication expired. Please sign in again."
        );
    }

    #[test]
    fn test_unauthenticated_displays_reason() {
        let err = BridgeError::Unauthenticated("No access token provided".into());
        assert_eq!(err.to_string(), "No access token provided");
        assert!(err.is_unauthenticated());
    }

    #[test]
    fn test_error_display_upstream() {
        let err = BridgeError::Upstream {
            status: 503,
            body: "backend unavailable".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("503"));
        assert!(s.contains("backend unavailable"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid {{{").unwrap_err();
        let err: BridgeError = json_err.into();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }

    #[test]
    fn test_expired_grant_on_upstream_401() {
        assert!(
            BridgeError::Upstream {
                status: 401,
                body: String::new()
            }
            .is_expired_grant()
        );
    }

    #[test]
    fn test_expired_grant_on_invalid_grant_body_any_status() {
        assert!(
            BridgeError::Upstream {
                status: 400,
                body: r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#.into()
            }
            .is_expired_grant()
        );
        assert!(BridgeError::Auth("refresh failed: invalid_grant".into()).is_expired_grant());
    }

    #[test]
    fn test_not_expired_grant_for_other_failures() {
        assert!(
            !BridgeError::Upstream {
                status: 500,
                body: "boom".into()
            }
            .is_expired_grant()
        );
        assert!(
            !BridgeError::Upstream {
                status: 403,
                body: "forbidden".into()
            }
            .is_expired_grant()
        );
        assert!(!BridgeError::Config("bad".into()).is_expired_grant());
        assert!(!BridgeError::Unauthenticated("Unauthorized".into()).is_expired_grant());
    }
}

//! Core types and traits for the mailbridge workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! bridge: the error taxonomy, identity and session references, stored token
//! representations, and the async traits that the store and auth layers
//! implement.

pub mod error;
pub mod identity;
pub mod token;
pub mod traits;

pub use error::BridgeError;
pub use identity::{Identity, IdentityProvider, SessionKey, SessionRef};
pub use token::{OAuthToken, TokenKind, TokenState};
pub use traits::{AuthProvider, TokenStore};

//! Identity resolution and credential bridging.
//!
//! [`CredentialBridge`] turns an upstream identity (Clerk session, Google
//! access token) into a session-scoped backend token. [`GrantManager`] keeps
//! stored Google grants usable for calendar calls. The `flow` module drives
//! the interactive sign-in used by the CLI.

pub mod bridge;
pub mod callback;
pub mod clerk;
pub mod exchange;
pub mod factory;
pub mod flow;
pub mod google;
pub mod grant;
pub mod http_util;
pub mod pkce;

pub use bridge::CredentialBridge;
pub use factory::make_provider;
pub use google::{GoogleCredential, GoogleOAuthClient};
pub use grant::GrantManager;

//! Typed client for the mail backend and its auxiliary services.
//!
//! Every call goes through [`ApiClient::request`], which attaches the
//! session's cached backend token and normalizes error bodies into
//! [`mailbridge_types::BridgeError::Api`].

pub mod account;
pub mod ai;
pub mod campaigns;
pub mod dashboard;
pub mod emails;
pub mod http;
pub mod newsletters;

pub use http::{ApiClient, NOT_AUTHENTICATED, RequestOptions};

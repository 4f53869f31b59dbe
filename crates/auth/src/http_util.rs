//! Shared send → status-check helper for upstream calls (backend, Clerk,
//! Google).

use mailbridge_types::{BridgeError, traits::Result};
use reqwest::{RequestBuilder, Response};

/// Sends a request and checks for a success status.
///
/// On non-2xx responses, reads the body text and returns
/// [`BridgeError::Upstream`].
///
/// # Errors
///
/// Returns `BridgeError::Upstream` on non-success status codes, or
/// `BridgeError::Http` if the request fails to send.
pub async fn send_checked(builder: RequestBuilder) -> Result<Response> {
    let resp = builder.send().await?;
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(BridgeError::Upstream {
            status: status.as_u16(),
            body,
        })
    }
}

//! One-shot loopback listener for the Google sign-in redirect.
//!
//! Browsers often hit the loopback port for other paths first
//! (`/favicon.ico`); those get a 404 and the listener keeps waiting for
//! `/callback`.

use mailbridge_types::{BridgeError, traits::Result};
use std::{collections::HashMap, time::Duration};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::{TcpListener, TcpStream},
};

/// How long the user has to finish the consent screen.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);
const CALLBACK_PATH: &str = "/callback";

const DONE_PAGE: &str = "<!doctype html><title>mailbridge</title>\
    <h1>Signed in to mailbridge</h1><p>You can close this tab and return to the terminal.</p>";

/// Bind before opening the browser so the redirect cannot race the listener.
///
/// # Errors
///
/// Returns [`BridgeError::Auth`] if the port cannot be bound.
pub async fn bind_callback(port: u16) -> Result<TcpListener> {
    TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
        let hint = if e.kind() == std::io::ErrorKind::AddrInUse {
            " (another sign-in may still be waiting)"
        } else {
            ""
        };
        BridgeError::Auth(format!("cannot listen on 127.0.0.1:{port}{hint}: {e}"))
    })
}

/// Query parameters of the first request to `/callback`.
///
/// # Errors
///
/// Returns [`BridgeError::Auth`] on I/O failure or after [`CALLBACK_TIMEOUT`].
pub async fn accept_callback(listener: TcpListener) -> Result<HashMap<String, String>> {
    tokio::time::timeout(CALLBACK_TIMEOUT, wait_for_redirect(&listener))
        .await
        .map_err(|_| BridgeError::Auth("timed out waiting for the Google redirect".into()))?
}

async fn wait_for_redirect(listener: &TcpListener) -> Result<HashMap<String, String>> {
    loop {
        let (mut stream, _) = listener
            .accept()
            .await
            .map_err(|e| BridgeError::Auth(format!("callback accept failed: {e}")))?;
        let target = read_request_target(&mut stream).await?;

        match target.split_once('?').unwrap_or((target.as_str(), "")) {
            (CALLBACK_PATH, query) => {
                respond(&mut stream, "200 OK", DONE_PAGE).await;
                return serde_urlencoded::from_str(query)
                    .map_err(|e| BridgeError::Auth(format!("malformed redirect query: {e}")));
            }
            (path, _) => {
                tracing::debug!(path, "ignoring request on callback port");
                respond(&mut stream, "404 Not Found", "").await;
            }
        }
    }
}

/// The request target of `GET <target> HTTP/1.1`.
async fn read_request_target(stream: &mut TcpStream) -> Result<String> {
    let mut buf = vec![0u8; 8192];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| BridgeError::Auth(format!("callback read failed: {e}")))?;
    let head = String::from_utf8_lossy(&buf[..n]);
    Ok(head
        .lines()
        .next()
        .and_then(|line| line.split_ascii_whitespace().nth(1))
        .unwrap_or("/")
        .to_string())
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let reply = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(reply.as_bytes()).await {
        tracing::debug!(error = %e, "callback reply not delivered");
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn hit(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_waits_past_unrelated_requests() {
        let listener = bind_callback(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let waiting = tokio::spawn(accept_callback(listener));

        assert!(hit(port, "/favicon.ico").await.starts_with("HTTP/1.1 404"));
        let reply = hit(port, "/callback?code=4%2F0Ab&state=s1").await;
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert!(reply.contains("Signed in to mailbridge"));

        let params = waiting.await.unwrap().unwrap();
        assert_eq!(params["code"], "4/0Ab");
        assert_eq!(params["state"], "s1");
    }

    #[tokio::test]
    async fn test_denied_consent_is_reported_as_params() {
        let listener = bind_callback(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let waiting = tokio::spawn(accept_callback(listener));

        hit(port, "/callback?error=access_denied&state=s1").await;
        let params = waiting.await.unwrap().unwrap();
        assert_eq!(params.get("error").map(String::as_str), Some("access_denied"));
        assert!(!params.contains_key("code"));
    }

    #[tokio::test]
    async fn test_port_in_use() {
        let first = bind_callback(0).await.unwrap();
        let port = first.local_addr().unwrap().port();
        let err = bind_callback(port).await.unwrap_err();
        assert!(err.to_string().contains("another sign-in"));
    }
}

//! Implicit-grant token capture
//!
//! Runs a minimal local HTTP listener that intercepts the browser redirect
//! of the implicit OAuth grant. The platform delivers the bearer token as a
//! URL fragment, which browsers never send to a server; the root page
//! serves a one-line script that rewrites the fragment into a query string
//! and re-requests, at which point the listener can parse the token out of
//! the request line. The token never travels to a third party.
//!
//! The accept loop is strictly sequential, one connection at a time — it
//! exists only to complete the one-time authorization handshake.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Platform authorization endpoint
pub const AUTHORIZE_URL: &str = "https://id.twitch.tv/oauth2/authorize";

/// Scopes requested for the bot token
const OAUTH_SCOPES: &str = "user:bot user:read:chat user:write:chat";

/// Rewrites `#access_token=...` into `?access_token=...` client-side
const REDIRECTION_SCRIPT: &str =
    "<script>location.href = location.href.replace('#', '?')</script>";

/// Local listener that captures an access token from the OAuth redirect
pub struct TokenCapture {
    listener: TcpListener,
    client_id: String,
    redirect_url: String,
}

impl TokenCapture {
    /// Bind the capture listener; bind failure is fatal for the process
    pub async fn bind(
        port: u16,
        client_id: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(|e| {
            Error::Config(format!(
                "Failed to bind token capture listener on port {}: {}",
                port, e
            ))
        })?;
        Ok(Self {
            listener,
            client_id: client_id.into(),
            redirect_url: redirect_url.into(),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until a token is captured, then return it
    pub async fn capture(&self) -> Result<String> {
        loop {
            let (mut conn, peer) = self.listener.accept().await?;
            match self.serve_connection(&mut conn).await {
                Ok(Some(token)) => {
                    tracing::debug!("Access token captured");
                    return Ok(token);
                }
                Ok(None) => {}
                Err(e) => {
                    // Malformed requests are dropped without a reply
                    tracing::debug!(error = %e, %peer, "Dropped capture request");
                }
            }
        }
    }

    /// Handle one connection; `Some(token)` ends the capture loop
    async fn serve_connection(&self, conn: &mut TcpStream) -> Result<Option<String>> {
        let mut buf = vec![0u8; 1 << 20];
        let n = conn.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..n]);
        let line = request.lines().next().unwrap_or_default();

        if !line.starts_with("GET ") {
            return Err(Error::Auth(format!("Bad request: {:?}", line)));
        }
        let target = line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| Error::Auth(format!("Request line without target: {:?}", line)))?;
        tracing::debug!(target, "Capture route");

        if target == "/" {
            respond(conn, "200 OK", None, REDIRECTION_SCRIPT).await?;
            return Ok(None);
        }

        if target == "/auth" {
            let location = format!("Location: {}", self.authorize_url()?);
            respond(conn, "303 See Other", Some(&location), "").await?;
            return Ok(None);
        }

        if target.contains("access_token") {
            let token = token_from_target(target)?;
            respond(conn, "200 OK", None, "DONE").await?;
            return Ok(Some(token));
        }

        respond(conn, "404 Not Found", None, "").await?;
        Ok(None)
    }

    /// Build the platform authorization URL for the 303 redirect
    fn authorize_url(&self) -> Result<String> {
        let url = reqwest::Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("response_type", "token"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("scope", OAUTH_SCOPES),
            ],
        )
        .map_err(|e| Error::Config(format!("Failed to build authorize URL: {}", e)))?;
        Ok(url.into())
    }
}

/// Extract the `access_token` query parameter from a request target
fn token_from_target(target: &str) -> Result<String> {
    let url = reqwest::Url::parse(&format!("http://localhost{}", target))
        .map_err(|e| Error::Auth(format!("Unparseable request target {:?}: {}", target, e)))?;
    url.query_pairs()
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| Error::Auth("access_token query parameter missing".to_string()))
}

/// Write a minimal HTTP/1.1 response and close the write side
async fn respond(
    conn: &mut TcpStream,
    status: &str,
    extra_header: Option<&str>,
    body: &str,
) -> Result<()> {
    let mut response = format!("HTTP/1.1 {}\r\n", status);
    if let Some(header) = extra_header {
        response.push_str(header);
        response.push_str("\r\n");
    }
    response.push_str("\r\n");
    response.push_str(body);
    conn.write_all(response.as_bytes()).await?;
    let _ = conn.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn request(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn test_capture() -> (TokenCapture, SocketAddr) {
        let capture = TokenCapture::bind(0, "client-123", "http://localhost:3000/")
            .await
            .unwrap();
        let addr = capture.local_addr().unwrap();
        (capture, addr)
    }

    #[tokio::test]
    async fn test_root_serves_redirection_script() {
        let (capture, addr) = test_capture().await;
        let task = tokio::spawn(async move { capture.capture().await });

        let response = request(addr, "GET / HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("location.href.replace('#', '?')"));

        task.abort();
    }

    #[tokio::test]
    async fn test_auth_redirects_to_authorize_endpoint() {
        let (capture, addr) = test_capture().await;
        let task = tokio::spawn(async move { capture.capture().await });

        let response = request(addr, "GET /auth HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 303 See Other"));
        assert!(response.contains("Location: https://id.twitch.tv/oauth2/authorize"));
        assert!(response.contains("client_id=client-123"));
        // redirect URL must be percent-encoded in the query string
        assert!(response.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2F"));

        task.abort();
    }

    #[tokio::test]
    async fn test_unknown_path_is_404_and_loop_continues() {
        let (capture, addr) = test_capture().await;
        let task = tokio::spawn(async move { capture.capture().await });

        let response = request(addr, "GET /favicon.ico HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));

        // Listener must still accept and complete a capture afterwards
        let response = request(addr, "GET /?access_token=tok HTTP/1.1\r\n\r\n").await;
        assert!(response.contains("DONE"));
        assert_eq!(task.await.unwrap().unwrap(), "tok");
    }

    #[tokio::test]
    async fn test_token_capture_ends_loop() {
        let (capture, addr) = test_capture().await;
        let task = tokio::spawn(async move { capture.capture().await });

        let response =
            request(addr, "GET /?access_token=abc123&scope=chat HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("DONE"));
        assert_eq!(task.await.unwrap().unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_non_get_request_dropped_without_reply() {
        let (capture, addr) = test_capture().await;
        let task = tokio::spawn(async move { capture.capture().await });

        let response = request(addr, "POST / HTTP/1.1\r\n\r\n").await;
        assert!(response.is_empty());

        // Still accepting after the drop
        let response = request(addr, "GET /?access_token=later HTTP/1.1\r\n\r\n").await;
        assert!(response.contains("DONE"));
        assert_eq!(task.await.unwrap().unwrap(), "later");
    }

    #[tokio::test]
    async fn test_access_token_without_value_is_dropped() {
        let (capture, addr) = test_capture().await;
        let task = tokio::spawn(async move { capture.capture().await });

        // Contains the marker but no parseable parameter value pair
        let response = request(addr, "GET /access_token HTTP/1.1\r\n\r\n").await;
        assert!(response.is_empty());

        let response = request(addr, "GET /?access_token=ok HTTP/1.1\r\n\r\n").await;
        assert!(response.contains("DONE"));
        assert_eq!(task.await.unwrap().unwrap(), "ok");
    }
}

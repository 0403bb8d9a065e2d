//! WHEP HTTP signaling
//!
//! One POST per negotiation: the SDP offer goes up as `application/sdp`,
//! the answer comes back in the response body. Retry policy lives in the
//! controller, never at this layer.

use super::WhepError;
use log::debug;
use url::Url;

/// Endpoint and credentials for one WHEP stream
#[derive(Debug, Clone, Default)]
pub struct StreamTarget {
    /// Base URL of the WHEP server (scheme + authority)
    pub base_url: String,
    /// Stream path under the base URL
    pub stream_path: String,
    /// Basic auth username
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
}

impl StreamTarget {
    /// Credentials to send, if both username and password are non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user, password))
            }
            _ => None,
        }
    }
}

/// Stateless WHEP signaling client
pub struct SignalingClient {
    http: reqwest::Client,
}

impl Default for SignalingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Build the signaling endpoint `{base_url}/{stream_path}/whep`
    pub fn endpoint_url(target: &StreamTarget) -> Result<Url, WhepError> {
        let mut url = Url::parse(&target.base_url).map_err(|e| {
            WhepError::Validation(format!("Invalid base URL {}: {}", target.base_url, e))
        })?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| WhepError::Validation("Base URL cannot be a base".to_string()))?;
            for part in target.stream_path.split('/').filter(|p| !p.is_empty()) {
                segments.push(part);
            }
            segments.push("whep");
        }
        Ok(url)
    }

    /// POST the local offer, return the remote answer SDP
    pub async fn negotiate(
        &self,
        target: &StreamTarget,
        offer_sdp: &str,
    ) -> Result<String, WhepError> {
        let url = Self::endpoint_url(target)?;

        let mut request = self
            .http
            .post(url.clone())
            .header("Content-Type", "application/sdp")
            .body(offer_sdp.to_string());
        if let Some((user, password)) = target.credentials() {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await.map_err(|e| WhepError::Signaling {
            status: None,
            message: format!("WHEP request failed: {}", e),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WhepError::Signaling {
                status: Some(status.as_u16()),
                message: format!(
                    "WHEP server error: {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                ),
            });
        }

        let body = response.text().await.map_err(|e| WhepError::Signaling {
            status: Some(status.as_u16()),
            message: format!("Failed to read WHEP response: {}", e),
        })?;

        if body.trim().is_empty() {
            return Err(WhepError::Signaling {
                status: Some(status.as_u16()),
                message: "Empty answer SDP from WHEP server".to_string(),
            });
        }

        debug!("WHEP answer received from {} ({} bytes)", url, body.len());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    fn target(base_url: &str) -> StreamTarget {
        StreamTarget {
            base_url: base_url.to_string(),
            stream_path: "cam1".to_string(),
            username: None,
            password: None,
        }
    }

    /// Serve exactly one canned HTTP response, handing back the raw request
    async fn spawn_server(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (request_tx, request_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16384];
            let mut read = 0;
            loop {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                if n == 0 {
                    break;
                }
                read += n;
                let text = String::from_utf8_lossy(&buf[..read]).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .and_then(|v| v.trim().parse::<usize>().ok())
                        })
                        .unwrap_or(0);
                    if read >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let _ = request_tx.send(String::from_utf8_lossy(&buf[..read]).to_string());
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });

        (format!("http://{}", addr), request_rx)
    }

    #[test]
    fn endpoint_url_appends_whep_suffix() {
        let url = SignalingClient::endpoint_url(&target("http://example.com")).unwrap();
        assert_eq!(url.as_str(), "http://example.com/cam1/whep");
    }

    #[test]
    fn endpoint_url_keeps_base_path_and_nested_stream() {
        let mut t = target("http://example.com:8889/proxy");
        t.stream_path = "building/cam1".to_string();
        let url = SignalingClient::endpoint_url(&t).unwrap();
        assert_eq!(url.as_str(), "http://example.com:8889/proxy/building/cam1/whep");
    }

    #[test]
    fn endpoint_url_rejects_invalid_base() {
        assert!(SignalingClient::endpoint_url(&target("not a url")).is_err());
    }

    #[test]
    fn credentials_require_both_fields() {
        let mut t = target("http://example.com");
        assert!(t.credentials().is_none());
        t.username = Some("user".to_string());
        assert!(t.credentials().is_none());
        t.password = Some("".to_string());
        assert!(t.credentials().is_none());
        t.password = Some("secret".to_string());
        assert_eq!(t.credentials(), Some(("user", "secret")));
    }

    #[tokio::test]
    async fn negotiate_returns_answer_on_created() {
        let (base, request_rx) = spawn_server("201 Created", "v=0\r\nanswer").await;
        let client = SignalingClient::new();
        let answer = client.negotiate(&target(&base), "v=0\r\noffer").await.unwrap();
        assert_eq!(answer, "v=0\r\nanswer");

        let request = request_rx.await.unwrap();
        assert!(request.starts_with("POST /cam1/whep HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/sdp"));
        assert!(request.ends_with("v=0\r\noffer"));
    }

    #[tokio::test]
    async fn negotiate_attaches_basic_auth() {
        let (base, request_rx) = spawn_server("200 OK", "v=0\r\nanswer").await;
        let mut t = target(&base);
        t.username = Some("user".to_string());
        t.password = Some("pass".to_string());
        let client = SignalingClient::new();
        client.negotiate(&t, "v=0\r\noffer").await.unwrap();

        let request = request_rx.await.unwrap();
        // base64("user:pass")
        assert!(request.contains("Basic dXNlcjpwYXNz"));
    }

    #[tokio::test]
    async fn negotiate_fails_on_unauthorized() {
        let (base, _request_rx) = spawn_server("401 Unauthorized", "").await;
        let client = SignalingClient::new();
        let err = client.negotiate(&target(&base), "v=0\r\noffer").await.unwrap_err();
        match err {
            WhepError::Signaling { status, .. } => assert_eq!(status, Some(401)),
            other => panic!("Expected Signaling error, got {}", other),
        }
    }

    #[tokio::test]
    async fn negotiate_fails_on_empty_answer() {
        let (base, _request_rx) = spawn_server("200 OK", "").await;
        let client = SignalingClient::new();
        let err = client.negotiate(&target(&base), "v=0\r\noffer").await.unwrap_err();
        match err {
            WhepError::Signaling { status, message } => {
                assert_eq!(status, Some(200));
                assert!(message.contains("Empty answer"));
            }
            other => panic!("Expected Signaling error, got {}", other),
        }
    }

    #[tokio::test]
    async fn negotiate_fails_on_connection_refused() {
        // Bind then drop so the port is known-dead
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = SignalingClient::new();
        let err = client
            .negotiate(&target(&format!("http://{}", addr)), "v=0\r\noffer")
            .await
            .unwrap_err();
        match err {
            WhepError::Signaling { status, .. } => assert_eq!(status, None),
            other => panic!("Expected Signaling error, got {}", other),
        }
    }
}

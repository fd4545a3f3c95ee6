//! Upstream HTTP transport.
//!
//! The cache never talks to the network itself; a [`Transport`] does. The
//! bundled [`ReqwestTransport`] buffers the whole body and enforces a size
//! limit so that responses can be stored as-is.

use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Request, Response};
use reqwest::Client;

use crate::error::ClientError;

/// Sends a fully-buffered request and returns the fully-buffered response.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, ClientError>;
}

/// Configuration for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// User agent string (default: "pagecache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: "pagecache/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20_000),
            max_redirects: 5,
        }
    }
}

/// Transport backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    http: Client,
    config: TransportConfig,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Use an already-built client. `config.max_bytes` is still enforced;
    /// the other settings are assumed to be applied to `http` already.
    pub fn with_client(http: Client, config: TransportConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn too_large(&self, len: u64) -> ClientError {
        ClientError::Transport(format!("{len} bytes exceeds {}", self.config.max_bytes))
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, ClientError> {
        let start = Instant::now();
        let url = request.uri().to_string();
        let request = reqwest::Request::try_from(request).map_err(|e| ClientError::Transport(e.to_string()))?;

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| ClientError::Transport(format!("network error: {e}")))?;

        if let Some(len) = response.content_length()
            && len > self.config.max_bytes as u64
        {
            return Err(self.too_large(len));
        }

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();

        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(format!("failed to read response: {e}")))?;

        if body.len() > self.config.max_bytes {
            return Err(self.too_large(body.len() as u64));
        }

        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched upstream"
        );

        let mut built = Response::new(body);
        *built.status_mut() = status;
        *built.version_mut() = version;
        *built.headers_mut() = headers;
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.user_agent, "pagecache/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20_000));
        assert_eq!(config.max_redirects, 5);
    }

    #[tokio::test]
    async fn test_transport_new() {
        let transport = ReqwestTransport::new(TransportConfig::default());
        assert!(transport.is_ok());
    }

    /// Answer a single connection on localhost with `response`.
    async fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/")
    }

    fn transport(max_bytes: usize) -> ReqwestTransport {
        let http = Client::builder().no_proxy().build().unwrap();
        ReqwestTransport::with_client(http, TransportConfig { max_bytes, ..Default::default() })
    }

    fn get(url: &str) -> Request<Bytes> {
        Request::builder().uri(url).body(Bytes::new()).unwrap()
    }

    fn message(head: &str, body_len: usize) -> Vec<u8> {
        let mut raw = head.as_bytes().to_vec();
        raw.extend(std::iter::repeat_n(b'x', body_len));
        raw
    }

    #[tokio::test]
    async fn test_send_within_limit() {
        let url = serve_once(message("HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-Test: yes\r\n\r\n", 5)).await;
        let response = transport(10).send(get(&url)).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.headers()["x-test"], "yes");
        assert_eq!(response.body().as_ref(), b"xxxxx");
    }

    #[tokio::test]
    async fn test_declared_length_over_limit() {
        let url = serve_once(message("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n", 100)).await;
        let err = transport(10).send(get(&url)).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(msg) if msg == "100 bytes exceeds 10"));
    }

    #[tokio::test]
    async fn test_buffered_body_over_limit() {
        let url = serve_once(message("HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n", 100)).await;
        let err = transport(10).send(get(&url)).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(msg) if msg == "100 bytes exceeds 10"));
    }
}

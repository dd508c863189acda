//! Frame fetching.
//!
//! A [`FrameSource`] performs exactly one round trip per call and reports
//! every failure inside the returned [`FrameResult`]. It never retries; the
//! next poll tick is the retry.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CACHE_CONTROL, PRAGMA};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::frame::{FetchFailure, FrameResult};

/// A source of snapshot frames.
///
/// Implementors must not panic or block; all failure modes are returned as
/// [`FrameResult::Failed`].
#[async_trait::async_trait]
pub trait FrameSource: Send + Sync {
    /// Name of this source, for logging.
    fn name(&self) -> &'static str;

    /// Fetch the latest frame.
    async fn fetch_frame(&self) -> FrameResult;
}

/// Fetches snapshots from the camera service over authenticated HTTP GET.
///
/// Caching is disabled on every request: a stale cached payload would freeze
/// a feed that claims to be live.
#[derive(Debug, Clone)]
pub struct HttpFrameFetcher {
    client: Client,
    snapshot_url: Url,
    health_url: Url,
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    ok: bool,
}

impl HttpFrameFetcher {
    /// Build a fetcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is configured, a URL is invalid, or the
    /// HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.snapshot_url()?,
            config.health_url()?,
            &config.camera.token,
            config.request_timeout(),
        )
    }

    /// Build a fetcher for explicit endpoints.
    ///
    /// `timeout`, when set, bounds the whole request including the body read.
    ///
    /// # Errors
    ///
    /// Returns an error if `token` is empty or not a valid header value, or
    /// if the HTTP client cannot be built.
    pub fn new(
        snapshot_url: Url,
        health_url: Url,
        token: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::MissingToken);
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::config_validation("token contains invalid header characters"))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            snapshot_url,
            health_url,
            timeout,
        })
    }

    /// The snapshot endpoint this fetcher polls.
    #[must_use]
    pub fn snapshot_url(&self) -> &Url {
        &self.snapshot_url
    }

    /// Probe the service's health endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the body is not the expected
    /// JSON, or the service reports `ok: false`.
    pub async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(self.health_url.clone())
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        let health: HealthResponse = serde_json::from_slice(&body)?;
        if health.ok {
            Ok(())
        } else {
            Err(Error::Unhealthy(String::from_utf8_lossy(&body).into_owned()))
        }
    }

    fn classify(&self, err: &reqwest::Error) -> FetchFailure {
        if err.is_timeout() {
            let ms = self
                .timeout
                .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
            FetchFailure::Timeout(ms)
        } else if err.is_body() || err.is_decode() {
            FetchFailure::Body(err.to_string())
        } else {
            FetchFailure::Transport(err.to_string())
        }
    }
}

#[async_trait::async_trait]
impl FrameSource for HttpFrameFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_frame(&self) -> FrameResult {
        trace!(url = %self.snapshot_url, "Requesting snapshot");

        let response = match self.client.get(self.snapshot_url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return self.classify(&e).into(),
        };

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "Snapshot request rejected");
            return FetchFailure::Status(status.as_u16()).into();
        }

        match response.bytes().await {
            Ok(body) => FrameResult::Bytes(body),
            Err(e) => self.classify(&e).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::fixtures;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve one canned HTTP response and hand back the raw request head.
    async fn serve_once(
        status_line: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> (Url, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        let status_line = status_line.to_string();
        let content_type = content_type.to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());

            let head = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.ok();
        });

        (Url::parse(&format!("http://{addr}/")).unwrap(), rx)
    }

    fn fetcher_for(base: &Url, token: &str) -> HttpFrameFetcher {
        HttpFrameFetcher::new(
            base.join("camera/snapshot").unwrap(),
            base.join("health").unwrap(),
            token,
            Some(Duration::from_secs(5)),
        )
        .unwrap()
    }

    #[test]
    fn test_new_requires_token() {
        let url = Url::parse("http://127.0.0.1:9000/camera/snapshot").unwrap();
        let err = HttpFrameFetcher::new(url.clone(), url, "", None).unwrap_err();
        assert!(matches!(err, Error::MissingToken));
    }

    #[test]
    fn test_from_config_uses_snapshot_path() {
        let mut config = Config::default();
        config.camera.token = "t0k3n".to_string();
        let fetcher = HttpFrameFetcher::from_config(&config).unwrap();
        assert_eq!(
            fetcher.snapshot_url().as_str(),
            "http://127.0.0.1:9000/camera/snapshot"
        );
    }

    #[tokio::test]
    async fn test_fetch_success_sends_auth_and_no_cache() {
        let body = fixtures::jpeg(7);
        let (base, request) = serve_once("200 OK", "image/jpeg", body.to_vec()).await;
        let fetcher = fetcher_for(&base, "s3cret");

        let result = fetcher.fetch_frame().await;
        assert_eq!(result, FrameResult::Bytes(body));

        let head = request.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /camera/snapshot "));
        assert!(head.contains("authorization: bearer s3cret"));
        assert!(head.contains("cache-control: no-store"));
        assert!(head.contains("pragma: no-cache"));
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_failed() {
        let (base, _request) = serve_once(
            "401 Unauthorized",
            "application/json",
            br#"{"detail":"Invalid token"}"#.to_vec(),
        )
        .await;
        let fetcher = fetcher_for(&base, "wrong");

        let result = fetcher.fetch_frame().await;
        assert_eq!(result, FrameResult::Failed(FetchFailure::Status(401)));
    }

    #[tokio::test]
    async fn test_fetch_transport_error_is_failed() {
        // Bind then drop so the port is very likely closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = Url::parse(&format!("http://{addr}/")).unwrap();
        let result = fetcher_for(&base, "t").fetch_frame().await;
        assert!(matches!(
            result,
            FrameResult::Failed(FetchFailure::Transport(_) | FetchFailure::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_health_ok() {
        let (base, request) =
            serve_once("200 OK", "application/json", br#"{"ok":true}"#.to_vec()).await;
        fetcher_for(&base, "t").health().await.unwrap();
        assert!(request.await.unwrap().starts_with("GET /health "));
    }

    #[tokio::test]
    async fn test_health_not_ok() {
        let (base, _request) =
            serve_once("200 OK", "application/json", br#"{"ok":false}"#.to_vec()).await;
        let err = fetcher_for(&base, "t").health().await.unwrap_err();
        assert!(matches!(err, Error::Unhealthy(_)));
    }
}

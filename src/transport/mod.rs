//! Streaming HTTP transport with identification headers.
//!
//! Wraps a shared `reqwest` client configured with the crate's User-Agent,
//! gzip decompression, and an overall per-request timeout. The transport
//! opens a response and exposes it as a chunk stream; writing and progress
//! accounting stay with the caller so cooperative stop checks can happen at
//! chunk boundaries.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, ClientBuilder};
use thiserror::Error;
use tracing::debug;

/// Connect timeout, separate from the caller-configured overall timeout.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// User-Agent identifying this tool, as required by most media platforms.
pub const IDENT_USER_AGENT: &str =
    concat!("mediagrab/", env!("CARGO_PKG_VERSION"), " (+https://github.com/mediagrab)");

/// Errors that can occur while fetching content.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS, connection refused, TLS, mid-stream drop).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request exceeded the configured overall timeout.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
}

impl TransportError {
    fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Streaming HTTP transport, cheap to clone and share.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the given overall per-request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(timeout: Duration) -> Self {
        let client = ClientBuilder::new()
            .user_agent(IDENT_USER_AGENT)
            .gzip(true)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Opens a streaming fetch for `url`.
    ///
    /// The response headers are awaited here; the body is consumed through
    /// [`FetchStream::chunk`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on network failure, timeout, or a
    /// non-success status.
    pub async fn open(&self, url: &str) -> Result<FetchStream, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // 0 means unknown/streamed length.
        let content_length = response.content_length().unwrap_or(0);
        debug!(url = %url, content_length, "opened streaming fetch");

        Ok(FetchStream {
            url: url.to_string(),
            content_length,
            stream: Box::pin(response.bytes_stream()),
        })
    }
}

/// An open streaming response.
pub struct FetchStream {
    url: String,
    content_length: u64,
    stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
}

impl std::fmt::Debug for FetchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStream")
            .field("url", &self.url)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl FetchStream {
    /// Expected body size from the content-length hint; 0 when unknown.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Reads the next body chunk; `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the body read fails or times out.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.stream.next().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(TransportError::from_reqwest(&self.url, e)),
            None => Ok(None),
        }
    }
}

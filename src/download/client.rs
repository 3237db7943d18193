//! HTTP client wrapper for size discovery and streaming GETs.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Result of a size-discovery request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeProbe {
    /// Declared `content-length`, if present and parseable.
    pub total_size: Option<u64>,
    pub content_type: Option<String>,
}

/// HTTP client shared by all download tasks.
///
/// Created once and cloned cheaply, so every download reuses the same
/// connection pool. Redirects are followed (reqwest's default policy).
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the default 30 s connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a client with explicit connect and per-read timeouts.
    ///
    /// No total request timeout is configured: a transfer may run as long as
    /// bytes keep arriving within `read_timeout`.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Issues a HEAD request to learn the artifact size.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on transport failure or any status other
    /// than 200. Callers treat every failure here as non-fatal.
    #[instrument(level = "debug", skip(self))]
    pub async fn probe_size(&self, url: &str) -> Result<SizeProbe, DownloadError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DownloadError::http_status(url, status));
        }

        let probe = SizeProbe {
            total_size: content_length(response.headers()),
            content_type: content_type(response.headers()),
        };
        debug!(?probe, "size probe succeeded");
        Ok(probe)
    }

    /// Issues the streaming GET for the artifact body.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::HttpStatus`] for any non-2xx status, or a
    /// network/timeout error if the request cannot be sent.
    #[instrument(level = "debug", skip(self))]
    pub async fn open_stream(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status));
        }
        Ok(response)
    }
}

/// Reads the `content-length` header directly.
///
/// `Response::content_length()` reflects the body size hint, which is zero
/// for HEAD responses, so the header is parsed instead.
#[must_use]
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&len| len > 0)
}

#[must_use]
pub fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

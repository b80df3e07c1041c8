/// Tile image fetching
///
/// This module downloads the current tile image from the canvas backend.
/// The bytes are returned undecoded; decoding and cropping happen in the store.

use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

/// Anything that can retrieve a tile image by URL.
///
/// Implementations must not retry: a failed fetch aborts only the current
/// project's check, and the next sweep tries again.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher sharing one connection pool across checks
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("canvas-warden/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network { url: String::new(), reason: e.to_string() })?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Network { url: url.to_string(), reason: e.to_string() }
            }
        };

        let response = self.client.get(url).timeout(timeout).send().map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }

        let bytes = response.bytes().map_err(classify)?;
        debug!("📥 Fetched {}KB from {}", bytes.len() / 1024, url);

        Ok(bytes.to_vec())
    }
}

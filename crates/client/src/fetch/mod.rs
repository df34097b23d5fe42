//! Relay fetch pipeline.
//!
//! Every network read goes through an ordered list of forwarding endpoints.
//! The first relay that answers with a success status and a non-empty body
//! wins; any other outcome is logged and the next relay is tried.
//!
//! ### Relay attempts
//! - No retries within a relay, no backoff, no circuit breaking
//! - Every call starts again from the first relay
//! - Body size capped by `max_bytes` (counts as a relay failure)
//!
//! ### Trust
//! Relays are third parties and may alter what they forward. The relay that
//! produced a body is recorded on [`Fetched`] and logged so callers can
//! audit it.

pub mod relay;
pub mod url;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};

pub use relay::RelayEndpoint;
pub use self::url::{UrlError, canonicalize, resolve_reference};

use crate::headers::HeaderSet;
use replica_core::{AppConfig, Error};

/// Configuration for the relay fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Relays in the order they are tried.
    pub relays: Vec<RelayEndpoint>,

    /// User agent string (default: "replica/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Timeout per relay attempt (default: 20s)
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            relays: config.relays.iter().map(RelayEndpoint::new).collect(),
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
        }
    }
}

/// Body retrieved through a relay.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: Bytes,
    /// Content-Type reported by the relay, if any.
    pub content_type: Option<String>,
    /// Template of the relay that produced the body.
    pub relay: String,
}

impl Fetched {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Media type without parameters, falling back to `fallback`.
    pub fn media_type(&self, fallback: &str) -> String {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Retrieves a target URL and returns its body.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `target`, forwarding `headers` verbatim.
    ///
    /// Fails with `NETWORK_EXHAUSTED` once no source can deliver the body.
    async fn fetch(&self, target: &str, headers: &HeaderSet) -> Result<Fetched, Error>;
}

/// HTTP fetcher that walks the relay list in order.
pub struct RelayFetcher {
    http: Client,
    config: FetchConfig,
}

impl RelayFetcher {
    /// Create a new relay fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn fetch_via(&self, relay: &RelayEndpoint, target: &str, headers: &HeaderSet) -> Result<Fetched, Error> {
        let request_url = relay.request_url(target);
        let request = headers.apply(self.http.get(&request_url));

        let response = request
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            return Err(Error::HttpError(format!("status {}", status.as_u16())));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::HttpError(format!("failed to read response: {}", e)))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(Error::EmptyResponse(format!("empty body from {}", relay.label())));
        }

        Ok(Fetched { body, content_type, relay: relay.template().to_string() })
    }
}

#[async_trait]
impl Fetcher for RelayFetcher {
    async fn fetch(&self, target: &str, headers: &HeaderSet) -> Result<Fetched, Error> {
        let mut last_error = String::from("no relays configured");

        for relay in &self.config.relays {
            let start = Instant::now();
            match self.fetch_via(relay, target, headers).await {
                Ok(fetched) => {
                    tracing::debug!(
                        target_url = target,
                        relay = %relay.label(),
                        bytes = fetched.body.len(),
                        fetch_ms = start.elapsed().as_millis() as u64,
                        "relay delivered"
                    );
                    return Ok(fetched);
                }
                Err(e) => {
                    tracing::debug!(target_url = target, relay = %relay.label(), error = %e, "relay attempt failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(Error::NetworkExhausted { url: target.to_string(), last_error })
    }
}

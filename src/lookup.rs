//! Address lookup backends
//!
//! [`AddressLookup`] is the seam between the matcher and the geocoding proxy.
//! [`HttpLookup`] talks to the proxy over HTTP; tests plug in in-memory lookups.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::candidate::AddressCandidate;
use crate::config::GeocoderConfig;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Geocoder request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Geocoder rate limited, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("Geocoder returned HTTP {0}")]
    Status(u16),
    #[error("Malformed geocoder response: {0}")]
    Decode(String),
}

impl LookupError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LookupError::RateLimited { .. })
    }
}

/// Trait for geocoding backends
pub trait AddressLookup: Send + Sync {
    /// Search for candidates matching a free-text query
    fn search(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<AddressCandidate>, LookupError>> + Send;

    /// True while the backend has asked callers to stop issuing lookups
    fn is_rate_limited(&self) -> bool {
        false
    }
}

/// Geocoding proxy over HTTP GET
pub struct HttpLookup {
    client: reqwest::Client,
    base_url: String,
    query_param: String,
    api_key: Option<String>,
    cooldown: Duration,
    limited_until: Mutex<Option<Instant>>,
}

impl HttpLookup {
    pub fn new(config: &GeocoderConfig) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            query_param: config.query_param.clone(),
            api_key: config.api_key.clone(),
            cooldown: config.rate_limit_cooldown(),
            limited_until: Mutex::new(None),
        })
    }

    fn mark_rate_limited(&self, retry_after: Duration) {
        if let Ok(mut until) = self.limited_until.lock() {
            *until = Some(Instant::now() + retry_after);
        }
    }

    fn clear_rate_limit(&self) {
        if let Ok(mut until) = self.limited_until.lock() {
            *until = None;
        }
    }
}

impl AddressLookup for HttpLookup {
    async fn search(&self, query: &str) -> Result<Vec<AddressCandidate>, LookupError> {
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[(self.query_param.as_str(), query)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(query, "geocoder request");
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after(response.headers()).unwrap_or(self.cooldown);
            warn!(retry_after_secs = retry_after.as_secs(), "geocoder rate limited");
            self.mark_rate_limited(retry_after);
            return Err(LookupError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        self.clear_rate_limit();
        let body = response.text().await?;
        let candidates = decode_candidates(&body)?;
        debug!(query, count = candidates.len(), "geocoder response");
        Ok(candidates)
    }

    fn is_rate_limited(&self) -> bool {
        self.limited_until
            .lock()
            .ok()
            .and_then(|until| *until)
            .is_some_and(|until| Instant::now() < until)
    }
}

/// Proxies answer with a bare array or wrap it in `results`
#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    List(Vec<AddressCandidate>),
    Wrapped { results: Vec<AddressCandidate> },
}

pub fn decode_candidates(body: &str) -> Result<Vec<AddressCandidate>, LookupError> {
    match serde_json::from_str::<SearchResponse>(body) {
        Ok(SearchResponse::List(list)) => Ok(list),
        Ok(SearchResponse::Wrapped { results }) => Ok(results),
        Err(e) => Err(LookupError::Decode(e.to_string())),
    }
}

/// Retry-After in delta-seconds form; HTTP dates fall back to the cooldown
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

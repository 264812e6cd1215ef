//! Nominatim reverse geocoding client
//!
//! Turns result coordinates into display addresses. Failures never escape:
//! after the retry budget is spent the address becomes
//! [`UNRESOLVED_ADDRESS`]. Requests are spaced at least `min_interval`
//! apart across the whole batch to honour the provider's usage policy.

use log::{debug, error, warn};
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use super::retry::BackoffPolicy;
use super::GeoResult;

/// Base URL for the public Nominatim instance
pub const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Address used when the provider knows nothing about a coordinate
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Address used when every attempt to reach the provider failed
pub const UNRESOLVED_ADDRESS: &str = "Error during geocoding";

/// Errors from a single reverse geocoding attempt
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed or timed out
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The provider answered with an error status
    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(StatusCode),
}

/// Settings for the reverse geocoder
#[derive(Debug, Clone)]
pub struct GeocodeConfig {
    /// API root, overridable for testing
    pub base_url: String,
    /// Identifying user agent required by the Nominatim usage policy
    pub user_agent: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Total attempts per coordinate, including the first
    pub max_attempts: u32,
    /// Wait between attempts for the same coordinate
    pub retry_backoff: BackoffPolicy,
    /// Minimum spacing between any two requests
    pub min_interval: Duration,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            base_url: NOMINATIM_BASE_URL.to_string(),
            user_agent: format!("probemap/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_backoff: BackoffPolicy::Fixed(Duration::from_secs(5)),
            min_interval: Duration::from_secs(1),
        }
    }
}

/// Nominatim `/reverse` response
#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Sequential reverse geocoder
#[derive(Debug)]
pub struct ReverseGeocoder {
    http_client: Client,
    config: GeocodeConfig,
    /// When the previous request was sent
    last_request: Option<Instant>,
}

impl ReverseGeocoder {
    pub fn new(config: GeocodeConfig) -> Result<Self, GeocodeError> {
        let http_client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            config,
            last_request: None,
        })
    }

    /// Resolves a coordinate to an address, never failing
    ///
    /// # Returns
    /// * The provider's display name when one is found
    /// * [`UNKNOWN_LOCATION`] when the provider has no address for the point
    /// * [`UNRESOLVED_ADDRESS`] when every attempt failed
    pub async fn resolve(&mut self, lat: f64, lon: f64) -> String {
        let retries = self.config.max_attempts.saturating_sub(1) as usize;
        let mut waits = self.config.retry_backoff.schedule().take(retries);
        loop {
            match self.lookup(lat, lon).await {
                Ok(Some(address)) => return address,
                Ok(None) => return UNKNOWN_LOCATION.to_string(),
                Err(e) => {
                    warn!("Error in reverse geocoding ({}, {}): {}", lat, lon, e);
                    let Some(wait) = waits.next() else {
                        error!("Max retries reached for ({}, {}). Moving to next location.", lat, lon);
                        return UNRESOLVED_ADDRESS.to_string();
                    };
                    warn!("Retrying in {:.1}s...", wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Fills in the address of every result, in order
    pub async fn annotate(&mut self, results: Vec<GeoResult>) -> Vec<GeoResult> {
        let total = results.len();
        let mut annotated = Vec::with_capacity(total);
        for (index, mut result) in results.into_iter().enumerate() {
            debug!(
                "Reverse geocoding {}/{} ({}, {})",
                index + 1,
                total,
                result.latitude,
                result.longitude
            );
            result.address = Some(self.resolve(result.latitude, result.longitude).await);
            annotated.push(result);
        }
        annotated
    }

    /// One request to the provider
    async fn lookup(&mut self, lat: f64, lon: f64) -> Result<Option<String>, GeocodeError> {
        self.throttle().await;

        let url = format!("{}/reverse", self.config.base_url.trim_end_matches('/'));
        let query = [
            ("format", "jsonv2".to_string()),
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("accept-language", "en".to_string()),
        ];
        let response = self
            .http_client
            .get(&url)
            .header(USER_AGENT, self.config.user_agent.as_str())
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::UnexpectedStatus(status));
        }

        let text = response.text().await?;
        let body: ReverseResponse = serde_json::from_str(&text)?;
        if let Some(reason) = body.error {
            debug!("No address for ({}, {}): {}", lat, lon, reason);
        }
        Ok(body.display_name.filter(|name| !name.trim().is_empty()))
    }

    /// Waits until `min_interval` has passed since the previous request
    async fn throttle(&mut self) {
        if let Some(last) = self.last_request {
            tokio::time::sleep_until(last + self.config.min_interval).await;
        }
        self.last_request = Some(Instant::now());
    }
}

//! Core data models for probemap
//!
//! This module contains the records flowing through the pipeline: probe
//! requests read from a capture, and geolocation hits returned by WiGLE.
//! The remote API clients live in the submodules.

pub mod geocode;
pub mod retry;
pub mod wigle;

pub use geocode::{GeocodeConfig, GeocodeError, ReverseGeocoder, UNKNOWN_LOCATION, UNRESOLVED_ADDRESS};
pub use retry::{BackoffPolicy, LinearBackoff, RetryPolicy, RetryReason, RetryState};
pub use wigle::{SearchConfig, SearchError, WigleClient};

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// A network name observed in a capture file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRecord {
    /// Requested network name (SSID)
    pub network_name: String,
    /// BSSID or client MAC the capture associated with the name, if any
    pub station_id: Option<String>,
    /// When the capture first saw the name
    pub first_seen: Option<NaiveDateTime>,
    /// When the capture last saw the name
    pub last_seen: Option<NaiveDateTime>,
}

impl ProbeRecord {
    /// Creates a record with no station or timestamps
    pub fn new(network_name: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
            station_id: None,
            first_seen: None,
            last_seen: None,
        }
    }

    pub fn with_station(mut self, station_id: impl Into<String>) -> Self {
        self.station_id = Some(station_id.into());
        self
    }

    pub fn with_times(
        mut self,
        first_seen: Option<NaiveDateTime>,
        last_seen: Option<NaiveDateTime>,
    ) -> Self {
        self.first_seen = first_seen;
        self.last_seen = last_seen;
        self
    }
}

/// A geolocated access point matching a network name
///
/// The legacy field names (`ssid`, `bssid`, `lat`, `lon`) are accepted when
/// reading so that older cache files keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoResult {
    /// Network name the lookup was made for
    #[serde(alias = "ssid")]
    pub network_name: String,
    /// WiGLE `netid` (BSSID) of the access point
    #[serde(alias = "bssid", default, deserialize_with = "null_as_empty")]
    pub station_id: String,
    /// Trilaterated latitude
    #[serde(alias = "lat")]
    pub latitude: f64,
    /// Trilaterated longitude
    #[serde(alias = "lon")]
    pub longitude: f64,
    /// Human-readable address, filled in by the reverse geocoder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl GeoResult {
    pub fn new(
        network_name: impl Into<String>,
        station_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            network_name: network_name.into(),
            station_id: station_id.into(),
            latitude,
            longitude,
            address: None,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

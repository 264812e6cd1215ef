//! Application orchestration
//!
//! Wires the pipeline together: read the capture, deduplicate network names,
//! look each one up (cache first), reverse-geocode the hits and export them.
//! Everything runs sequentially; no error tied to a single name or
//! coordinate stops the batch.

use log::{info, warn};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::cache::{CacheError, ResultCache};
use crate::capture::parse_capture;
use crate::cli::RunConfig;
use crate::data::{GeoResult, GeocodeError, ProbeRecord, ReverseGeocoder, SearchError, WigleClient};
use crate::export::{export_csv, render_map, ExportError};

/// Errors that stop a run
#[derive(Debug, Error)]
pub enum AppError {
    /// Nothing usable was read from the capture
    #[error("no probe records could be read from {0}")]
    NoRecords(PathBuf),

    /// The cache file exists but could not be loaded
    #[error("failed to load cache: {0}")]
    Cache(#[from] CacheError),

    /// The search client could not be created
    #[error("failed to set up WiGLE client: {0}")]
    Search(#[from] SearchError),

    /// The geocoder could not be created
    #[error("failed to set up geocoder: {0}")]
    Geocode(#[from] GeocodeError),

    /// Writing an output file failed
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Records accepted from the capture
    pub records_parsed: usize,
    /// Distinct network names among them
    pub unique_names: usize,
    /// Names answered from the cache
    pub cache_hits: usize,
    /// Names looked up remotely
    pub remote_queries: usize,
    /// Geolocated results exported
    pub results: usize,
    /// Written CSV file, if any
    pub csv_path: Option<PathBuf>,
    /// Written map file, if any
    pub map_path: Option<PathBuf>,
}

/// Distinct network names in first-seen order
pub fn unique_network_names(records: &[ProbeRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| seen.insert(record.network_name.as_str()))
        .map(|record| record.network_name.clone())
        .collect()
}

/// Looks up every name, returning all results in order
///
/// Cached names are answered immediately; `query_delay` separates
/// consecutive remote lookups.
pub async fn lookup_all(
    client: &WigleClient,
    cache: &mut ResultCache,
    names: &[String],
    config: &RunConfig,
    summary: &mut RunSummary,
) -> Vec<GeoResult> {
    let mut all_results = Vec::new();
    let mut queried_before = false;

    for name in names {
        info!("Searching WiGLE for SSID: {}", name);
        if cache.contains(name) {
            summary.cache_hits += 1;
        } else {
            if queried_before {
                tokio::time::sleep(config.query_delay).await;
            }
            queried_before = true;
            summary.remote_queries += 1;
        }
        let results = client
            .search(cache, name, config.country_code.as_deref())
            .await;
        all_results.extend(results);
    }

    all_results
}

/// Runs the full pipeline described by `config`
///
/// # Returns
/// * `Ok(RunSummary)` - also when nothing was found to export
/// * `Err(AppError::NoRecords)` - if the capture yielded no records
/// * `Err(AppError)` - if the cache or an output file could not be handled
pub async fn run(config: &RunConfig) -> Result<RunSummary, AppError> {
    let mut summary = RunSummary::default();

    info!("Parsing capture {}...", config.capture_path.display());
    let records = parse_capture(&config.capture_path, config.capture_format, &config.filter);
    summary.records_parsed = records.len();
    if records.is_empty() {
        return Err(AppError::NoRecords(config.capture_path.clone()));
    }

    let names = unique_network_names(&records);
    summary.unique_names = names.len();
    info!("Found {} matching SSID(s).", names.len());

    let mut cache = ResultCache::load(&config.cache_path)?;
    info!(
        "Loaded {} cached lookup(s) from {}",
        cache.len(),
        cache.path().display()
    );
    if config.search.api_token.is_empty() {
        warn!("No WiGLE API key configured; only cached names will resolve");
    }

    let client = WigleClient::new(config.search.clone())?;
    let results = lookup_all(&client, &mut cache, &names, config, &mut summary).await;
    summary.results = results.len();

    if results.is_empty() {
        warn!("No results to export.");
        return Ok(summary);
    }

    info!("Reverse geocoding {} result(s)...", results.len());
    let mut geocoder = ReverseGeocoder::new(config.geocode.clone())?;
    let results = geocoder.annotate(results).await;

    let csv_path = config.csv_path();
    info!("Exporting to CSV...");
    export_csv(&csv_path, &results)?;
    summary.csv_path = Some(csv_path);

    let map_path = config.map_path();
    info!("Generating map...");
    if render_map(&map_path, &results, &config.map)? {
        summary.map_path = Some(map_path);
    }

    Ok(summary)
}

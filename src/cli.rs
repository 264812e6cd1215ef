//! Command-line interface parsing for probemap
//!
//! This module handles parsing of CLI arguments using clap and turns them
//! into a validated [`RunConfig`]. Secrets and deployment settings can also
//! come from the environment (or a `.env` file loaded by `main`).

use clap::builder::BoolishValueParser;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cache::ResultCache;
use crate::capture::{CaptureFilter, CaptureFormat, TimeRange, DEFAULT_DELIMITER};
use crate::data::geocode::NOMINATIM_BASE_URL;
use crate::data::wigle::WIGLE_BASE_URL;
use crate::data::{BackoffPolicy, GeocodeConfig, RetryPolicy, SearchConfig};
use crate::export::MapOptions;
use crate::logging::LogLevel;

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// Country codes are two ASCII letters
    #[error("Invalid country code: '{0}'. Expected a two-letter code such as US or DE")]
    InvalidCountryCode(String),

    /// The delimiter must fit in one byte
    #[error("Invalid delimiter: '{0}'. Expected a single ASCII character")]
    InvalidDelimiter(char),

    /// A retry setting that would disable every request
    #[error("Invalid --max-attempts: must be at least 1")]
    InvalidMaxAttempts,
}

/// Capture layout selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// airodump-ng kismet.csv (delimited text)
    Csv,
    /// Kismet netxml
    Xml,
}

/// probemap - Geolocate WiFi probe requests with WiGLE
#[derive(Parser, Debug)]
#[command(name = "probemap")]
#[command(about = "Geolocate captured WiFi probe requests with WiGLE and map the results")]
#[command(version)]
pub struct Cli {
    /// Capture file exported by airodump-ng (kismet CSV or netxml)
    #[arg(long, visible_alias = "airodump-csv", value_name = "PATH", default_value = "capture.csv")]
    pub capture: PathBuf,

    /// Capture layout; inferred from the file extension when omitted
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Field separator of delimited captures
    #[arg(long, default_value_t = ';')]
    pub delimiter: char,

    /// Only look up network names containing this text (repeatable, case-insensitive)
    #[arg(long = "ssid-filter", value_name = "SSID")]
    pub ssid_filter: Vec<String>,

    /// Restrict WiGLE results to a country (ISO 3166 alpha-2)
    #[arg(long, value_name = "CC")]
    pub country_code: Option<String>,

    /// First-seen window: "START", "START..END" or "..END" (YYYY-MM-DD HH:MM:SS)
    #[arg(long, value_name = "RANGE")]
    pub first_seen: Option<TimeRange>,

    /// Last-seen window: "START", "START..END" or "..END" (YYYY-MM-DD HH:MM:SS)
    #[arg(long, value_name = "RANGE")]
    pub last_seen: Option<TimeRange>,

    /// Prefix for the .csv and .html output files
    #[arg(long, value_name = "PREFIX", default_value = "wigle_results")]
    pub output_prefix: String,

    /// Encoded WiGLE API token, sent as HTTP basic authorization
    #[arg(long, env = "WIGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Lookup cache file [default: XDG cache dir/probemap/wigle_cache.json]
    #[arg(long, env = "CACHE_FILE", value_name = "PATH")]
    pub cache_file: Option<PathBuf>,

    /// Group nearby markers into clusters on the map
    #[arg(long, env = "USE_CLUSTERING", default_value = "true", value_parser = BoolishValueParser::new(), action = clap::ArgAction::Set)]
    pub clustering: bool,

    /// Minimum number of markers before clustering is used
    #[arg(long, default_value_t = 1)]
    pub cluster_threshold: usize,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Log verbosity
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Seconds to wait between remote lookups of different names
    #[arg(long, value_name = "SECS", default_value_t = 1)]
    pub query_delay: u64,

    /// Seconds to wait after the first HTTP 429; doubles on each further 429
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub rate_limit_cooldown: u64,

    /// Longest wait after an HTTP 429, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub rate_limit_max_wait: u64,

    /// Backoff unit after HTTP 5xx; the n-th retry waits n units
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub server_error_unit: u64,

    /// Requests allowed per result page before the lookup is abandoned
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub max_attempts: u32,

    /// WiGLE API root
    #[arg(long, env = "WIGLE_API_URL", default_value = WIGLE_BASE_URL, hide = true)]
    pub wigle_url: String,

    /// Reverse geocoding API root
    #[arg(long, env = "NOMINATIM_URL", default_value = NOMINATIM_BASE_URL, hide = true)]
    pub geocoder_url: String,
}

/// Everything a run needs, derived from CLI arguments and environment
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub capture_path: PathBuf,
    pub capture_format: CaptureFormat,
    pub filter: CaptureFilter,
    /// Upper-cased ISO country code forwarded to WiGLE
    pub country_code: Option<String>,
    pub cache_path: PathBuf,
    pub output_prefix: String,
    /// Pause between remote lookups of different names
    pub query_delay: Duration,
    pub search: SearchConfig,
    pub geocode: GeocodeConfig,
    pub map: MapOptions,
    pub color: bool,
    pub log_level: LevelFilter,
}

impl RunConfig {
    /// Defaults for reading `capture_path`, with the format inferred from its extension
    pub fn new(capture_path: impl Into<PathBuf>) -> Self {
        let capture_path = capture_path.into();
        Self {
            capture_format: CaptureFormat::from_path(&capture_path, DEFAULT_DELIMITER),
            capture_path,
            filter: CaptureFilter::default(),
            country_code: None,
            cache_path: ResultCache::default_path(),
            output_prefix: "wigle_results".to_string(),
            query_delay: Duration::from_secs(1),
            search: SearchConfig::default(),
            geocode: GeocodeConfig::default(),
            map: MapOptions::default(),
            color: true,
            log_level: LevelFilter::Info,
        }
    }

    /// Creates a RunConfig from parsed CLI arguments
    ///
    /// # Returns
    /// * `Ok(RunConfig)` with validated settings
    /// * `Err(CliError)` if an argument is out of range
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let delimiter = u8::try_from(cli.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or(CliError::InvalidDelimiter(cli.delimiter))?;
        let country_code = cli
            .country_code
            .as_deref()
            .map(parse_country_code)
            .transpose()?;
        if cli.max_attempts == 0 {
            return Err(CliError::InvalidMaxAttempts);
        }

        let mut config = Self::new(&cli.capture);
        config.capture_format = match cli.format {
            Some(FormatArg::Csv) => CaptureFormat::Delimited { delimiter },
            Some(FormatArg::Xml) => CaptureFormat::Xml,
            None => CaptureFormat::from_path(&cli.capture, delimiter),
        };
        config.filter = CaptureFilter {
            network_names: cli.ssid_filter.clone(),
            first_seen: cli.first_seen,
            last_seen: cli.last_seen,
        };
        config.country_code = country_code;
        if let Some(cache_file) = &cli.cache_file {
            config.cache_path = cache_file.clone();
        }
        config.output_prefix = cli.output_prefix.clone();
        config.query_delay = Duration::from_secs(cli.query_delay);
        config.search.base_url = cli.wigle_url.clone();
        config.search.api_token = cli.api_key.clone().unwrap_or_default();
        config.search.retry = RetryPolicy {
            max_attempts: cli.max_attempts,
            rate_limited: BackoffPolicy::Exponential {
                base: Duration::from_secs(cli.rate_limit_cooldown),
                max: Duration::from_secs(cli.rate_limit_max_wait.max(cli.rate_limit_cooldown)),
            },
            server_error: BackoffPolicy::Linear(Duration::from_secs(cli.server_error_unit)),
        };
        config.geocode.base_url = cli.geocoder_url.clone();
        config.map.clustering = cli.clustering;
        config.map.cluster_threshold = cli.cluster_threshold;
        config.color = !cli.no_color;
        config.log_level = cli.log_level.into();
        Ok(config)
    }

    /// Path of the CSV output
    pub fn csv_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.csv", self.output_prefix))
    }

    /// Path of the HTML map output
    pub fn map_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.html", self.output_prefix))
    }
}

/// Validates and upper-cases an ISO 3166 alpha-2 country code
pub fn parse_country_code(s: &str) -> Result<String, CliError> {
    let code = s.trim();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(CliError::InvalidCountryCode(s.to_string()))
    }
}

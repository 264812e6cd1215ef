//! Capture file parsing
//!
//! Reads the network names clients probed for from airodump-ng exports:
//! the semicolon-delimited `kismet.csv` layout and Kismet `netxml`. Parse
//! failures degrade to an empty record list with a logged error, so a bad
//! file never aborts the process.

mod delimited;
mod filter;
mod netxml;

pub use delimited::parse_delimited;
pub use filter::{CaptureFilter, TimeRange, TimeRangeError, FILTER_TIME_FORMAT};
pub use netxml::parse_netxml;

use chrono::NaiveDateTime;
use log::{error, info};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

use crate::data::ProbeRecord;

/// Timestamp format used by airodump-ng, e.g. `Wed Jan 02 15:04:05 2006`
pub const CAPTURE_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Default field separator of airodump-ng `kismet.csv` files
pub const DEFAULT_DELIMITER: u8 = b';';

/// Errors that can occur while reading a capture file
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The file could not be opened or read
    #[error("failed to read capture: {0}")]
    Io(#[from] std::io::Error),

    /// The delimited file is malformed
    #[error("malformed CSV capture: {0}")]
    Csv(#[from] csv::Error),

    /// The XML file is malformed
    #[error("malformed XML capture: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The XML document ended inside an element
    #[error("XML capture ends inside <{0}>")]
    Truncated(String),

    /// A required column is absent from the header row
    #[error("capture header has no '{0}' column")]
    MissingColumn(&'static str),

    /// A timestamp does not follow the airodump-ng format
    #[error("invalid capture timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Supported capture layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    /// Header row plus delimiter-separated fields
    Delimited { delimiter: u8 },
    /// Kismet netxml
    Xml,
}

impl CaptureFormat {
    /// Picks the layout from the file extension: `.xml` and `.netxml` are XML,
    /// everything else is delimited text
    pub fn from_path(path: &Path, delimiter: u8) -> Self {
        let is_xml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("xml") || ext.eq_ignore_ascii_case("netxml"))
            .unwrap_or(false);
        if is_xml {
            CaptureFormat::Xml
        } else {
            CaptureFormat::Delimited { delimiter }
        }
    }
}

/// Parses an airodump-ng timestamp
///
/// Runs of whitespace are collapsed first, since netxml pads single-digit
/// days with a space (`Fri Apr  8 ...`).
pub fn parse_capture_time(raw: &str) -> Result<NaiveDateTime, CaptureError> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, CAPTURE_TIME_FORMAT)
        .map_err(|_| CaptureError::InvalidTimestamp(raw.trim().to_string()))
}

/// Parses an optional timestamp field; blank means absent
pub(crate) fn parse_optional_time(raw: Option<&str>) -> Result<Option<NaiveDateTime>, CaptureError> {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => parse_capture_time(value).map(Some),
        _ => Ok(None),
    }
}

/// Reads the capture at `path`, returning the records accepted by `filter`
pub fn try_parse_capture(
    path: &Path,
    format: CaptureFormat,
    filter: &CaptureFilter,
) -> Result<Vec<ProbeRecord>, CaptureError> {
    match format {
        CaptureFormat::Delimited { delimiter } => {
            let file = File::open(path)?;
            parse_delimited(BufReader::new(file), delimiter, filter)
        }
        CaptureFormat::Xml => {
            let bytes = fs::read(path)?;
            parse_netxml(&String::from_utf8_lossy(&bytes), filter)
        }
    }
}

/// Reads the capture at `path`, logging and swallowing any failure
///
/// Returns an empty list when the file is missing or malformed.
pub fn parse_capture(path: &Path, format: CaptureFormat, filter: &CaptureFilter) -> Vec<ProbeRecord> {
    match try_parse_capture(path, format, filter) {
        Ok(records) => {
            info!("Read {} probe record(s) from {}", records.len(), path.display());
            records
        }
        Err(e) => {
            error!("Failed to parse capture {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

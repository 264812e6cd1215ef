//! Record filters applied while reading a capture

use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::data::ProbeRecord;

/// Timestamp format accepted on the command line
pub const FILTER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors produced when parsing a time range argument
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeRangeError {
    /// A bound is not formatted as `YYYY-MM-DD HH:MM:SS`
    #[error("invalid timestamp '{0}', expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp(String),

    /// Neither bound was given
    #[error("time range needs at least one bound")]
    Empty,

    /// The lower bound is later than the upper bound
    #[error("time range start {0} is after its end {1}")]
    Inverted(NaiveDateTime, NaiveDateTime),
}

/// Inclusive time window
///
/// Written as `START` (lower bound only), `START..END` or `..END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub after: Option<NaiveDateTime>,
    pub before: Option<NaiveDateTime>,
}

impl TimeRange {
    /// Everything at or after `start`
    pub fn since(start: NaiveDateTime) -> Self {
        Self {
            after: Some(start),
            before: None,
        }
    }

    /// Everything at or before `end`
    pub fn until(end: NaiveDateTime) -> Self {
        Self {
            after: None,
            before: Some(end),
        }
    }

    /// Everything in `[start, end]`
    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            after: Some(start),
            before: Some(end),
        }
    }

    pub fn contains(&self, time: NaiveDateTime) -> bool {
        self.after.map_or(true, |after| time >= after) && self.before.map_or(true, |before| time <= before)
    }
}

fn parse_bound(s: &str) -> Result<Option<NaiveDateTime>, TimeRangeError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(s, FILTER_TIME_FORMAT)
        .map(Some)
        .map_err(|_| TimeRangeError::InvalidTimestamp(s.to_string()))
}

impl FromStr for TimeRange {
    type Err = TimeRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (after, before) = match s.split_once("..") {
            Some((start, end)) => (parse_bound(start)?, parse_bound(end)?),
            None => (parse_bound(s)?, None),
        };

        match (after, before) {
            (None, None) => Err(TimeRangeError::Empty),
            (Some(start), Some(end)) if start > end => Err(TimeRangeError::Inverted(start, end)),
            _ => Ok(Self { after, before }),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(after) = self.after {
            write!(f, "{}", after.format(FILTER_TIME_FORMAT))?;
        }
        if let Some(before) = self.before {
            write!(f, "..{}", before.format(FILTER_TIME_FORMAT))?;
        }
        Ok(())
    }
}

/// Selection criteria for capture records
///
/// A record lacking a timestamp is never excluded by the filter on that
/// timestamp.
#[derive(Debug, Clone, Default)]
pub struct CaptureFilter {
    /// Substrings of interest; a record matches if its name contains any of
    /// them, ignoring case. Empty accepts every name.
    pub network_names: Vec<String>,
    /// Window for the first-seen timestamp
    pub first_seen: Option<TimeRange>,
    /// Window for the last-seen timestamp
    pub last_seen: Option<TimeRange>,
}

impl CaptureFilter {
    pub fn accepts(&self, record: &ProbeRecord) -> bool {
        in_window(self.first_seen, record.first_seen)
            && in_window(self.last_seen, record.last_seen)
            && self.matches_name(&record.network_name)
    }

    fn matches_name(&self, network_name: &str) -> bool {
        if self.network_names.is_empty() {
            return true;
        }
        let name = network_name.to_lowercase();
        self.network_names
            .iter()
            .any(|wanted| name.contains(&wanted.to_lowercase()))
    }
}

fn in_window(range: Option<TimeRange>, time: Option<NaiveDateTime>) -> bool {
    match (range, time) {
        (Some(range), Some(time)) => range.contains(time),
        _ => true,
    }
}

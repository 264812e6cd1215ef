//! airodump-ng `kismet.csv` parsing
//!
//! Columns are located by header name, so extra columns and column order
//! do not matter. Rows missing a network name or BSSID are skipped; rows
//! with unparseable timestamps are logged and skipped.

use csv::{ByteRecord, ReaderBuilder, Trim};
use log::{debug, warn};
use std::io::Read;

use super::{parse_optional_time, CaptureError, CaptureFilter};
use crate::data::ProbeRecord;

const ESSID_COLUMN: &str = "ESSID";
const BSSID_COLUMN: &str = "BSSID";
const FIRST_TIME_COLUMN: &str = "FirstTime";
const LAST_TIME_COLUMN: &str = "LastTime";

/// Header positions of the columns we read
struct Columns {
    essid: usize,
    bssid: usize,
    first_time: Option<usize>,
    last_time: Option<usize>,
}

impl Columns {
    fn locate(headers: &ByteRecord) -> Result<Self, CaptureError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| String::from_utf8_lossy(h).trim() == name)
        };
        Ok(Self {
            essid: find(ESSID_COLUMN).ok_or(CaptureError::MissingColumn(ESSID_COLUMN))?,
            bssid: find(BSSID_COLUMN).ok_or(CaptureError::MissingColumn(BSSID_COLUMN))?,
            first_time: find(FIRST_TIME_COLUMN),
            last_time: find(LAST_TIME_COLUMN),
        })
    }
}

/// Reads the text of a field, replacing invalid UTF-8
fn field(record: &ByteRecord, index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| record.get(i))
        .map(|raw| String::from_utf8_lossy(raw).trim().to_string())
}

/// Parses a delimited capture from `reader`, keeping rows accepted by `filter`
pub fn parse_delimited<R: Read>(
    reader: R,
    delimiter: u8,
    filter: &CaptureFilter,
) -> Result<Vec<ProbeRecord>, CaptureError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let columns = Columns::locate(reader.byte_headers()?)?;
    let mut records = Vec::new();

    for row in reader.byte_records() {
        let row = row?;
        let network_name = field(&row, Some(columns.essid)).unwrap_or_default();
        let station_id = field(&row, Some(columns.bssid)).unwrap_or_default();
        if network_name.is_empty() || station_id.is_empty() {
            continue;
        }

        let first_seen = field(&row, columns.first_time);
        let last_seen = field(&row, columns.last_time);
        let times = parse_optional_time(first_seen.as_deref())
            .and_then(|first| Ok((first, parse_optional_time(last_seen.as_deref())?)));
        let (first_seen, last_seen) = match times {
            Ok(times) => times,
            Err(e) => {
                warn!("Failed to parse time for {}: {}", network_name, e);
                continue;
            }
        };

        let record = ProbeRecord::new(network_name)
            .with_station(station_id)
            .with_times(first_seen, last_seen);
        if filter.accepts(&record) {
            records.push(record);
        } else {
            debug!("Filtered out {}", record.network_name);
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{parse_capture_time, TimeRange};
    use chrono::NaiveDateTime;

    const KISMET_CSV: &str = "\
Network;NetType;ESSID;BSSID;Info;Channel;FirstTime;LastTime;
1;probe;CoffeeShop;AA:BB:CC:DD:EE:01;;0;Mon Jul 15 10:00:00 2024;Mon Jul 15 10:05:00 2024;
2;probe;AirportWiFi;AA:BB:CC:DD:EE:02;;0;Mon Jul 15 11:00:00 2024;Mon Jul 15 11:30:00 2024;
3;probe;;AA:BB:CC:DD:EE:03;;0;Mon Jul 15 12:00:00 2024;Mon Jul 15 12:00:00 2024;
4;probe;NoStation;;;0;Mon Jul 15 12:00:00 2024;Mon Jul 15 12:00:00 2024;
5;probe;BadTime;AA:BB:CC:DD:EE:05;;0;yesterday;Mon Jul 15 12:00:00 2024;
6;probe;HomeNet;AA:BB:CC:DD:EE:06;;0;Mon Jul 15 13:00:00 2024;Mon Jul 15 14:00:00 2024;
";

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn parse(filter: &CaptureFilter) -> Vec<ProbeRecord> {
        parse_delimited(KISMET_CSV.as_bytes(), b';', filter).expect("capture should parse")
    }

    fn names(records: &[ProbeRecord]) -> Vec<&str> {
        records.iter().map(|r| r.network_name.as_str()).collect()
    }

    #[test]
    fn test_valid_rows_yield_one_record_each() {
        let records = parse(&CaptureFilter::default());

        assert_eq!(names(&records), vec!["CoffeeShop", "AirportWiFi", "HomeNet"]);
        assert_eq!(records[0].station_id.as_deref(), Some("AA:BB:CC:DD:EE:01"));
        assert_eq!(
            records[0].first_seen,
            Some(parse_capture_time("Mon Jul 15 10:00:00 2024").unwrap())
        );
        assert_eq!(records[0].last_seen, Some(ts("2024-07-15 10:05:00")));
    }

    #[test]
    fn test_single_bound_excludes_earlier_rows() {
        let filter = CaptureFilter {
            first_seen: Some(TimeRange::since(ts("2024-07-15 11:00:00"))),
            ..Default::default()
        };

        assert_eq!(names(&parse(&filter)), vec!["AirportWiFi", "HomeNet"]);
    }

    #[test]
    fn test_pair_excludes_rows_outside_interval() {
        let filter = CaptureFilter {
            last_seen: Some(TimeRange::between(ts("2024-07-15 10:05:00"), ts("2024-07-15 11:30:00"))),
            ..Default::default()
        };

        assert_eq!(names(&parse(&filter)), vec!["CoffeeShop", "AirportWiFi"]);
    }

    #[test]
    fn test_name_filter_applies() {
        let filter = CaptureFilter {
            network_names: vec!["home".to_string()],
            ..Default::default()
        };

        assert_eq!(names(&parse(&filter)), vec!["HomeNet"]);
    }

    #[test]
    fn test_rows_without_timestamps_are_kept() {
        let csv = "ESSID,BSSID\nCoffeeShop,AA:BB:CC:DD:EE:01\n";
        let records = parse_delimited(csv.as_bytes(), b',', &CaptureFilter::default()).unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].first_seen.is_none());
        assert!(records[0].last_seen.is_none());
    }

    #[test]
    fn test_padded_headers_and_short_rows() {
        let csv = " ESSID ; BSSID ; FirstTime\n CoffeeShop ; AA:BB:CC:DD:EE:01\n";
        let records = parse_delimited(csv.as_bytes(), b';', &CaptureFilter::default()).unwrap();

        assert_eq!(names(&records), vec!["CoffeeShop"]);
        assert!(records[0].first_seen.is_none());
    }

    #[test]
    fn test_missing_essid_column_is_an_error() {
        let csv = "Network;BSSID\n1;AA:BB:CC:DD:EE:01\n";
        let result = parse_delimited(csv.as_bytes(), b';', &CaptureFilter::default());

        assert!(matches!(result, Err(CaptureError::MissingColumn("ESSID"))));
    }

    #[test]
    fn test_duplicate_rows_are_all_returned() {
        let csv = "ESSID;BSSID\nCoffeeShop;AA:BB:CC:DD:EE:01\nCoffeeShop;AA:BB:CC:DD:EE:02\n";
        let records = parse_delimited(csv.as_bytes(), b';', &CaptureFilter::default()).unwrap();

        assert_eq!(names(&records), vec!["CoffeeShop", "CoffeeShop"]);
    }
}

//! CSV export

use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::ExportError;
use crate::data::GeoResult;

/// Column order of the exported CSV
pub const CSV_COLUMNS: [&str; 5] = ["network_name", "station_id", "latitude", "longitude", "address"];

#[derive(Serialize)]
struct Row<'a> {
    network_name: &'a str,
    station_id: &'a str,
    latitude: f64,
    longitude: f64,
    address: &'a str,
}

impl<'a> From<&'a GeoResult> for Row<'a> {
    fn from(result: &'a GeoResult) -> Self {
        Self {
            network_name: &result.network_name,
            station_id: &result.station_id,
            latitude: result.latitude,
            longitude: result.longitude,
            address: result.address.as_deref().unwrap_or_default(),
        }
    }
}

/// Writes the header and one row per result to `writer`
///
/// # Returns
/// The number of data rows written.
pub fn write_csv<W: Write>(writer: W, results: &[GeoResult]) -> Result<usize, ExportError> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(CSV_COLUMNS)?;
    for result in results {
        writer.serialize(Row::from(result))?;
    }
    writer.flush()?;
    Ok(results.len())
}

/// Writes the results to a CSV file at `path`, replacing any existing file
pub fn export_csv(path: &Path, results: &[GeoResult]) -> Result<usize, ExportError> {
    let file = File::create(path)?;
    write_csv(file, results)
}

//! Output writers
//!
//! Writes the final, address-annotated results as a CSV table and as an
//! HTML page with an interactive Leaflet map.

mod map;
mod table;

pub use map::{map_html, render_map, MapOptions};
pub use table::{export_csv, write_csv, CSV_COLUMNS};

use thiserror::Error;

/// Errors that can occur while writing output files
#[derive(Debug, Error)]
pub enum ExportError {
    /// Creating or writing the file failed
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Marker data could not be serialized
    #[error("failed to encode map markers: {0}")]
    Json(#[from] serde_json::Error),
}

//! HTML map rendering
//!
//! Produces a standalone page that loads Leaflet (and Leaflet.markercluster
//! when clustering) from a CDN. Marker data is embedded as JSON and all
//! labels are inserted as text nodes, so network names cannot inject markup.

use log::warn;
use serde::Serialize;
use std::fs;
use std::path::Path;

use super::ExportError;
use crate::data::GeoResult;

/// Map layout options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapOptions {
    /// Group nearby markers into clusters
    pub clustering: bool,
    /// Minimum number of markers before clustering kicks in
    pub cluster_threshold: usize,
    /// Initial zoom level
    pub zoom: u8,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            clustering: true,
            cluster_threshold: 1,
            zoom: 12,
        }
    }
}

impl MapOptions {
    /// Whether a map with `markers` markers is clustered
    pub fn clusters(&self, markers: usize) -> bool {
        self.clustering && markers >= self.cluster_threshold
    }
}

#[derive(Serialize)]
struct Marker<'a> {
    lat: f64,
    lon: f64,
    tooltip: &'a str,
    popup: String,
}

const CLUSTER_ASSETS: &str = r#"    <link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.css" />
    <link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.Default.css" />
    <script src="https://unpkg.com/leaflet.markercluster@1.5.3/dist/leaflet.markercluster.js"></script>
"#;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>probemap</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
__CLUSTER_ASSETS__    <style>html, body, #map { height: 100%; margin: 0; }</style>
</head>
<body>
    <div id="map"></div>
    <script>
        var map = L.map('map').setView([__CENTER_LAT__, __CENTER_LON__], __ZOOM__);
        L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
            maxZoom: 19,
            attribution: '&copy; OpenStreetMap contributors'
        }).addTo(map);

        function label(tag, text) {
            var el = document.createElement(tag);
            el.textContent = text;
            return el;
        }

        var markers = __MARKERS__;
        var layer = __CLUSTERED__ ? L.markerClusterGroup() : L.layerGroup();
        markers.forEach(function (m) {
            L.marker([m.lat, m.lon])
                .bindTooltip(label('span', m.tooltip))
                .bindPopup(label('div', m.popup))
                .addTo(layer);
        });
        layer.addTo(map);
    </script>
</body>
</html>
"#;

/// Builds the map page for `results`, centered on the first result
///
/// `results` must not be empty.
pub fn map_html(results: &[GeoResult], options: &MapOptions) -> Result<String, ExportError> {
    let markers: Vec<Marker> = results
        .iter()
        .map(|r| Marker {
            lat: r.latitude,
            lon: r.longitude,
            tooltip: &r.network_name,
            popup: format!("{} ({})", r.network_name, r.station_id),
        })
        .collect();
    let markers_json = serde_json::to_string(&markers)?.replace("</", "<\\/");

    let (center_lat, center_lon) = results
        .first()
        .map(|r| (r.latitude, r.longitude))
        .unwrap_or_default();
    let clustered = options.clusters(results.len());

    Ok(TEMPLATE
        .replace("__CLUSTER_ASSETS__", if clustered { CLUSTER_ASSETS } else { "" })
        .replace("__CENTER_LAT__", &center_lat.to_string())
        .replace("__CENTER_LON__", &center_lon.to_string())
        .replace("__ZOOM__", &options.zoom.to_string())
        .replace("__CLUSTERED__", if clustered { "true" } else { "false" })
        .replace("__MARKERS__", &markers_json))
}

/// Writes the map page to `path`
///
/// # Returns
/// * `Ok(true)` if a map was written
/// * `Ok(false)` if there was nothing to plot
pub fn render_map(path: &Path, results: &[GeoResult], options: &MapOptions) -> Result<bool, ExportError> {
    if results.is_empty() {
        warn!("No results to plot.");
        return Ok(false);
    }
    fs::write(path, map_html(results, options)?)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn results(count: usize) -> Vec<GeoResult> {
        (0..count)
            .map(|i| GeoResult::new(format!("Net{}", i), format!("00:00:00:00:00:{:02}", i), 49.25 + i as f64, -123.5))
            .collect()
    }

    #[test]
    fn test_map_is_centered_on_first_result() {
        let html = map_html(&results(3), &MapOptions::default()).unwrap();
        assert!(html.contains("setView([49.25, -123.5], 12)"));
    }

    #[test]
    fn test_one_marker_per_result() {
        let html = map_html(&results(3), &MapOptions::default()).unwrap();
        assert_eq!(html.matches("\"tooltip\":").count(), 3);
        assert!(html.contains("\"popup\":\"Net1 (00:00:00:00:00:01)\""));
    }

    #[test]
    fn test_clustering_respects_threshold() {
        let options = MapOptions {
            cluster_threshold: 5,
            ..Default::default()
        };

        let small = map_html(&results(2), &options).unwrap();
        assert!(small.contains("var layer = false ?"));
        assert!(!small.contains("leaflet.markercluster.js"));

        let large = map_html(&results(5), &options).unwrap();
        assert!(large.contains("var layer = true ?"));
        assert!(large.contains("leaflet.markercluster.js"));
    }

    #[test]
    fn test_clustering_can_be_disabled() {
        let options = MapOptions {
            clustering: false,
            ..Default::default()
        };
        assert!(!options.clusters(10_000));
    }

    #[test]
    fn test_script_breakout_is_escaped() {
        let evil = vec![GeoResult::new("</script><script>alert(1)</script>", "01", 1.0, 1.0)];
        let html = map_html(&evil, &MapOptions::default()).unwrap();

        assert!(!html.contains("</script><script>alert"));
        assert!(html.contains("<\\/script>"));
    }

    #[test]
    fn test_render_map_skips_empty_results() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("map.html");

        assert!(!render_map(&path, &[], &MapOptions::default()).unwrap());
        assert!(!path.exists());

        assert!(render_map(&path, &results(1), &MapOptions::default()).unwrap());
        assert!(path.exists());
    }
}

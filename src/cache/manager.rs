//! Result cache for persisting WiGLE lookups to disk
//!
//! Provides a `ResultCache` that maps network names to the geolocation hits
//! found for them, stored as a single pretty-printed JSON object.

use directories::ProjectDirs;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::data::GeoResult;

/// File name used when no cache path is configured
pub const CACHE_FILE_NAME: &str = "wigle_cache.json";

/// Errors that can occur when loading or saving the cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the cache file failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The cache file is not a valid JSON object of result arrays
    #[error("cache file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted mapping from network name to lookup results
///
/// A name present in the cache is authoritative for the rest of the run:
/// callers return the stored results instead of querying again, even when
/// the stored list is empty. Keys are kept sorted so that the file written
/// by `save` is deterministic.
#[derive(Debug, Clone)]
pub struct ResultCache {
    /// Location of the JSON cache file
    path: PathBuf,
    /// Cached results by network name
    entries: BTreeMap<String, Vec<GeoResult>>,
}

impl ResultCache {
    /// Default cache location
    ///
    /// Uses `~/.cache/probemap/wigle_cache.json` on Linux, or the equivalent XDG
    /// path on other platforms. Falls back to the working directory if no
    /// home directory can be determined.
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "probemap")
            .map(|dirs| dirs.cache_dir().join(CACHE_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(CACHE_FILE_NAME))
    }

    /// Creates an empty cache that will be saved to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Loads the cache stored at `path`
    ///
    /// A missing file yields an empty cache. An unreadable or malformed file
    /// is an error, so that a later `save` never clobbers data it failed to read.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::empty(path)),
            Err(e) => return Err(e.into()),
        };

        let entries = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&content)?
        };

        Ok(Self { path, entries })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cached results for a network name, if it was looked up before
    pub fn get(&self, network_name: &str) -> Option<&[GeoResult]> {
        self.entries.get(network_name).map(Vec::as_slice)
    }

    pub fn contains(&self, network_name: &str) -> bool {
        self.entries.contains_key(network_name)
    }

    /// Stores the results for a network name, replacing any previous entry
    ///
    /// Addresses are dropped: the cache only holds raw lookup results.
    pub fn insert(&mut self, network_name: &str, results: Vec<GeoResult>) {
        let results = results
            .into_iter()
            .map(|mut result| {
                result.address = None;
                result
            })
            .collect();
        self.entries.insert(network_name.to_string(), results);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the cache to disk, creating parent directories as needed
    ///
    /// The file is written next to its destination and renamed into place so
    /// an interrupted write leaves the previous cache intact.
    pub fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut json = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut json, formatter);
        self.entries.serialize(&mut serializer)?;
        json.push(b'\n');

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

//! Cache module for storing WiGLE lookups on disk
//!
//! The cache is loaded once at startup and rewritten after every new lookup,
//! which lets an interrupted batch resume without repeating remote queries.

mod manager;

pub use manager::{CacheError, ResultCache, CACHE_FILE_NAME};

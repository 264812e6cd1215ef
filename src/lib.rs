//! probemap library
//!
//! Parses WiFi probe-request captures, geolocates the requested network names
//! through WiGLE, reverse-geocodes the hits and exports them as CSV and an
//! interactive map. The binary in `main.rs` is a thin wrapper around [`app::run`].

pub mod app;
pub mod cache;
pub mod capture;
pub mod cli;
pub mod data;
pub mod export;
pub mod logging;

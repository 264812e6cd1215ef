//! Console logging
//!
//! Configures `env_logger` with a colored, single-line format. Color can be
//! switched off from the command line; `RUST_LOG` is honoured but the CLI
//! level takes precedence.

use clap::ValueEnum;
use colored::Colorize;
use log::LevelFilter;
use std::io::Write;

/// Log verbosity selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Marker printed before each message, mirroring the level
fn level_marker(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "[✗]",
        log::Level::Warn => "[!]",
        log::Level::Info => "[*]",
        log::Level::Debug | log::Level::Trace => "[.]",
    }
}

/// Initializes the global logger
///
/// # Arguments
/// * `level` - Minimum level to display (overrides `RUST_LOG`)
/// * `color` - Whether to emit ANSI colors
///
/// # Errors
/// Fails if a logger was already installed in this process.
pub fn init_logger(level: LevelFilter, color: bool) -> Result<(), log::SetLoggerError> {
    colored::control::set_override(color);

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    builder.filter_module("reqwest", LevelFilter::Info.min(level));
    builder.filter_module("hyper", LevelFilter::Info.min(level));
    builder.filter_module("hyper_util", LevelFilter::Info.min(level));

    builder.format(|buf, record| {
        let level = record.level();
        let marker = level_marker(level);
        let message = record.args().to_string();
        let (marker, message) = match level {
            log::Level::Error => (marker.red().bold(), message.red()),
            log::Level::Warn => (marker.yellow().bold(), message.yellow()),
            log::Level::Info => (marker.cyan().bold(), message.normal()),
            log::Level::Debug => (marker.blue(), message.blue()),
            log::Level::Trace => (marker.purple(), message.purple()),
        };
        writeln!(buf, "{} {}", marker, message)
    });

    builder.try_init()
}

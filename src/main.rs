//! probemap - geolocate WiFi probe requests
//!
//! Thin binary around the `probemap` library: loads `.env`, parses the
//! command line, sets up logging and prints a summary of the run.

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use log::warn;
use std::process;

use probemap::app::{run, RunSummary};
use probemap::cli::{Cli, RunConfig};
use probemap::logging::init_logger;

fn print_summary(summary: &RunSummary) {
    println!(
        "{}",
        format!(
            "[✓] Done. {} record(s), {} unique SSID(s), {} remote lookup(s), {} cached, {} result(s).",
            summary.records_parsed,
            summary.unique_names,
            summary.remote_queries,
            summary.cache_hits,
            summary.results
        )
        .green()
    );
    if summary.csv_path.is_some() || summary.map_path.is_some() {
        println!("{}", "[✓] Output files:".green());
        for path in summary.csv_path.iter().chain(summary.map_path.iter()) {
            println!("{}", format!("    - {}", path.display()).green());
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Settings may also come from the real environment, so a missing .env is fine
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = match RunConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    init_logger(config.log_level, config.color).context("Failed to initialize logger")?;
    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!("Ignoring .env file: {}", e);
        }
    }

    match run(&config).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format!("[✗] probemap error: {}", e).red());
            process::exit(1);
        }
    }
}

//! Resona - a terminal music and internet radio player.
//!
//! Plays local MP3/WAV/FLAC/OGG files and HTTP radio streams (including
//! PLS/M3U playlists with fallback across their entries), with a live
//! amplitude visualizer in the status line.

pub mod cli;
pub mod config;
pub mod error;
pub mod library;
pub mod metadata;
pub mod player;
pub mod radio;
#[cfg(test)]
pub mod test_utils;

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let config = match &args.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };

    init_logging(&config.logging)?;
    tracing::debug!("Starting with {:?}", config);

    cli::run_command(&args, &config)
}

/// Install the global subscriber: `RUST_LOG`, else the configured filter;
/// to the configured file if any, else stderr.
fn init_logging(logging: &config::LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("resona=info"));

    let (file_layer, stderr_layer) = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => {
            let layer = fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr);
            (None, Some(layer))
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

//! Command-line interface for resona.
//!
//! Plays files and radio streams, manages saved stations, and scans a
//! music folder.

mod commands;

pub use commands::{Cli, Commands, run_command};

//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `play`: play a file or stream URL
//! - `radio`: saved station management and playback
//! - `library`: folder scanning and the saved library
//! - `settings`: showing and writing the config file
//! - `now_playing`: the refreshing status line shared by playback commands

mod library;
mod now_playing;
mod play;
mod radio;
mod settings;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

pub use library::{
    cmd_library_add, cmd_library_clear, cmd_library_list, cmd_library_remove, cmd_library_rescan,
    cmd_library_scan,
};
pub use play::{cmd_devices, cmd_play};
pub use radio::{
    cmd_radio_add, cmd_radio_clear, cmd_radio_list, cmd_radio_play, cmd_radio_remove,
    cmd_radio_resolve,
};
pub use settings::{cmd_config_init, cmd_config_show};

/// Resona CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "RESONA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Play a local file or a stream/playlist URL
    Play {
        /// File path or http(s) URL
        target: String,
        /// Track length in seconds, when tags don't say
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Manage and play saved radio stations
    Radio {
        #[command(subcommand)]
        action: RadioCommand,
    },
    /// Work with the local music library
    Library {
        #[command(subcommand)]
        action: LibraryCommand,
    },
    /// Show or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// List audio output devices
    Devices,
}

/// Radio subcommands
#[derive(Subcommand)]
pub enum RadioCommand {
    /// List saved stations
    List {
        /// Only stations of this genre
        #[arg(short, long)]
        genre: Option<String>,
        /// Show recently played stations instead
        #[arg(long)]
        recent: bool,
    },
    /// Save a station (playlist URLs are resolved now)
    Add {
        name: String,
        url: String,
        #[arg(short, long)]
        genre: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Forget a saved station
    Remove { name: String },
    /// Tune in to a saved station
    Play { name: String },
    /// Show the stream URLs a station or playlist URL expands to
    Resolve { url: String },
    /// Forget every saved station
    Clear,
}

/// Library subcommands
#[derive(Subcommand)]
pub enum LibraryCommand {
    /// Scan a folder and list what's playable
    Scan {
        /// Folder to scan (defaults to library.music_dir)
        dir: Option<PathBuf>,
    },
    /// Add a folder to the library and scan it
    Add {
        /// Folder to add (defaults to library.music_dir)
        dir: Option<PathBuf>,
    },
    /// Remove a folder and its songs from the library
    Remove { dir: PathBuf },
    /// Rescan every library folder
    Rescan,
    /// List library songs
    List {
        /// List the library folders instead
        #[arg(long)]
        folders: bool,
    },
    /// Forget every folder and song
    Clear,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location and the settings in effect
    Show,
    /// Write the settings in effect to the config file
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Play { target, duration } => cmd_play(config, target, *duration),
        Commands::Radio { action } => match action {
            RadioCommand::List { genre, recent } => {
                cmd_radio_list(genre.as_deref(), *recent)
            }
            RadioCommand::Add {
                name,
                url,
                genre,
                country,
                description,
            } => cmd_radio_add(
                config,
                name,
                url,
                genre.as_deref(),
                country.as_deref(),
                description.as_deref(),
            ),
            RadioCommand::Remove { name } => cmd_radio_remove(name),
            RadioCommand::Play { name } => cmd_radio_play(config, name),
            RadioCommand::Resolve { url } => cmd_radio_resolve(config, url),
            RadioCommand::Clear => cmd_radio_clear(),
        },
        Commands::Library { action } => match action {
            LibraryCommand::Scan { dir } => cmd_library_scan(config, dir.as_deref()),
            LibraryCommand::Add { dir } => cmd_library_add(config, dir.as_deref()),
            LibraryCommand::Remove { dir } => cmd_library_remove(dir),
            LibraryCommand::Rescan => cmd_library_rescan(),
            LibraryCommand::List { folders } => cmd_library_list(*folders),
            LibraryCommand::Clear => cmd_library_clear(),
        },
        Commands::Config { action } => match action {
            ConfigCommand::Show => cmd_config_show(config, cli.config.as_deref()),
            ConfigCommand::Init { force } => {
                cmd_config_init(config, cli.config.as_deref(), *force)
            }
        },
        Commands::Devices => cmd_devices(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_play_with_duration() {
        let cli = Cli::try_parse_from(["resona", "play", "/music/a.flac", "--duration", "215"])
            .unwrap();
        match cli.command {
            Commands::Play { target, duration } => {
                assert_eq!(target, "/music/a.flac");
                assert_eq!(duration, Some(215));
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn test_parse_radio_add_with_global_config() {
        let cli = Cli::try_parse_from([
            "resona",
            "radio",
            "add",
            "Groove Salad",
            "https://somafm.com/groovesalad.pls",
            "--genre",
            "Ambient",
            "--config",
            "/tmp/resona.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/resona.toml")));
        assert!(matches!(
            cli.command,
            Commands::Radio {
                action: RadioCommand::Add { ref genre, .. }
            } if genre.as_deref() == Some("Ambient")
        ));
    }

    #[test]
    fn test_parse_library_verbs() {
        let cli = Cli::try_parse_from(["resona", "library", "add", "/music/jazz"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Library {
                action: LibraryCommand::Add { ref dir }
            } if dir.as_deref() == Some(std::path::Path::new("/music/jazz"))
        ));

        let cli = Cli::try_parse_from(["resona", "library", "list", "--folders"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Library {
                action: LibraryCommand::List { folders: true }
            }
        ));

        assert!(Cli::try_parse_from(["resona", "library", "remove"]).is_err());
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::try_parse_from(["resona", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigCommand::Init { force: true }
            }
        ));
    }
}

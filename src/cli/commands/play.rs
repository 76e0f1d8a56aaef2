//! Direct playback and device listing commands.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use super::now_playing::{self, Showing};
use crate::config::Config;
use crate::metadata;
use crate::player::{self, Player, is_url};

/// Play a file or URL and show the status line until it ends
pub fn cmd_play(config: &Config, target: &str, duration: Option<u64>) -> anyhow::Result<()> {
    let player = Player::new(config).context("Failed to open audio output")?;

    // Tags give a title and a length for local files; streams have neither
    let tags = (!is_url(target))
        .then(|| metadata::read(Path::new(target)))
        .and_then(|r| {
            r.inspect_err(|e| tracing::debug!("No tags for {}: {}", target, e))
                .ok()
        });

    player
        .play(target)
        .with_context(|| format!("Could not play {}", target))?;

    let known = duration
        .map(Duration::from_secs)
        .or_else(|| tags.as_ref().map(|t| Duration::from_secs(t.duration)));
    if let Some(d) = known {
        player.set_duration(d);
    }

    let title = match &tags {
        Some(t) => format!("{} - {}", t.artist, t.title),
        None => player
            .current_identifier()
            .unwrap_or_else(|| target.to_string()),
    };
    now_playing::run(&player, Showing::Track(title), config.ui.refresh_hz)
}

/// List audio output devices, marking the default
pub fn cmd_devices() -> anyhow::Result<()> {
    let current = player::current_audio_device();
    let devices = player::list_audio_devices();
    if devices.is_empty() {
        println!("No audio output devices found");
        return Ok(());
    }
    for name in devices {
        let marker = if name == current { "*" } else { " " };
        println!("{} {}", marker, name);
    }
    Ok(())
}

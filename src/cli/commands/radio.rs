//! Radio station commands.

use anyhow::Context;

use super::now_playing::{self, Showing};
use crate::config::Config;
use crate::player::{HttpStreamer, Player, format_duration};
use crate::radio::{RadioStation, StationStore};

/// List saved stations
pub fn cmd_radio_list(genre: Option<&str>, recent: bool) -> anyhow::Result<()> {
    let store = StationStore::open_default()?;

    let stations: Vec<&RadioStation> = match (genre, recent) {
        (_, true) => store.recent(20),
        (Some(genre), false) => store.stations_by_genre(genre),
        (None, false) => store.stations().iter().collect(),
    };

    if stations.is_empty() {
        println!("No stations saved. Add one with `resona radio add <name> <url>`.");
        return Ok(());
    }

    for station in stations {
        let genre = if station.genre.is_empty() {
            String::new()
        } else {
            format!(" [{}]", station.genre)
        };
        println!("{}{}", station.name, genre);
        println!("    {} ({} stream URLs)", station.url, station.stream_urls.len());
        if let Some(played) = station.last_played {
            println!("    last played {}", played.format("%Y-%m-%d %H:%M"));
        }
    }

    let genres = store.genres();
    if genre.is_none() && !genres.is_empty() {
        println!("\nGenres: {}", genres.join(", "));
    }
    Ok(())
}

/// Save a station, resolving playlist URLs up front
pub fn cmd_radio_add(
    config: &Config,
    name: &str,
    url: &str,
    genre: Option<&str>,
    country: Option<&str>,
    description: Option<&str>,
) -> anyhow::Result<()> {
    let http = HttpStreamer::new(&config.stream)?;
    let mut store = StationStore::open_default()?;

    let station = RadioStation {
        genre: genre.unwrap_or_default().to_string(),
        country: country.unwrap_or_default().to_string(),
        description: description.unwrap_or_default().to_string(),
        ..RadioStation::new(name, url)
    };
    let added = store
        .add_station(station, |u| http.resolve(u))
        .with_context(|| format!("Could not add {}", name))?;

    println!("Added {} with {} stream URL(s):", added.name, added.stream_urls.len());
    for stream in &added.stream_urls {
        println!("    {}", stream);
    }
    Ok(())
}

/// Forget a station
pub fn cmd_radio_remove(name: &str) -> anyhow::Result<()> {
    let mut store = StationStore::open_default()?;
    let removed = store.remove_station(name)?;
    println!("Removed {}", removed.name);
    Ok(())
}

/// Tune in to a saved station
pub fn cmd_radio_play(config: &Config, name: &str) -> anyhow::Result<()> {
    let mut store = StationStore::open_default()?;
    let station = store
        .station(name)
        .cloned()
        .with_context(|| format!("No saved station named {:?}", name))?;

    let player = Player::new(config).context("Failed to open audio output")?;
    player
        .play_radio_station(&station)
        .with_context(|| format!("Could not tune in to {}", station.name))?;

    if let Err(e) = store.mark_played(&station.name) {
        tracing::warn!("Could not record play of {}: {}", station.name, e);
    }

    let started = std::time::Instant::now();
    now_playing::run(&player, Showing::Station(station.name.clone()), config.ui.refresh_hz)?;
    tracing::info!(
        station = %station.name,
        session = %format_duration(started.elapsed()),
        "Stopped listening"
    );
    Ok(())
}

/// Print the stream URLs a URL expands to
pub fn cmd_radio_resolve(config: &Config, url: &str) -> anyhow::Result<()> {
    let http = HttpStreamer::new(&config.stream)?;
    let urls = http
        .resolve(url)
        .with_context(|| format!("Could not resolve {}", url))?;
    for (i, stream) in urls.iter().enumerate() {
        println!("{:>2}. {}", i + 1, stream);
    }
    Ok(())
}

/// Forget every saved station
pub fn cmd_radio_clear() -> anyhow::Result<()> {
    let mut store = StationStore::open_default()?;
    let count = store.stations().len();
    store.clear()?;
    println!("Removed {} stations", count);
    Ok(())
}

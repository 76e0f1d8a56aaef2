//! Library commands: one-off scans and the saved library.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use crate::config::Config;
use crate::library::{self, LibraryStore, Song};
use crate::player::format_duration;

fn print_song(song: &Song) {
    let track = song
        .track_number
        .map(|n| format!("{:02} ", n))
        .unwrap_or_default();
    println!(
        "{} - {} - {}{} ({})",
        song.artist,
        song.album,
        track,
        song.title,
        format_duration(Duration::from_secs(song.duration_secs))
    );
}

/// Scan a folder and print the playable songs in it
pub fn cmd_library_scan(config: &Config, dir: Option<&Path>) -> anyhow::Result<()> {
    let root = dir
        .or(config.library.music_dir.as_deref())
        .context("No folder given and library.music_dir is not set")?;

    println!("Scanning directory: {:?}", root);
    let songs = library::scan(root)?;

    for song in &songs {
        print_song(song);
    }
    println!("\nScan complete. Total: {} songs.", songs.len());
    Ok(())
}

/// Add a folder to the saved library
pub fn cmd_library_add(config: &Config, dir: Option<&Path>) -> anyhow::Result<()> {
    let folder = dir
        .or(config.library.music_dir.as_deref())
        .context("No folder given and library.music_dir is not set")?;

    let mut store = LibraryStore::open_default()?;
    let added = store
        .add_folder(folder)
        .with_context(|| format!("Could not add {:?}", folder))?;
    println!(
        "Added {} new songs. Library: {} songs in {} folders.",
        added,
        store.song_count(),
        store.folder_count()
    );
    Ok(())
}

/// Remove a folder and its songs from the saved library
pub fn cmd_library_remove(dir: &Path) -> anyhow::Result<()> {
    let mut store = LibraryStore::open_default()?;
    let removed = store.remove_folder(dir)?;
    println!("Removed {:?} and {} songs", dir, removed);
    Ok(())
}

/// Rebuild the saved library from its folders
pub fn cmd_library_rescan() -> anyhow::Result<()> {
    let mut store = LibraryStore::open_default()?;
    let total = store.rescan()?;
    println!("Rescanned {} folders: {} songs.", store.folder_count(), total);
    Ok(())
}

/// List the saved library's songs or folders
pub fn cmd_library_list(folders: bool) -> anyhow::Result<()> {
    let store = LibraryStore::open_default()?;
    if store.folder_count() == 0 {
        println!("No library folders. Add one with `resona library add <dir>`.");
        return Ok(());
    }

    if folders {
        for folder in store.folders() {
            println!("{}", folder.display());
        }
    } else {
        for song in store.songs() {
            print_song(song);
        }
    }
    println!(
        "\n{} songs in {} folders.",
        store.song_count(),
        store.folder_count()
    );
    Ok(())
}

/// Forget the whole saved library
pub fn cmd_library_clear() -> anyhow::Result<()> {
    let mut store = LibraryStore::open_default()?;
    store.clear()?;
    println!("Library cleared");
    Ok(())
}

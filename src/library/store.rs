//! The saved library: watched folders and the songs found in them.
//!
//! Stored as pretty-printed JSON at `<config dir>/resona/library.json`.
//! Adding a folder scans it straight away; `rescan` rebuilds the song list
//! from every folder.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Song, scan, sort_songs};
use crate::config;
use crate::error::{Error, Result, ResultExt};

/// Get the default library file path
pub fn library_path() -> Option<PathBuf> {
    config::config_dir().map(|d| d.join("library.json"))
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct LibraryData {
    folders: Vec<PathBuf>,
    songs: Vec<Song>,
}

/// Library folders, their songs, and the file they live in.
#[derive(Debug)]
pub struct LibraryStore {
    path: PathBuf,
    data: LibraryData,
}

impl LibraryStore {
    /// Load the library from `path`. A missing file is an empty library.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<LibraryData>(&text)
                .with_context(format!("parsing {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LibraryData::default(),
            Err(e) => return Err(Error::Io(e).context(format!("reading {}", path.display()))),
        };
        tracing::debug!(
            folders = data.folders.len(),
            songs = data.songs.len(),
            "Loaded library from {:?}",
            path
        );
        Ok(Self { path, data })
    }

    /// Load from the default location.
    pub fn open_default() -> Result<Self> {
        let path = library_path().ok_or_else(|| Error::Config(config::ConfigError::NoConfigDir))?;
        Self::load(path)
    }

    /// Write the library out (write to temp, then rename).
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).with_context("creating library directory")?;
        }
        let text = serde_json::to_string_pretty(&self.data)?;
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, text).with_context("writing library")?;
        std::fs::rename(&temp_path, &self.path).with_context("replacing library file")?;
        Ok(())
    }

    /// Add a folder and scan it. Returns how many new songs it brought in;
    /// a folder already in the library is left alone.
    pub fn add_folder(&mut self, folder: &Path) -> Result<usize> {
        let folder = std::fs::canonicalize(folder).map_err(|_| Error::not_found(folder))?;
        if self.data.folders.contains(&folder) {
            return Ok(0);
        }

        let found = scan(&folder)?;
        self.data.folders.push(folder.clone());
        self.data.folders.sort();
        let added = self.merge(found);
        sort_songs(&mut self.data.songs);

        tracing::info!(folder = ?folder, added, "Added library folder");
        self.save()?;
        Ok(added)
    }

    /// Forget a folder and every song under it. Returns how many songs went.
    pub fn remove_folder(&mut self, folder: &Path) -> Result<usize> {
        let folder = std::fs::canonicalize(folder).unwrap_or_else(|_| folder.to_path_buf());
        let index = self
            .data
            .folders
            .iter()
            .position(|f| *f == folder)
            .ok_or_else(|| Error::FolderNotInLibrary(folder.clone()))?;
        self.data.folders.remove(index);

        let before = self.data.songs.len();
        self.data.songs.retain(|s| !s.file_path.starts_with(&folder));
        let removed = before - self.data.songs.len();

        self.save()?;
        Ok(removed)
    }

    /// Rebuild the song list from every folder. Folders that can no longer
    /// be scanned are skipped, not removed.
    pub fn rescan(&mut self) -> Result<usize> {
        self.data.songs.clear();
        for folder in self.data.folders.clone() {
            match scan(&folder) {
                Ok(found) => {
                    self.merge(found);
                }
                Err(e) => tracing::warn!(folder = ?folder, "Skipping folder: {}", e),
            }
        }
        sort_songs(&mut self.data.songs);
        self.save()?;
        Ok(self.data.songs.len())
    }

    /// Append songs whose files are not listed yet; returns how many.
    fn merge(&mut self, found: Vec<Song>) -> usize {
        let before = self.data.songs.len();
        for song in found {
            if !self.data.songs.iter().any(|s| s.file_path == song.file_path) {
                self.data.songs.push(song);
            }
        }
        self.data.songs.len() - before
    }

    pub fn songs(&self) -> &[Song] {
        &self.data.songs
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.data.folders
    }

    pub fn song_count(&self) -> usize {
        self.data.songs.len()
    }

    pub fn folder_count(&self) -> usize {
        self.data.folders.len()
    }

    /// Forget every folder and song.
    pub fn clear(&mut self) -> Result<()> {
        self.data = LibraryData::default();
        self.save()
    }
}

//! Local music library: folder scans into [`Song`] records, and the saved
//! library in [`store`].

pub mod store;

pub use store::LibraryStore;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::metadata::{self, TrackMetadata};
use crate::player::FormatKind;

/// A playable file in the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub track_number: Option<u32>,
    pub file_path: PathBuf,
    /// 0 when the length could not be read
    pub duration_secs: u64,
}

impl Song {
    fn from_metadata(path: PathBuf, meta: TrackMetadata) -> Self {
        Self {
            title: meta.title,
            artist: meta.artist,
            album: meta.album,
            genre: meta.genre,
            track_number: meta.track_number,
            file_path: path,
            duration_secs: meta.duration,
        }
    }
}

/// Whether the player can open `path`.
pub fn is_supported(path: &Path) -> bool {
    FormatKind::from_path(path).is_some()
}

/// Recursively scan `root` for playable files.
///
/// Files whose tags can't be read are still listed, titled after their file
/// name. Results are sorted by artist, album, track number, then title.
pub fn scan(root: &Path) -> Result<Vec<Song>> {
    if !root.is_dir() {
        return Err(Error::not_found(root));
    }

    let mut songs = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_supported(entry.path()) {
            continue;
        }

        let path = entry.into_path();
        let meta = metadata::read(&path).unwrap_or_else(|e| {
            tracing::debug!("No tags for {:?}: {}", path, e);
            TrackMetadata::untagged(&path)
        });
        songs.push(Song::from_metadata(path, meta));
    }

    sort_songs(&mut songs);
    tracing::info!("Scanned {} songs under {:?}", songs.len(), root);
    Ok(songs)
}

/// Library order: artist, album, track number, then title, ignoring case.
pub fn sort_songs(songs: &mut [Song]) {
    songs.sort_by(|a, b| {
        a.artist
            .to_lowercase()
            .cmp(&b.artist.to_lowercase())
            .then_with(|| a.album.to_lowercase().cmp(&b.album.to_lowercase()))
            .then_with(|| a.track_number.cmp(&b.track_number))
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_test_wav;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_scan_finds_supported_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        File::create(root.join("song.mp3")).unwrap();
        File::create(root.join("music.flac")).unwrap();
        File::create(root.join("notes.txt")).unwrap();
        File::create(root.join("clip.m4a")).unwrap();
        File::create(root.join("UPPERCASE.OGG")).unwrap();

        let subdir = root.join("subdir");
        std::fs::create_dir(&subdir).unwrap();
        write_test_wav(&subdir.join("track.wav"), 22050, 1, 22050, 1000);
        File::create(subdir.join("ignore.doc")).unwrap();

        let songs = scan(root).unwrap();
        let mut titles: Vec<&str> = songs.iter().map(|s| s.title.as_str()).collect();
        titles.sort_unstable();
        assert_eq!(titles, vec!["UPPERCASE", "music", "song", "track"]);

        let track = songs.iter().find(|s| s.title == "track").unwrap();
        assert_eq!(track.duration_secs, 1);
        assert_eq!(track.file_path, subdir.join("track.wav"));
    }

    #[test]
    fn test_scan_missing_root_is_error() {
        let result = scan(Path::new("/nonexistent/music"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_scan_sorts_by_title_without_tags() {
        let dir = tempdir().unwrap();
        for name in ["b.mp3", "C.mp3", "a.mp3"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let songs = scan(dir.path()).unwrap();
        let titles: Vec<&str> = songs.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "C"]);
    }

    #[test]
    fn test_scan_orders_untagged_album_by_file_number() {
        let dir = tempdir().unwrap();
        for name in ["10 - Coda.wav", "2 - Middle.wav", "01 - Opening.wav"] {
            write_test_wav(&dir.path().join(name), 8000, 1, 80, 1000);
        }
        let songs = scan(dir.path()).unwrap();
        let tracks: Vec<Option<u32>> = songs.iter().map(|s| s.track_number).collect();
        assert_eq!(tracks, vec![Some(1), Some(2), Some(10)]);
    }
}

//! Audio file metadata reading.
//!
//! Uses the lofty crate for format-independent tag access. Missing tags are
//! filled with placeholders so a song always has something to display, and
//! a missing track number is guessed from the file name.

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;
use std::path::Path;

use crate::error::{Error, Result};

/// Track metadata as read from tags and stream properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    /// Length in whole seconds; 0 when unknown
    pub duration: u64,
    pub track_number: Option<u32>,
}

impl TrackMetadata {
    /// Placeholders for a file with no readable tags, titled after its stem.
    pub fn untagged(path: &Path) -> Self {
        Self {
            title: title_from_path(path),
            artist: "Unknown Artist".to_string(),
            album: "Unknown Album".to_string(),
            genre: String::new(),
            duration: 0,
            track_number: track_from_file_name(path),
        }
    }
}

pub fn read(path: &Path) -> Result<TrackMetadata> {
    let tagged_file = Probe::open(path)
        .map_err(|e| Error::metadata(path, e.to_string()))?
        .read()
        .map_err(|e| Error::metadata(path, e.to_string()))?;

    // Get the primary tag, or fall back to the first available tag
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    let mut meta = TrackMetadata::untagged(path);
    if let Some(tag) = tag {
        if let Some(title) = tag.title().filter(|s| !s.trim().is_empty()) {
            meta.title = title.to_string();
        }
        if let Some(artist) = tag.artist().filter(|s| !s.trim().is_empty()) {
            meta.artist = artist.to_string();
        }
        if let Some(album) = tag.album().filter(|s| !s.trim().is_empty()) {
            meta.album = album.to_string();
        }
        if let Some(genre) = tag.genre() {
            meta.genre = genre.trim().to_string();
        }
        meta.track_number = tag.track().or(meta.track_number);
    }

    meta.duration = tagged_file.properties().duration().as_secs();
    Ok(meta)
}

fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Unknown Title".to_string())
}

/// Track number in `1..=99` from names like `01 - Song`, `1. Song`,
/// `01_Song`, `Track 01 - Song` or `01 Song`; failing those, the first
/// standalone one- or two-digit number anywhere in the name.
pub fn track_from_file_name(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    leading_number(stem, true)
        .or_else(|| {
            let rest = stem.strip_prefix("Track")?;
            let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
            (trimmed.len() < rest.len()).then(|| leading_number(trimmed, true))?
        })
        .or_else(|| leading_number(stem, false))
        .or_else(|| standalone_number(stem))
}

fn valid_track(digits: &str) -> Option<u32> {
    digits.parse().ok().filter(|n| (1..=99).contains(n))
}

/// One or two digits at the start of `s`, then a `-`, `.` or `_` separator
/// (spaces allowed before it) when `separated`, else whitespace.
fn leading_number(s: &str, separated: bool) -> Option<u32> {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if !(1..=2).contains(&digits) {
        return None;
    }
    let rest = &s[digits..];
    let follows = if separated {
        rest.trim_start_matches(|c: char| c.is_ascii_whitespace())
            .starts_with(['-', '.', '_'])
    } else {
        rest.starts_with(|c: char| c.is_ascii_whitespace())
    };
    if follows { valid_track(&s[..digits]) } else { None }
}

/// The first run of one or two digits not touching a letter, digit or `_`.
fn standalone_number(s: &str) -> Option<u32> {
    let bytes = s.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let bounded = (start == 0 || !is_word(bytes[start - 1]))
            && (i == bytes.len() || !is_word(bytes[i]));
        if bounded && i - start <= 2 {
            return valid_track(&s[start..i]);
        }
    }
    None
}

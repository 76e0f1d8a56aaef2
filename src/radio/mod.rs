//! Internet radio: saved stations and playlist resolution.

pub mod resolver;
pub mod store;

pub use resolver::{ManifestKind, ResolveError};
pub use store::StationStore;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved internet radio station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioStation {
    pub name: String,
    /// The URL as entered, possibly a PLS/M3U playlist
    pub url: String,
    /// First resolved stream URL
    pub stream_url: String,
    /// Every resolved stream URL, in fallback order
    pub stream_urls: Vec<String>,
    pub genre: String,
    pub language: String,
    pub country: String,
    pub bitrate: String,
    pub description: String,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub added_at: Option<DateTime<Utc>>,
    pub last_played: Option<DateTime<Utc>>,
}

impl RadioStation {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// URLs to try, in order: the stored fallback list, else the single
    /// resolved stream URL, else the URL as entered.
    pub fn candidates(&self) -> Vec<String> {
        if !self.stream_urls.is_empty() {
            self.stream_urls.clone()
        } else if !self.stream_url.is_empty() {
            vec![self.stream_url.clone()]
        } else if !self.url.is_empty() {
            vec![self.url.clone()]
        } else {
            Vec::new()
        }
    }
}

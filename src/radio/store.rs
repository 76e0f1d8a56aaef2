//! Saved radio stations, persisted as pretty-printed JSON.
//!
//! Stored at `<config dir>/resona/radio_stations.json`. Playlist URLs are
//! resolved once when a station is added; plays reuse the stored list.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::RadioStation;
use super::resolver::ResolveError;
use crate::config;
use crate::error::{Error, Result, ResultExt};

/// Get the default station file path
pub fn stations_path() -> Option<PathBuf> {
    config::config_dir().map(|d| d.join("radio_stations.json"))
}

/// The saved station list and the file it lives in.
#[derive(Debug)]
pub struct StationStore {
    path: PathBuf,
    stations: Vec<RadioStation>,
}

impl StationStore {
    /// Load stations from `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stations = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str::<Vec<RadioStation>>(&data)
                .with_context(format!("parsing {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::Io(e).context(format!("reading {}", path.display()))),
        };
        tracing::debug!("Loaded {} stations from {:?}", stations.len(), path);
        Ok(Self { path, stations })
    }

    /// Load from the default location.
    pub fn open_default() -> Result<Self> {
        let path = stations_path().ok_or_else(|| Error::Config(config::ConfigError::NoConfigDir))?;
        Self::load(path)
    }

    /// Write the list out (write to temp, then rename).
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).with_context("creating station directory")?;
        }
        let data = serde_json::to_string_pretty(&self.stations)?;
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, data).with_context("writing stations")?;
        std::fs::rename(&temp_path, &self.path).with_context("replacing station file")?;
        Ok(())
    }

    /// Add and persist a station, resolving its URL into stream candidates.
    ///
    /// `resolve` runs once; a failure leaves the store unchanged.
    pub fn add_station<F>(&mut self, mut station: RadioStation, resolve: F) -> Result<&RadioStation>
    where
        F: FnOnce(&str) -> std::result::Result<Vec<String>, ResolveError>,
    {
        if self.station(&station.name).is_some() {
            return Err(Error::DuplicateStation(station.name));
        }

        let urls = resolve(&station.url)?;
        station.stream_url = urls.first().cloned().unwrap_or_default();
        station.stream_urls = urls;
        station.added_at = Some(Utc::now());

        tracing::info!(
            station = %station.name,
            candidates = station.stream_urls.len(),
            "Added station"
        );
        self.stations.push(station);
        self.save()?;
        Ok(&self.stations[self.stations.len() - 1])
    }

    /// Remove and persist; returns the removed station.
    pub fn remove_station(&mut self, name: &str) -> Result<RadioStation> {
        let index = self
            .position(name)
            .ok_or_else(|| Error::StationNotFound(name.to_string()))?;
        let removed = self.stations.remove(index);
        self.save()?;
        Ok(removed)
    }

    /// Station by name (case-insensitive).
    pub fn station(&self, name: &str) -> Option<&RadioStation> {
        self.position(name).map(|i| &self.stations[i])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.stations
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn stations(&self) -> &[RadioStation] {
        &self.stations
    }

    pub fn stations_by_genre(&self, genre: &str) -> Vec<&RadioStation> {
        self.stations
            .iter()
            .filter(|s| s.genre.eq_ignore_ascii_case(genre))
            .collect()
    }

    /// Every non-empty genre, sorted, without duplicates.
    pub fn genres(&self) -> Vec<String> {
        let mut genres: Vec<String> = self
            .stations
            .iter()
            .filter(|s| !s.genre.is_empty())
            .map(|s| s.genre.clone())
            .collect();
        genres.sort();
        genres.dedup();
        genres
    }

    /// Record that `name` was just tuned in.
    pub fn mark_played(&mut self, name: &str) -> Result<()> {
        self.mark_played_at(name, Utc::now())
    }

    pub fn mark_played_at(&mut self, name: &str, at: DateTime<Utc>) -> Result<()> {
        let index = self
            .position(name)
            .ok_or_else(|| Error::StationNotFound(name.to_string()))?;
        self.stations[index].last_played = Some(at);
        self.save()
    }

    /// Up to `limit` played stations, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<&RadioStation> {
        let mut played: Vec<&RadioStation> = self
            .stations
            .iter()
            .filter(|s| s.last_played.is_some())
            .collect();
        played.sort_by(|a, b| b.last_played.cmp(&a.last_played));
        played.truncate(limit);
        played
    }

    /// Forget every station.
    pub fn clear(&mut self) -> Result<()> {
        self.stations.clear();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn temp_store() -> (StationStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = StationStore::load(dir.path().join("radio_stations.json")).unwrap();
        (store, dir)
    }

    fn direct(url: &str) -> std::result::Result<Vec<String>, ResolveError> {
        Ok(vec![url.to_string()])
    }

    fn with_genre(name: &str, genre: &str) -> RadioStation {
        RadioStation {
            genre: genre.to_string(),
            ..RadioStation::new(name, format!("http://radio/{}", name))
        }
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let (store, _dir) = temp_store();
        assert!(store.stations().is_empty());
    }

    #[test]
    fn test_add_resolves_and_persists() {
        let (mut store, _dir) = temp_store();
        let added = store
            .add_station(RadioStation::new("Groove Salad", "http://somafm.com/groovesalad.pls"), |_| {
                Ok(vec!["http://ice1/gs".to_string(), "http://ice2/gs".to_string()])
            })
            .unwrap();
        assert_eq!(added.stream_url, "http://ice1/gs");
        assert_eq!(added.stream_urls.len(), 2);
        assert!(added.added_at.is_some());

        let reloaded = StationStore::load(&store.path).unwrap();
        assert_eq!(reloaded.stations(), store.stations());
        assert!(!store.path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_resolve_leaves_store_unchanged() {
        let (mut store, _dir) = temp_store();
        let result = store.add_station(RadioStation::new("Bad", "http://x/list.m3u"), |url| {
            Err(ResolveError::NoStreamUrlFound {
                url: url.to_string(),
            })
        });
        assert!(matches!(result, Err(Error::Resolve(_))));
        assert!(store.stations().is_empty());
        assert!(!store.path.exists());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let (mut store, _dir) = temp_store();
        store.add_station(RadioStation::new("Jazz", "http://a/"), direct).unwrap();
        let result = store.add_station(RadioStation::new("jazz", "http://b/"), direct);
        assert!(matches!(result, Err(Error::DuplicateStation(_))));
        assert_eq!(store.stations().len(), 1);
    }

    #[test]
    fn test_remove_station() {
        let (mut store, _dir) = temp_store();
        store.add_station(RadioStation::new("A", "http://a/"), direct).unwrap();
        store.add_station(RadioStation::new("B", "http://b/"), direct).unwrap();

        let removed = store.remove_station("a").unwrap();
        assert_eq!(removed.name, "A");
        assert!(store.station("A").is_none());
        assert!(matches!(store.remove_station("A"), Err(Error::StationNotFound(_))));

        let reloaded = StationStore::load(&store.path).unwrap();
        assert_eq!(reloaded.stations().len(), 1);
    }

    #[test]
    fn test_genres_and_filtering() {
        let (mut store, _dir) = temp_store();
        for s in [
            with_genre("a", "Jazz"),
            with_genre("b", "Ambient"),
            with_genre("c", "Jazz"),
            with_genre("d", ""),
        ] {
            store.add_station(s, direct).unwrap();
        }
        assert_eq!(store.genres(), vec!["Ambient", "Jazz"]);
        let jazz: Vec<&str> = store
            .stations_by_genre("jazz")
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(jazz, vec!["a", "c"]);
    }

    #[test]
    fn test_recent_orders_by_last_played() {
        let (mut store, _dir) = temp_store();
        for name in ["a", "b", "c", "d"] {
            store.add_station(RadioStation::new(name, "http://r/"), direct).unwrap();
        }
        let t = |h| Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap();
        store.mark_played_at("a", t(9)).unwrap();
        store.mark_played_at("c", t(12)).unwrap();
        store.mark_played_at("b", t(10)).unwrap();

        let names: Vec<&str> = store.recent(2).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
        assert_eq!(store.recent(10).len(), 3);
        assert!(store.mark_played("zzz").is_err());
    }

    #[test]
    fn test_clear() {
        let (mut store, _dir) = temp_store();
        store.add_station(RadioStation::new("a", "http://r/"), direct).unwrap();
        store.clear().unwrap();
        assert!(StationStore::load(&store.path).unwrap().stations().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("radio_stations.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(StationStore::load(&path).is_err());
    }
}

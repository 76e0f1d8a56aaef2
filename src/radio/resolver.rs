//! Expands playlist manifests (PLS, M3U) into stream URLs.
//!
//! Manifests are recognised by the suffix of the URL's path, never by
//! content. Only absolute `http(s)` entries are kept; relative playlist
//! entries are skipped.

use std::time::Duration;

use thiserror::Error;

/// Errors while turning a station URL into playable stream URLs.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Failed to fetch playlist {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Playlist {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Playlist {url} did not respond within {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("No stream URL found in playlist {url}")]
    NoStreamUrlFound { url: String },
}

/// Playlist formats understood by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Pls,
    M3u,
}

/// Which manifest format `url` points at, judged by its path suffix.
///
/// Query strings and fragments are ignored; the check is case-insensitive.
pub fn manifest_kind(url: &str) -> Option<ManifestKind> {
    let path = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase(),
    };

    if path.ends_with(".pls") {
        Some(ManifestKind::Pls)
    } else if path.ends_with(".m3u") || path.ends_with(".m3u8") {
        Some(ManifestKind::M3u)
    } else {
        None
    }
}

/// Stream URLs from the `FileN=` entries of a PLS body, in file order.
pub fn parse_pls(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            let prefix = key.get(..4)?;
            let number = &key[4..];
            let is_file_key = prefix.eq_ignore_ascii_case("file")
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit());
            let value = value.trim();
            (is_file_key && value.starts_with("http")).then(|| value.to_string())
        })
        .collect()
}

/// Stream URLs from an M3U body: non-comment lines starting with `http`.
pub fn parse_m3u(body: &str) -> Vec<String> {
    body.lines()
        .map(|line| line.trim().trim_start_matches('\u{feff}'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| line.starts_with("http"))
        .map(str::to_string)
        .collect()
}

/// Expand `url` into its candidate stream URLs.
///
/// Non-manifest URLs come back unchanged as a single candidate. Manifests
/// are fetched with `fetch` and parsed; an empty result is an error.
pub fn resolve_with<F>(url: &str, fetch: F) -> Result<Vec<String>, ResolveError>
where
    F: FnOnce(&str) -> Result<String, ResolveError>,
{
    let Some(kind) = manifest_kind(url) else {
        return Ok(vec![url.to_string()]);
    };

    tracing::debug!(url, ?kind, "Fetching playlist");
    let body = fetch(url)?;
    let urls = match kind {
        ManifestKind::Pls => parse_pls(&body),
        ManifestKind::M3u => parse_m3u(&body),
    };

    if urls.is_empty() {
        return Err(ResolveError::NoStreamUrlFound {
            url: url.to_string(),
        });
    }
    tracing::debug!(url, count = urls.len(), "Resolved playlist");
    Ok(urls)
}

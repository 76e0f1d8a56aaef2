//! HTTP audio streams and manifest fetching.
//!
//! Requests run on a small tokio runtime owned by [`HttpStreamer`]. Radio
//! bodies never end, so there is no overall deadline: the response headers
//! must arrive within the header timeout, and after that each body chunk
//! must arrive within the same interval or the stream ends with a
//! `TimedOut` read error. The body is pumped chunk by chunk on a
//! `stream-prefetch` thread into a bounded channel and read back through a
//! [`BufReader`] by the decoder on its feed thread.
//!
//! Dropping the reader closes the channel; the pump notices on its next
//! send, drops the response, and the connection closes.

use std::io::{self, BufReader, Read};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio::runtime::{Handle, Runtime};

use super::PlaybackError;
use crate::config::StreamConfig;
use crate::radio::resolver::{self, ResolveError};

/// Chunks buffered between the network pump and the reader.
const PREFETCH_CHUNKS: usize = 16;

/// Providers that reject requests lacking their own Referer/Origin.
const KNOWN_PROVIDERS: &[(&str, &str)] = &[("somafm.com", "https://somafm.com")];

/// Origin to present for `url`, if its host belongs to a known provider.
pub fn provider_origin(url: &str) -> Option<&'static str> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    KNOWN_PROVIDERS
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{}", domain)))
        .map(|(_, origin)| *origin)
}

/// Whether `location` names a network stream rather than a local path.
pub fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// An open HTTP audio body ready for a decoder.
pub struct NetworkStream {
    pub reader: BufReader<ChunkReader>,
    pub content_type: Option<String>,
}

/// Owns the HTTP client and the runtime its requests run on.
pub struct HttpStreamer {
    runtime: Runtime,
    client: reqwest::Client,
    header_timeout: Duration,
    read_ahead: usize,
    user_agent: String,
}

impl HttpStreamer {
    pub fn new(config: &StreamConfig) -> Result<Self, PlaybackError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("stream-io")
            .enable_all()
            .build()
            .map_err(PlaybackError::Runtime)?;

        let header_timeout = Duration::from_secs(config.header_timeout_secs.max(1));
        let client = reqwest::Client::builder()
            .connect_timeout(header_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(PlaybackError::HttpClient)?;

        Ok(Self {
            runtime,
            client,
            header_timeout,
            read_ahead: config.read_ahead_kib.max(4) * 1024,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Headers that make the request look like a browser media element.
    fn stream_headers(&self, url: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let mut set = |name, value: &str| {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(name, value);
            }
        };
        set(header::USER_AGENT, self.user_agent.as_str());
        set(header::ACCEPT, "*/*");
        set(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9");
        // Compressed audio bodies only confuse decoders
        set(header::ACCEPT_ENCODING, "identity");
        set(header::CONNECTION, "keep-alive");
        set(header::CACHE_CONTROL, "no-cache");
        set(header::PRAGMA, "no-cache");
        set(header::HeaderName::from_static("sec-fetch-dest"), "audio");
        set(header::HeaderName::from_static("sec-fetch-mode"), "cors");
        if let Some(origin) = provider_origin(url) {
            set(header::REFERER, format!("{}/", origin).as_str());
            set(header::ORIGIN, origin);
        }
        headers
    }

    /// Connect to an audio stream and start prefetching its body.
    pub fn connect(&self, url: &str) -> Result<NetworkStream, PlaybackError> {
        tracing::debug!(url, "Connecting to stream");
        let request = self.client.get(url).headers(self.stream_headers(url));
        let timeout = self.header_timeout;

        let response = self.runtime.block_on(async {
            tokio::time::timeout(timeout, request.send()).await
        });
        let response = match response {
            Ok(Ok(r)) => r,
            Ok(Err(source)) => {
                return Err(PlaybackError::Connect {
                    url: url.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(PlaybackError::HeaderTimeout {
                    url: url.to_string(),
                    timeout,
                });
            }
        };

        let status = response.status();
        tracing::debug!(url, status = status.as_u16(), "Stream responded");
        if status != reqwest::StatusCode::OK {
            return Err(PlaybackError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let (tx, rx) = bounded(PREFETCH_CHUNKS);
        let handle = self.runtime.handle().clone();
        let origin = url.to_string();
        thread::Builder::new()
            .name("stream-prefetch".to_string())
            .spawn(move || pump(handle, response, tx, origin, timeout))
            .map_err(PlaybackError::Runtime)?;

        Ok(NetworkStream {
            reader: BufReader::with_capacity(self.read_ahead, ChunkReader::new(rx)),
            content_type,
        })
    }

    /// GET `url` as text, with plain headers. Used for PLS/M3U manifests.
    pub fn fetch_text(&self, url: &str) -> Result<String, ResolveError> {
        let timeout = self.header_timeout;
        let client = &self.client;
        self.runtime.block_on(async {
            let response = tokio::time::timeout(timeout, client.get(url).send())
                .await
                .map_err(|_| ResolveError::Timeout {
                    url: url.to_string(),
                    timeout,
                })?
                .map_err(|source| ResolveError::Fetch {
                    url: url.to_string(),
                    source,
                })?;

            let status = response.status();
            if status != reqwest::StatusCode::OK {
                return Err(ResolveError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            response.text().await.map_err(|source| ResolveError::Fetch {
                url: url.to_string(),
                source,
            })
        })
    }

    /// Expand `url` into its candidate stream URLs (see [`resolver::resolve_with`]).
    pub fn resolve(&self, url: &str) -> Result<Vec<String>, ResolveError> {
        resolver::resolve_with(url, |manifest| self.fetch_text(manifest))
    }
}

/// Copy the response body into `tx` until EOF, error, a stall longer than
/// `stall`, or the reader going away.
fn pump(
    handle: Handle,
    mut response: reqwest::Response,
    tx: Sender<io::Result<Vec<u8>>>,
    url: String,
    stall: Duration,
) {
    loop {
        let chunk = handle.block_on(async { tokio::time::timeout(stall, response.chunk()).await });
        let next = match chunk {
            Ok(Ok(Some(bytes))) => Ok(bytes.to_vec()),
            Ok(Ok(None)) => {
                tracing::debug!(url = %url, "Stream body ended");
                return;
            }
            Ok(Err(e)) => Err(io::Error::other(e)),
            Err(_) => {
                tracing::warn!(url = %url, "No stream data for {:?}, giving up", stall);
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no stream data for {:?}", stall),
                ))
            }
        };
        let failed = next.is_err();
        if tx.send(next).is_err() {
            tracing::debug!(url = %url, "Stream reader closed, dropping connection");
            return;
        }
        if failed {
            return;
        }
    }
}

/// Blocking [`Read`] over body chunks arriving from the prefetch thread.
///
/// A closed channel reads as end of stream.
pub struct ChunkReader {
    rx: Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl ChunkReader {
    pub fn new(rx: Receiver<io::Result<Vec<u8>>>) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.chunk.len() {
            match self.rx.recv() {
                Ok(Ok(chunk)) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => {
                    tracing::debug!("Stream read error: {}", e);
                    return Err(e);
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

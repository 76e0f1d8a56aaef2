//! Playback engine: local files and internet radio through one pull chain.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Player (control context)                    │
//! │   play / pause / resume / stop, position and visualizer      │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │ attach / clear / set_paused
//!                             ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │             MixerSink (audio-output thread, cpal)            │
//! │   DecodedStream → Resampled → SampleTap on a playback-feed   │
//! │   thread; the callback only copies out decoded blocks        │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │ completions
//!                             ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  playback-events thread                      │
//! │       marks the session Finished under the state lock        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are always taken in the order establish → state → sink. The
//! completion path takes only the state lock.

mod audio;
mod decoder;
mod feed;
mod mixer;
mod resampler;
mod source;
mod state;
mod stream;
mod visualization;

pub use audio::{AudioOutput, AudioSink, current_audio_device, list_audio_devices};
pub use decoder::{DecodedStream, FormatKind};
pub use mixer::{Completion, SessionId};
pub use resampler::Resampled;
pub use source::{Frame, Source, fill};
pub use state::{Clock, PlaybackStatus, Stopwatch, SystemClock, format_duration, progress};
pub use stream::{HttpStreamer, is_url};
pub use visualization::{AmplitudeMeter, BANDS, SampleTap};

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use thiserror::Error;
use tracing::Span;

use crate::config::{Config, StreamConfig};
use crate::radio::RadioStation;
use crate::radio::resolver::ResolveError;

/// Playback errors.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("No response headers from {url} within {timeout:?}")]
    HeaderTimeout { url: String, timeout: Duration },

    #[error("HTTP error {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to decode {origin} as {format}: {source}")]
    Decode {
        origin: String,
        format: FormatKind,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("No playable audio track in {0}")]
    NoAudioTrack(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Resampler error: {0}")]
    Resampler(String),

    #[error("All {attempts} stream candidates failed, last error: {last}")]
    AllCandidatesFailed {
        attempts: usize,
        #[source]
        last: Box<PlaybackError>,
    },

    #[error("No stream candidates to play")]
    NoCandidates,

    #[error("Audio output error: {0}")]
    AudioInit(String),

    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// A decoded source ready for the chain, at its native rate.
pub struct OpenedSource {
    pub source: Box<dyn Source>,
    pub sample_rate: u32,
}

/// Turns identifiers into decoded sources.
pub trait SourceOpener: Send + Sync {
    /// Candidate locations to try, in order, for `location`.
    fn resolve_candidates(&self, location: &str) -> Result<Vec<String>, PlaybackError> {
        Ok(vec![location.to_string()])
    }

    /// Open and start decoding one location.
    fn open(&self, location: &str) -> Result<OpenedSource, PlaybackError>;
}

/// Opens local files from disk and URLs over HTTP.
pub struct MediaOpener {
    http: HttpStreamer,
}

impl MediaOpener {
    pub fn new(config: &StreamConfig) -> Result<Self, PlaybackError> {
        Ok(Self {
            http: HttpStreamer::new(config)?,
        })
    }
}

impl SourceOpener for MediaOpener {
    fn resolve_candidates(&self, location: &str) -> Result<Vec<String>, PlaybackError> {
        Ok(self.http.resolve(location)?)
    }

    fn open(&self, location: &str) -> Result<OpenedSource, PlaybackError> {
        let stream = if is_url(location) {
            let net = self.http.connect(location)?;
            let kind = FormatKind::from_content_type(net.content_type.as_deref());
            let mss = MediaSourceStream::new(
                Box::new(ReadOnlySource::new(net.reader)),
                Default::default(),
            );
            decoder::decode(mss, kind, location)?
        } else {
            decoder::open_file(Path::new(location))?
        };

        let sample_rate = stream.sample_rate();
        Ok(OpenedSource {
            source: Box::new(stream),
            sample_rate,
        })
    }
}

#[derive(Debug, Default)]
struct EngineState {
    status: PlaybackStatus,
    session: Option<SessionId>,
    last_session: SessionId,
    identifier: Option<String>,
    timer: Stopwatch,
    duration: Duration,
}

struct Shared {
    sink: Arc<dyn AudioSink>,
    opener: Arc<dyn SourceOpener>,
    clock: Arc<dyn Clock>,
    meter: Arc<AmplitudeMeter>,
    /// Serialises session setup and teardown
    establish: Mutex<()>,
    state: RwLock<EngineState>,
    span: Span,
}

impl Shared {
    /// Completion for session `id`; stale ids are ignored.
    fn finish(&self, id: SessionId) {
        let _enter = self.span.enter();
        let mut state = self.state.write();
        if state.session != Some(id) {
            tracing::debug!(session = id, "Ignoring completion for replaced session");
            return;
        }
        tracing::info!(
            session = id,
            identifier = state.identifier.as_deref().unwrap_or_default(),
            "Playback finished"
        );
        state.session = None;
        state.status = PlaybackStatus::Finished;
        state.identifier = None;
        state.timer.reset();
        self.meter.reset();
    }
}

/// The playback engine.
///
/// All methods take `&self`; the player can be shared across threads by
/// reference or behind an `Arc`.
pub struct Player {
    shared: Arc<Shared>,
}

impl Player {
    /// Open the default (or configured) output device and an HTTP client.
    pub fn new(config: &Config) -> Result<Self, PlaybackError> {
        let output = AudioOutput::start(&config.audio)?;
        let opener = MediaOpener::new(&config.stream)?;
        Ok(Self::with_parts(
            Arc::new(output),
            Arc::new(opener),
            Arc::new(SystemClock),
            tracing::info_span!("player"),
        ))
    }

    /// Assemble a player from its collaborators.
    ///
    /// Pass `Span::none()` to silence engine logging.
    pub fn with_parts(
        sink: Arc<dyn AudioSink>,
        opener: Arc<dyn SourceOpener>,
        clock: Arc<dyn Clock>,
        span: Span,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                opener,
                clock,
                meter: Arc::new(AmplitudeMeter::new()),
                establish: Mutex::new(()),
                state: RwLock::new(EngineState::default()),
                span,
            }),
        }
    }

    /// Play a local file or a stream URL, replacing whatever is playing.
    ///
    /// URLs are expanded through the manifest resolver and tried in order
    /// until one connects and decodes.
    pub fn play(&self, identifier: &str) -> Result<(), PlaybackError> {
        let _enter = self.shared.span.enter();
        let _establish = self.shared.establish.lock();

        if is_url(identifier) {
            self.stop_locked();
            self.shared.state.write().status = PlaybackStatus::Loading;
            let candidates = match self.shared.opener.resolve_candidates(identifier) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(url = identifier, "Could not resolve stream: {}", e);
                    self.shared.state.write().status = PlaybackStatus::Stopped;
                    return Err(e);
                }
            };
            self.play_candidates(identifier, &candidates)
        } else {
            let path = Path::new(identifier);
            if FormatKind::from_path(path).is_none() {
                return Err(decoder::unsupported(path));
            }
            self.stop_locked();
            self.shared.state.write().status = PlaybackStatus::Loading;
            self.play_candidates(identifier, &[identifier.to_string()])
        }
    }

    /// Play a saved station, trying its stored stream URLs in order.
    pub fn play_radio_station(&self, station: &RadioStation) -> Result<(), PlaybackError> {
        let _enter = self.shared.span.enter();
        let _establish = self.shared.establish.lock();

        tracing::info!(station = %station.name, "Tuning in");
        self.stop_locked();
        self.shared.state.write().status = PlaybackStatus::Loading;
        self.play_candidates(&station.name, &station.candidates())
    }

    /// Try each candidate in order; the first that opens is attached.
    ///
    /// Caller holds the establish lock.
    fn play_candidates(&self, label: &str, candidates: &[String]) -> Result<(), PlaybackError> {
        let mut last = None;
        for (attempt, candidate) in candidates.iter().enumerate() {
            tracing::info!(url = %candidate, attempt = attempt + 1, total = candidates.len(), "Opening");
            let result = self
                .shared
                .opener
                .open(candidate)
                .and_then(|opened| self.attach(label, opened));
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(url = %candidate, "Candidate failed: {}", e);
                    last = Some(e);
                }
            }
        }

        self.shared.state.write().status = PlaybackStatus::Stopped;
        match last {
            // A lone candidate reports its own error
            Some(e) if candidates.len() == 1 => Err(e),
            Some(e) => Err(PlaybackError::AllCandidatesFailed {
                attempts: candidates.len(),
                last: Box::new(e),
            }),
            None => Err(PlaybackError::NoCandidates),
        }
    }

    /// Build the resample/tap chain around `opened` and hand it to the sink.
    fn attach(&self, label: &str, opened: OpenedSource) -> Result<(), PlaybackError> {
        let shared = &self.shared;
        let resampled = Resampled::new(opened.source, opened.sample_rate, shared.sink.sample_rate())?;
        let chain: Box<dyn Source> = Box::new(SampleTap::new(resampled, Arc::clone(&shared.meter)));

        let mut state = shared.state.write();
        state.last_session += 1;
        let id = state.last_session;
        state.session = Some(id);
        state.status = PlaybackStatus::Playing;
        state.identifier = Some(label.to_string());
        state.duration = Duration::ZERO;
        state.timer.restart(shared.clock.now());

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        shared.sink.attach(
            id,
            chain,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.finish(id);
                }
            }),
        );
        tracing::info!(session = id, identifier = label, "Playing");
        Ok(())
    }

    /// Pause playback. Only effective while playing.
    pub fn pause(&self) {
        let mut state = self.shared.state.write();
        self.pause_locked(&mut state);
    }

    /// Resume playback. Only effective while paused.
    pub fn resume(&self) {
        let mut state = self.shared.state.write();
        self.resume_locked(&mut state);
    }

    /// Pause if playing, resume if paused, in one critical section.
    pub fn toggle_pause(&self) {
        let mut state = self.shared.state.write();
        match state.status {
            PlaybackStatus::Playing => self.pause_locked(&mut state),
            PlaybackStatus::Paused => self.resume_locked(&mut state),
            _ => {}
        }
    }

    fn pause_locked(&self, state: &mut EngineState) {
        let Some(id) = state.session else { return };
        if state.status != PlaybackStatus::Playing {
            return;
        }
        self.shared.sink.set_paused(id, true);
        state.timer.pause(self.shared.clock.now());
        state.status = PlaybackStatus::Paused;
        tracing::debug!(parent: &self.shared.span, session = id, "Paused");
    }

    fn resume_locked(&self, state: &mut EngineState) {
        let Some(id) = state.session else { return };
        if state.status != PlaybackStatus::Paused {
            return;
        }
        self.shared.sink.set_paused(id, false);
        state.timer.resume(self.shared.clock.now());
        state.status = PlaybackStatus::Playing;
        tracing::debug!(parent: &self.shared.span, session = id, "Resumed");
    }

    /// Stop and release the current session. Safe to call when stopped.
    pub fn stop(&self) {
        let _establish = self.shared.establish.lock();
        self.stop_locked();
    }

    /// Caller holds the establish lock.
    fn stop_locked(&self) {
        let mut state = self.shared.state.write();
        self.shared.sink.clear();
        if let Some(id) = state.session.take() {
            tracing::info!(parent: &self.shared.span, session = id, "Stopped");
        }
        state.status = PlaybackStatus::Stopped;
        state.identifier = None;
        state.timer.reset();
        self.shared.meter.reset();
    }

    /// Whether audio is audible right now, as far as the sink knows.
    pub fn is_playing(&self) -> bool {
        let state = self.shared.state.read();
        match state.session.and_then(|id| self.shared.sink.is_paused(id)) {
            Some(paused) => !paused,
            None => state.status == PlaybackStatus::Playing,
        }
    }

    pub fn is_paused(&self) -> bool {
        let state = self.shared.state.read();
        match state.session.and_then(|id| self.shared.sink.is_paused(id)) {
            Some(paused) => paused,
            None => state.status == PlaybackStatus::Paused,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.shared.state.read().status
    }

    /// The file path, URL or station name of the current session.
    pub fn current_identifier(&self) -> Option<String> {
        self.shared.state.read().identifier.clone()
    }

    /// Set the known length of the current track (e.g. from tags).
    ///
    /// Each new session starts with an unknown (zero) duration.
    pub fn set_duration(&self, duration: Duration) {
        self.shared.state.write().duration = duration;
    }

    pub fn duration(&self) -> Duration {
        self.shared.state.read().duration
    }

    /// Time played in the current session, excluding paused stretches.
    pub fn position(&self) -> Duration {
        let state = self.shared.state.read();
        match state.status {
            PlaybackStatus::Playing | PlaybackStatus::Paused => {
                state.timer.elapsed(self.shared.clock.now())
            }
            _ => Duration::ZERO,
        }
    }

    /// Position as a fraction of duration; 0 when the duration is unknown.
    pub fn progress(&self) -> f64 {
        let state = self.shared.state.read();
        let position = match state.status {
            PlaybackStatus::Playing | PlaybackStatus::Paused => {
                state.timer.elapsed(self.shared.clock.now())
            }
            _ => Duration::ZERO,
        };
        progress(position, state.duration)
    }

    /// Copy of the latest visualizer bands, always [`BANDS`] long.
    pub fn audio_samples(&self) -> Vec<f32> {
        self.shared.meter.snapshot()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

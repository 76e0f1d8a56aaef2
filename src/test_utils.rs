//! Test utilities and doubles for resona tests.
//!
//! The engine is exercised without audio hardware or network access: a
//! [`RecordingSink`] stands in for the cpal output, a [`ScriptedOpener`]
//! for the decoders, and a [`ManualClock`] for wall-clock time. Tests of
//! the real HTTP path talk to [`serve_once`], a one-connection server on a
//! local port.
//!
//! # Example
//!
//! ```ignore
//! let sink = Arc::new(RecordingSink::new(44100));
//! let opener = Arc::new(ScriptedOpener::new().succeed_on("http://good/1"));
//! let player = Player::with_parts(sink, opener, Arc::new(ManualClock::new()), Span::none());
//! ```

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, bounded};
use parking_lot::Mutex;

use crate::player::{
    AudioSink, Clock, Completion, FormatKind, Frame, OpenedSource, PlaybackError, SessionId, Source,
    SourceOpener,
};

/// A clock that only moves when told to.
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// `frames` frames of a fixed amplitude on both channels, then end of stream.
pub struct ConstantSource {
    amplitude: f32,
    remaining: usize,
}

impl ConstantSource {
    pub fn new(amplitude: f32, frames: usize) -> Self {
        Self {
            amplitude,
            remaining: frames,
        }
    }
}

impl Source for ConstantSource {
    fn pull(&mut self, frames: &mut [Frame]) -> usize {
        let n = frames.len().min(self.remaining);
        frames[..n].fill([self.amplitude; 2]);
        self.remaining -= n;
        n
    }
}

/// Plays `frames` frames, then stops with a decode error.
pub struct FailingSource {
    inner: ConstantSource,
    error: Option<PlaybackError>,
}

impl FailingSource {
    pub fn after(frames: usize) -> Self {
        Self {
            inner: ConstantSource::new(0.1, frames),
            error: None,
        }
    }
}

impl Source for FailingSource {
    fn pull(&mut self, frames: &mut [Frame]) -> usize {
        let n = self.inner.pull(frames);
        if n == 0 && self.error.is_none() {
            self.error = Some(PlaybackError::Decode {
                origin: "failing source".to_string(),
                format: FormatKind::Mp3,
                source: symphonia::core::errors::Error::DecodeError("corrupt frame"),
            });
        }
        n
    }

    fn error(&self) -> Option<&PlaybackError> {
        self.error.as_ref()
    }
}

struct Attached {
    id: SessionId,
    source: Box<dyn Source>,
    paused: bool,
    on_finish: Option<Completion>,
}

#[derive(Default)]
struct Recording {
    attached: Option<Attached>,
    attachments: usize,
}

/// A sink that records attachments and panics if two sessions are ever
/// attached at the same time.
pub struct RecordingSink {
    sample_rate: u32,
    inner: Mutex<Recording>,
}

impl RecordingSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            inner: Mutex::new(Recording::default()),
        }
    }

    /// Total attachments over the sink's lifetime.
    pub fn attachments(&self) -> usize {
        self.inner.lock().attachments
    }

    /// Sessions currently attached (0 or 1).
    pub fn live_sessions(&self) -> usize {
        usize::from(self.inner.lock().attached.is_some())
    }

    pub fn attached(&self) -> Option<SessionId> {
        self.inner.lock().attached.as_ref().map(|a| a.id)
    }

    /// Pull `frames` frames from the attached source, as the output would.
    pub fn render(&self, frames: usize) -> usize {
        let mut inner = self.inner.lock();
        let Some(attached) = inner.attached.as_mut() else {
            return 0;
        };
        let mut buf = vec![[0.0; 2]; frames];
        crate::player::fill(&mut attached.source, &mut buf)
    }

    /// Take the current session's completion without detaching it.
    pub fn take_completion(&self) -> Completion {
        self.inner
            .lock()
            .attached
            .as_mut()
            .and_then(|a| a.on_finish.take())
            .expect("no completion to take")
    }

    /// Simulate the attached source running dry.
    pub fn finish_current(&self) {
        let attached = self.inner.lock().attached.take();
        if let Some(done) = attached.and_then(|a| a.on_finish) {
            done();
        }
    }
}

impl AudioSink for RecordingSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn attach(&self, id: SessionId, source: Box<dyn Source>, on_finish: Completion) {
        let mut inner = self.inner.lock();
        assert!(
            inner.attached.is_none(),
            "session {} attached while another is live",
            id
        );
        inner.attachments += 1;
        inner.attached = Some(Attached {
            id,
            source,
            paused: false,
            on_finish: Some(on_finish),
        });
    }

    fn clear(&self) {
        self.inner.lock().attached = None;
    }

    fn set_paused(&self, id: SessionId, paused: bool) {
        if let Some(a) = self.inner.lock().attached.as_mut().filter(|a| a.id == id) {
            a.paused = paused;
        }
    }

    fn is_paused(&self, id: SessionId) -> Option<bool> {
        self.inner
            .lock()
            .attached
            .as_ref()
            .filter(|a| a.id == id)
            .map(|a| a.paused)
    }
}

/// An opener with scripted outcomes that records every open attempt.
///
/// Locations not marked with [`succeed_on`](Self::succeed_on) fail with
/// HTTP 503.
#[derive(Default)]
pub struct ScriptedOpener {
    manifests: HashMap<String, Vec<String>>,
    good: HashSet<String>,
    attempts: Mutex<Vec<String>>,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `url` resolve to `candidates`.
    pub fn with_manifest(mut self, url: &str, candidates: Vec<String>) -> Self {
        self.manifests.insert(url.to_string(), candidates);
        self
    }

    pub fn succeed_on(mut self, location: &str) -> Self {
        self.good.insert(location.to_string());
        self
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

impl SourceOpener for ScriptedOpener {
    fn resolve_candidates(&self, location: &str) -> Result<Vec<String>, PlaybackError> {
        Ok(self
            .manifests
            .get(location)
            .cloned()
            .unwrap_or_else(|| vec![location.to_string()]))
    }

    fn open(&self, location: &str) -> Result<OpenedSource, PlaybackError> {
        self.attempts.lock().push(location.to_string());
        if self.good.contains(location) {
            Ok(OpenedSource {
                source: Box::new(ConstantSource::new(0.5, 44100 * 60)),
                sample_rate: 44100,
            })
        } else {
            Err(PlaybackError::HttpStatus {
                url: location.to_string(),
                status: 503,
            })
        }
    }
}

/// Write a 16-bit PCM WAV holding `frames` frames of constant `level`.
pub fn write_test_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32, level: i16) {
    let bytes = test_wav_bytes(sample_rate, channels, frames, level);
    std::fs::write(path, bytes).expect("Failed to write test wav");
}

/// The bytes of a 16-bit PCM WAV holding `frames` frames of constant `level`.
pub fn test_wav_bytes(sample_rate: u32, channels: u16, frames: u32, level: i16) -> Vec<u8> {
    let block_align = channels * 2;
    let data_len = frames * u32::from(block_align);

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for _ in 0..frames * u32::from(channels) {
        bytes.extend_from_slice(&level.to_le_bytes());
    }
    bytes
}

/// What [`serve_once`] sends after the response headers.
pub enum CannedBody {
    /// These bytes with a `Content-Length`, then the connection closes.
    Fixed(Vec<u8>),
    /// These bytes, then nothing more while the connection stays open.
    Stalled(Vec<u8>),
    /// Filler bytes until the client hangs up (or ten seconds pass).
    Endless,
}

/// What [`serve_once`] saw.
pub struct Served {
    /// Request line and headers, header names as the client wrote them.
    pub request: String,
    /// For [`CannedBody::Endless`], whether the client closed the connection.
    pub hung_up: bool,
}

/// Answer a single HTTP request on a local port with `status`, `headers`
/// and `body`. Returns the base URL and a receiver for what was seen.
pub fn serve_once(status: &str, headers: &[&str], body: CannedBody) -> (String, Receiver<Served>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test server");
    let url = format!("http://{}", listener.local_addr().expect("no local addr"));

    let mut head = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status);
    for h in headers {
        head.push_str(h);
        head.push_str("\r\n");
    }

    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let Ok((mut conn, _)) = listener.accept() else {
            return;
        };
        let request = read_request(&mut conn);
        let mut hung_up = false;
        match body {
            CannedBody::Fixed(bytes) => {
                head.push_str(&format!("Content-Length: {}\r\n\r\n", bytes.len()));
                let _ = conn.write_all(head.as_bytes());
                let _ = conn.write_all(&bytes);
            }
            CannedBody::Stalled(bytes) => {
                head.push_str("\r\n");
                let _ = conn.write_all(head.as_bytes());
                let _ = conn.write_all(&bytes);
                let _ = conn.flush();
                thread::sleep(Duration::from_secs(5));
            }
            CannedBody::Endless => {
                head.push_str("\r\n");
                let _ = conn.write_all(head.as_bytes());
                let filler = [0x55u8; 4096];
                let deadline = Instant::now() + Duration::from_secs(10);
                while Instant::now() < deadline {
                    if conn.write_all(&filler).is_err() {
                        hung_up = true;
                        break;
                    }
                    thread::sleep(Duration::from_millis(2));
                }
            }
        }
        let _ = tx.send(Served { request, hung_up });
    });
    (url, rx)
}

fn read_request(conn: &mut TcpStream) -> String {
    let mut request = Vec::new();
    let mut byte = [0u8; 1];
    while !request.ends_with(b"\r\n\r\n") {
        match conn.read(&mut byte) {
            Ok(1) => request.push(byte[0]),
            _ => break,
        }
    }
    String::from_utf8_lossy(&request).into_owned()
}

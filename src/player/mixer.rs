//! The always-running mixer behind the audio output.
//!
//! The output callback renders the mixer under the mixer's own lock, which
//! is the sink-level lock: attaching, clearing and pausing sessions all take
//! it, so a graph change never lands halfway through a render. Sessions
//! attached through [`MixerSink`] are decoded on their own [`Feed`] thread,
//! so rendering only copies out blocks that are already decoded and never
//! waits on a file or socket while the lock is held. Completion callbacks
//! for exhausted sessions are handed to a separate `playback-events` thread
//! and never run on the realtime thread or under this lock.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;

use super::feed::Feed;
use super::source::{Frame, Source};

/// Identifies one attached playback session.
pub type SessionId = u64;

/// Invoked once when an attached source runs dry on its own.
pub type Completion = Box<dyn FnOnce() + Send>;

struct Track {
    id: SessionId,
    source: Box<dyn Source>,
    paused: bool,
    on_finish: Option<Completion>,
}

/// Sums the attached sources into one stereo stream.
pub struct Mixer {
    tracks: Vec<Track>,
    scratch: Vec<Frame>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Attach a source; `on_finish` fires only on natural exhaustion.
    pub fn add(&mut self, id: SessionId, source: Box<dyn Source>, on_finish: Completion) {
        self.tracks.push(Track {
            id,
            source,
            paused: false,
            on_finish: Some(on_finish),
        });
    }

    /// Detach everything. Sources are dropped without running their callbacks.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Freeze or unfreeze a session. Returns false if it is not attached.
    pub fn set_paused(&mut self, id: SessionId, paused: bool) -> bool {
        match self.tracks.iter_mut().find(|t| t.id == id) {
            Some(track) => {
                track.paused = paused;
                true
            }
            None => false,
        }
    }

    /// Pause flag of an attached session.
    pub fn is_paused(&self, id: SessionId) -> Option<bool> {
        self.tracks.iter().find(|t| t.id == id).map(|t| t.paused)
    }

    /// Render the next block into `out`.
    ///
    /// Paused sessions contribute silence. Sessions that run dry are
    /// detached and their completions pushed onto `finished`.
    pub fn render(&mut self, out: &mut [Frame], finished: &mut Vec<Completion>) {
        out.fill([0.0; 2]);
        if self.scratch.len() < out.len() {
            self.scratch.resize(out.len(), [0.0; 2]);
        }
        let scratch = &mut self.scratch[..out.len()];

        self.tracks.retain_mut(|track| {
            if track.paused {
                return true;
            }

            let filled = super::source::fill(&mut track.source, scratch);
            for (o, s) in out.iter_mut().zip(&scratch[..filled]) {
                o[0] += s[0];
                o[1] += s[1];
            }
            if filled == out.len() {
                return true;
            }

            match track.source.error() {
                Some(e) => tracing::warn!(session = track.id, error = %e, "Playback stopped on stream error"),
                None => tracing::debug!(session = track.id, "Source exhausted"),
            }
            if let Some(done) = track.on_finish.take() {
                finished.push(done);
            }
            false
        });

        for frame in out.iter_mut() {
            frame[0] = frame[0].clamp(-1.0, 1.0);
            frame[1] = frame[1].clamp(-1.0, 1.0);
        }
    }
}

/// A [`Mixer`] shared between the output callback and the engine.
#[derive(Clone)]
pub struct MixerSink {
    mixer: Arc<Mutex<Mixer>>,
    events: Sender<Completion>,
}

impl MixerSink {
    /// Create the mixer and its `playback-events` thread.
    ///
    /// The thread exits once every clone of the sink is dropped.
    pub fn new() -> std::io::Result<Self> {
        let (events, rx) = unbounded::<Completion>();
        thread::Builder::new()
            .name("playback-events".to_string())
            .spawn(move || {
                for done in rx {
                    done();
                }
            })?;

        Ok(Self {
            mixer: Arc::new(Mutex::new(Mixer::new())),
            events,
        })
    }

    /// Render one block; called from the realtime output callback.
    pub fn render(&self, out: &mut [Frame]) {
        let mut finished = Vec::new();
        self.mixer.lock().render(out, &mut finished);
        for done in finished {
            // Receiver only goes away at shutdown
            let _ = self.events.send(done);
        }
    }

    /// Start decoding `source` on a feed thread and mix it in.
    ///
    /// If the thread cannot be started the session ends at once, as if its
    /// source had run dry.
    pub fn attach(&self, id: SessionId, source: Box<dyn Source>, on_finish: Completion) {
        match Feed::spawn(source, id) {
            Ok(feed) => self.mixer.lock().add(id, Box::new(feed), on_finish),
            Err(e) => {
                tracing::error!(session = id, "Failed to start decoding thread: {}", e);
                let _ = self.events.send(on_finish);
            }
        }
    }

    pub fn clear(&self) {
        self.mixer.lock().clear();
    }

    pub fn set_paused(&self, id: SessionId, paused: bool) {
        self.mixer.lock().set_paused(id, paused);
    }

    pub fn is_paused(&self, id: SessionId) -> Option<bool> {
        self.mixer.lock().is_paused(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::decoder::{FormatKind, decode};
    use crate::player::stream::ChunkReader;
    use crate::test_utils::{ConstantSource, FailingSource, test_wav_bytes};
    use std::io::BufReader;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use symphonia::core::io::{MediaSourceStream, ReadOnlySource};

    fn counter() -> (Arc<AtomicUsize>, Completion) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let done: Completion = Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, done)
    }

    #[test]
    fn test_empty_mixer_renders_silence() {
        let mut mixer = Mixer::new();
        let mut out = [[1.0; 2]; 32];
        let mut finished = Vec::new();
        mixer.render(&mut out, &mut finished);
        assert!(out.iter().all(|f| *f == [0.0, 0.0]));
        assert!(finished.is_empty());
    }

    #[test]
    fn test_paused_track_is_silent_and_kept() {
        let mut mixer = Mixer::new();
        let (_, done) = counter();
        mixer.add(1, Box::new(ConstantSource::new(0.5, 1000)), done);
        assert!(mixer.set_paused(1, true));
        assert_eq!(mixer.is_paused(1), Some(true));

        let mut out = [[0.0; 2]; 64];
        let mut finished = Vec::new();
        mixer.render(&mut out, &mut finished);
        assert!(out.iter().all(|f| *f == [0.0, 0.0]));
        assert_eq!(mixer.tracks.len(), 1);

        mixer.set_paused(1, false);
        mixer.render(&mut out, &mut finished);
        assert!(out.iter().all(|f| *f == [0.5, 0.5]));
    }

    #[test]
    fn test_exhausted_track_reports_completion() {
        let mut mixer = Mixer::new();
        let (count, done) = counter();
        mixer.add(7, Box::new(ConstantSource::new(0.5, 40)), done);

        let mut out = [[0.0; 2]; 64];
        let mut finished = Vec::new();
        mixer.render(&mut out, &mut finished);

        assert!(mixer.tracks.is_empty());
        assert_eq!(out[39], [0.5, 0.5]);
        assert_eq!(out[40], [0.0, 0.0]);
        assert_eq!(finished.len(), 1);
        for f in finished {
            f();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stream_error_ends_track_like_completion() {
        let mut mixer = Mixer::new();
        let (_, done) = counter();
        mixer.add(3, Box::new(FailingSource::after(10)), done);
        let mut out = [[0.0; 2]; 64];
        let mut finished = Vec::new();
        mixer.render(&mut out, &mut finished);
        assert!(mixer.tracks.is_empty());
        assert_eq!(finished.len(), 1);
    }

    #[test]
    fn test_clear_drops_without_completion() {
        let mut mixer = Mixer::new();
        let (count, done) = counter();
        mixer.add(1, Box::new(ConstantSource::new(0.5, 10)), done);
        mixer.clear();
        assert!(mixer.tracks.is_empty());
        assert_eq!(mixer.is_paused(1), None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_output_is_clamped() {
        let mut mixer = Mixer::new();
        mixer.add(1, Box::new(ConstantSource::new(0.8, 100)), counter().1);
        mixer.add(2, Box::new(ConstantSource::new(0.8, 100)), counter().1);
        let mut out = [[0.0; 2]; 16];
        mixer.render(&mut out, &mut Vec::new());
        assert!(out.iter().all(|f| *f == [1.0, 1.0]));
    }

    #[test]
    fn test_sink_dispatches_completion_off_thread() {
        let sink = MixerSink::new().unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        sink.attach(
            1,
            Box::new(ConstantSource::new(0.1, 8)),
            Box::new(move || {
                let _ = tx.send(thread::current().name().map(str::to_string));
            }),
        );

        // The feed thread may not have decoded anything on the first callbacks
        let mut out = [[0.0; 2]; 32];
        let name = loop {
            sink.render(&mut out);
            if let Ok(name) = rx.recv_timeout(Duration::from_millis(10)) {
                break name;
            }
        };
        assert_eq!(name.as_deref(), Some("playback-events"));
        assert_eq!(sink.is_paused(1), None);
    }

    #[test]
    fn test_sink_plays_attached_audio() {
        let sink = MixerSink::new().unwrap();
        sink.attach(1, Box::new(ConstantSource::new(0.25, 44100)), counter().1);

        let mut out = [[0.0; 2]; 256];
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while out[0] != [0.25, 0.25] {
            assert!(std::time::Instant::now() < deadline, "no audio reached the mixer");
            thread::sleep(Duration::from_millis(1));
            sink.render(&mut out);
        }
        assert!(out.iter().all(|f| *f == [0.25, 0.25]));
    }

    #[test]
    fn test_stalled_stream_does_not_hold_sink_lock() {
        let sink = MixerSink::new().unwrap();

        // The header promises a minute of audio but only a little arrives,
        // and the connection stays open
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut bytes = test_wav_bytes(44100, 2, 44100 * 60, 1000);
        bytes.truncate(44 + 2048 * 4);
        tx.send(Ok(bytes)).unwrap();

        let reader = BufReader::new(ChunkReader::new(rx));
        let mss = MediaSourceStream::new(Box::new(ReadOnlySource::new(reader)), Default::default());
        let stream = decode(mss, FormatKind::Wav, "stalled").unwrap();
        let (finished, done) = counter();
        sink.attach(1, Box::new(stream), done);

        let render = sink.clone();
        let renderer = thread::spawn(move || {
            let mut out = [[0.0; 2]; 512];
            for _ in 0..100 {
                render.render(&mut out);
                thread::sleep(Duration::from_millis(1));
            }
        });
        thread::sleep(Duration::from_millis(30));

        let (cleared_tx, cleared_rx) = crossbeam_channel::bounded(1);
        let clearer = sink.clone();
        thread::spawn(move || {
            clearer.clear();
            let _ = cleared_tx.send(());
        });
        cleared_rx
            .recv_timeout(Duration::from_secs(3))
            .expect("clear waited on a stalled stream");

        renderer.join().unwrap();
        assert_eq!(sink.is_paused(1), None);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        drop(tx);
    }
}

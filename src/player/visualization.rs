//! Amplitude capture for the visualizer.
//!
//! [`SampleTap`] sits at the outer end of the decode chain and sees every
//! frame on its way to the mixer. It mixes frames to mono into a fixed window;
//! each time the window fills, it splits the window into [`BANDS`] contiguous
//! slices, takes the RMS of each, and swaps the result into the shared
//! [`AmplitudeMeter`]. The window then starts over empty, so the publish rate
//! follows the fill rate rather than wall-clock time.
//!
//! The tap runs on the session's feed thread. The meter lock is only taken
//! to replace a finished vector, never per sample.
//!
//! Every reset starts a new meter generation. A tap belongs to the
//! generation it was created in, and its publishes are dropped once the meter
//! has moved on, so a tap still draining after a stop cannot leave a stale
//! snapshot behind.

use std::sync::Arc;

use parking_lot::RwLock;

use super::PlaybackError;
use super::source::{Frame, Source};

/// Number of amplitude bands published per snapshot.
pub const BANDS: usize = 24;

/// Mono samples accumulated before each analysis.
pub const WINDOW: usize = 1024;

#[derive(Debug, Default)]
struct Reading {
    generation: u64,
    bands: Option<Vec<f32>>,
}

/// Latest published band amplitudes, shared between the tap and the UI.
#[derive(Debug, Default)]
pub struct AmplitudeMeter {
    latest: RwLock<Reading>,
}

impl AmplitudeMeter {
    pub fn new() -> Self {
        Self::default()
    }

    fn generation(&self) -> u64 {
        self.latest.read().generation
    }

    /// Replace the snapshot wholesale, unless the meter has been reset since
    /// `generation`.
    fn publish(&self, generation: u64, bands: Vec<f32>) {
        let mut latest = self.latest.write();
        if latest.generation == generation {
            latest.bands = Some(bands);
        }
    }

    /// A copy of the latest snapshot, or [`BANDS`] zeros if nothing has been
    /// published since the last reset.
    pub fn snapshot(&self) -> Vec<f32> {
        self.latest
            .read()
            .bands
            .clone()
            .unwrap_or_else(|| vec![0.0; BANDS])
    }

    /// Back to silence. Taps created before this call stop publishing.
    pub fn reset(&self) {
        let mut latest = self.latest.write();
        latest.generation += 1;
        latest.bands = None;
    }
}

/// RMS of each of `bands` contiguous, near-equal slices of `window`.
///
/// Slice boundaries are `i * len / bands`, so every sample lands in exactly
/// one band. Bands left empty by a short window report `0.0`.
pub fn band_rms(window: &[f32], bands: usize) -> Vec<f32> {
    let len = window.len();
    (0..bands)
        .map(|band| {
            let start = band * len / bands;
            let end = (band + 1) * len / bands;
            let slice = &window[start..end];
            if slice.is_empty() {
                return 0.0;
            }
            let sum_sq: f32 = slice.iter().map(|s| s * s).sum();
            (sum_sq / slice.len() as f32).sqrt()
        })
        .collect()
}

/// Pass-through source that feeds an [`AmplitudeMeter`].
pub struct SampleTap<S> {
    inner: S,
    meter: Arc<AmplitudeMeter>,
    generation: u64,
    window: Vec<f32>,
    capacity: usize,
}

impl<S: Source> SampleTap<S> {
    pub fn new(inner: S, meter: Arc<AmplitudeMeter>) -> Self {
        Self::with_window(inner, meter, WINDOW)
    }

    /// Tap with a custom window size (at least one sample per band).
    pub fn with_window(inner: S, meter: Arc<AmplitudeMeter>, capacity: usize) -> Self {
        let capacity = capacity.max(BANDS);
        Self {
            inner,
            generation: meter.generation(),
            meter,
            window: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn capture(&mut self, frames: &[Frame]) {
        for frame in frames {
            self.window.push((frame[0] + frame[1]) * 0.5);
            if self.window.len() >= self.capacity {
                let bands = band_rms(&self.window, BANDS);
                self.meter.publish(self.generation, bands);
                self.window.clear();
            }
        }
    }
}

impl<S: Source> Source for SampleTap<S> {
    fn pull(&mut self, frames: &mut [Frame]) -> usize {
        let n = self.inner.pull(frames);
        self.capture(&frames[..n]);
        n
    }

    fn error(&self) -> Option<&PlaybackError> {
        self.inner.error()
    }
}

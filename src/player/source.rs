//! The pull capability shared by every stage of the decode chain.
//!
//! A playing session is a stack of sources, each owning the next:
//!
//! ```text
//! SampleTap ─owns─▶ Resampled ─owns─▶ DecodedStream ─owns─▶ reader (file / HTTP body)
//! ```
//!
//! The mixer pulls fixed-size blocks of stereo frames from the outermost
//! stage on the realtime audio thread; each stage forwards the pull inward.

use super::PlaybackError;

/// One stereo sample pair, `[left, right]`, nominally in `-1.0..=1.0`.
pub type Frame = [f32; 2];

/// A pull-based producer of stereo PCM frames.
pub trait Source: Send {
    /// Fill `frames` from the front and return how many were written.
    ///
    /// Returning fewer frames than requested is allowed mid-stream;
    /// returning `0` for a non-empty buffer means the source is exhausted
    /// and will not produce again.
    fn pull(&mut self, frames: &mut [Frame]) -> usize;

    /// The error that ended this source early, if any.
    ///
    /// An exhausted source with no error reached its natural end.
    fn error(&self) -> Option<&PlaybackError> {
        None
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn pull(&mut self, frames: &mut [Frame]) -> usize {
        (**self).pull(frames)
    }

    fn error(&self) -> Option<&PlaybackError> {
        (**self).error()
    }
}

/// Pull repeatedly until `frames` is full or `source` is exhausted.
///
/// Returns the number of frames written; less than `frames.len()` only
/// when the source ran dry.
pub fn fill<S: Source + ?Sized>(source: &mut S, frames: &mut [Frame]) -> usize {
    let mut filled = 0;
    while filled < frames.len() {
        let n = source.pull(&mut frames[filled..]);
        if n == 0 {
            break;
        }
        filled += n;
    }
    filled
}

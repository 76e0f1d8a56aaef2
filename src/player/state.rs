//! Playback status, timing bookkeeping and position/progress math.
//!
//! Position is derived from wall-clock bookkeeping rather than from the
//! decoder: live streams have no usable timestamps, and the sink may be
//! paused while the decoder sits idle.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Current playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    /// A play request is connecting or decoding its first packets.
    Loading,
    Playing,
    Paused,
    /// Like `Stopped`, but reached because the stream ran out.
    Finished,
}

impl PlaybackStatus {
    /// Short label for status lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Finished => "finished",
        }
    }
}

/// Source of "now" for timing bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// An accumulating timer: time banked so far plus the current running stretch.
///
/// `elapsed = accumulated + (now - running_since)` while running, and just
/// `accumulated` while paused. Used by the engine for track position and by
/// the now-playing view for radio listening time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stopwatch {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl Stopwatch {
    /// A stopwatch already running from `now`.
    pub fn started(now: Instant) -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: Some(now),
        }
    }

    /// Clear banked time and start running from `now`.
    pub fn restart(&mut self, now: Instant) {
        *self = Self::started(now);
    }

    /// Fold the running stretch into the bank and stop running.
    ///
    /// No-op when already paused.
    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    /// Start a fresh running stretch from `now`.
    ///
    /// No-op when already running.
    pub fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Back to zero, not running.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Total time accrued as of `now`.
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + now.saturating_duration_since(since),
            None => self.accumulated,
        }
    }
}

/// Fraction of `duration` covered by `position`, clamped to `0.0..=1.0`.
///
/// Unknown (zero) durations report `0.0`, never NaN or infinity.
pub fn progress(position: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }
    (position.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
}

/// Format a duration as MM:SS or HH:MM:SS.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

//! Audio resampler using rubato for high-quality sample rate conversion.
//!
//! Decoders hand out whatever rate the file or stream was encoded at
//! (22.05kHz talk radio, 48kHz FLAC, ...); the mixer runs at one fixed
//! output rate. [`Resampled`] bridges the two inside the pull chain.

use rubato::{FftFixedIn, Resampler as RubatoResampler};

use super::PlaybackError;
use super::source::{Frame, Source};

/// Frames handed to rubato per call. Larger = more efficient but more latency.
const CHUNK_FRAMES: usize = 1024;

/// Sub-chunks used by the FFT resampler; fixed so output is deterministic.
const SUB_CHUNKS: usize = 2;

const CHANNELS: usize = 2;

/// Stereo FFT resampler over interleaved samples.
pub struct Resampler {
    resampler: Option<FftFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    /// Per-channel input not yet handed to rubato
    input_buffer: Vec<Vec<f32>>,
}

impl Resampler {
    /// Create a new resampler.
    ///
    /// If input and output rates match, no resampling is performed.
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self, PlaybackError> {
        if input_rate == 0 || output_rate == 0 {
            return Err(PlaybackError::Resampler(format!(
                "invalid sample rate {}Hz -> {}Hz",
                input_rate, output_rate
            )));
        }

        let resampler = if input_rate == output_rate {
            None
        } else {
            let resampler = FftFixedIn::<f32>::new(
                input_rate as usize,
                output_rate as usize,
                CHUNK_FRAMES,
                SUB_CHUNKS,
                CHANNELS,
            )
            .map_err(|e| PlaybackError::Resampler(e.to_string()))?;

            tracing::debug!("Resampler: {}Hz → {}Hz", input_rate, output_rate);
            Some(resampler)
        };

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            input_buffer: vec![Vec::new(); CHANNELS],
        })
    }

    /// Check if resampling is needed.
    pub fn needs_resampling(&self) -> bool {
        self.resampler.is_some()
    }

    /// Process interleaved stereo samples, returning resampled interleaved output.
    ///
    /// Output may be empty until enough input has accumulated for a chunk.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return input.to_vec();
        };

        for (i, sample) in input.iter().enumerate() {
            self.input_buffer[i % CHANNELS].push(*sample);
        }

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.input_buffer[0].len() < needed {
                break;
            }

            let chunks: Vec<Vec<f32>> = self
                .input_buffer
                .iter_mut()
                .map(|ch| ch.drain(..needed).collect())
                .collect();

            match resampler.process(&chunks, None) {
                Ok(resampled) => interleave_into(&resampled, usize::MAX, &mut output),
                Err(e) => tracing::warn!("Resampling error: {}", e),
            }
        }

        output
    }

    /// Flush any remaining samples in the buffer.
    /// Call this at end of stream.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return Vec::new();
        };

        let remaining = self.input_buffer[0].len();
        if remaining == 0 {
            return Vec::new();
        }

        // Pad the tail out to a full chunk, then keep only the unpadded share
        let needed = resampler.input_frames_next();
        let chunks: Vec<Vec<f32>> = self
            .input_buffer
            .iter_mut()
            .map(|ch| {
                let mut chunk: Vec<f32> = ch.drain(..).collect();
                chunk.resize(needed, 0.0);
                chunk
            })
            .collect();

        let expected_frames = (remaining as f64 * self.output_rate as f64
            / self.input_rate as f64)
            .ceil() as usize;

        let mut output = Vec::new();
        match resampler.process(&chunks, None) {
            Ok(resampled) => interleave_into(&resampled, expected_frames, &mut output),
            Err(e) => tracing::warn!("Resampling flush error: {}", e),
        }
        output
    }
}

fn interleave_into(planes: &[Vec<f32>], max_frames: usize, output: &mut Vec<f32>) {
    let Some(first) = planes.first() else {
        return;
    };
    let frames = first.len().min(max_frames);
    output.reserve(frames * planes.len());
    for frame in 0..frames {
        for plane in planes {
            output.push(plane[frame]);
        }
    }
}

/// A source converted to a different sample rate.
pub struct Resampled<S> {
    inner: S,
    resampler: Resampler,
    scratch: Vec<Frame>,
    pending: Vec<f32>,
    cursor: usize,
    drained: bool,
}

impl<S: Source> Resampled<S> {
    pub fn new(inner: S, input_rate: u32, output_rate: u32) -> Result<Self, PlaybackError> {
        Ok(Self {
            inner,
            resampler: Resampler::new(input_rate, output_rate)?,
            scratch: vec![[0.0; 2]; CHUNK_FRAMES],
            pending: Vec::new(),
            cursor: 0,
            drained: false,
        })
    }

    /// Pull one block from the inner source and resample it into `pending`.
    fn refill(&mut self) {
        let n = self.inner.pull(&mut self.scratch);
        self.pending = if n == 0 {
            self.drained = true;
            self.resampler.flush()
        } else {
            let interleaved: Vec<f32> = self.scratch[..n].iter().flatten().copied().collect();
            self.resampler.process(&interleaved)
        };
        self.cursor = 0;
    }
}

impl<S: Source> Source for Resampled<S> {
    fn pull(&mut self, frames: &mut [Frame]) -> usize {
        if !self.resampler.needs_resampling() {
            return self.inner.pull(frames);
        }

        let mut filled = 0;
        while filled < frames.len() {
            if self.cursor + 1 < self.pending.len() {
                frames[filled] = [self.pending[self.cursor], self.pending[self.cursor + 1]];
                self.cursor += 2;
                filled += 1;
            } else if self.drained {
                break;
            } else {
                self.refill();
            }
        }
        filled
    }

    fn error(&self) -> Option<&PlaybackError> {
        self.inner.error()
    }
}

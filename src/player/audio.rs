//! Audio output using cpal.
//!
//! The output stream runs for the life of the player and renders the
//! [`MixerSink`] on every device callback; silence when nothing is attached.
//! `cpal::Stream` is not `Send` on every platform, so it lives on its own
//! `audio-output` thread, which parks until the [`AudioOutput`] is dropped.

use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Sender, bounded};

use super::PlaybackError;
use super::mixer::{Completion, MixerSink, SessionId};
use super::source::{Frame, Source};
use crate::config::AudioConfig;

/// Where the engine sends decoded sessions.
///
/// Implementations guard their playback graph with their own lock, distinct
/// from the engine's state lock.
pub trait AudioSink: Send + Sync {
    /// Output rate every attached source must already be converted to.
    fn sample_rate(&self) -> u32;

    /// Start playing `source`. `on_finish` runs once, off the realtime
    /// thread, if the source runs dry on its own.
    fn attach(&self, id: SessionId, source: Box<dyn Source>, on_finish: Completion);

    /// Detach every source without running completions.
    fn clear(&self);

    /// Freeze or unfreeze an attached session.
    fn set_paused(&self, id: SessionId, paused: bool);

    /// The sink's own pause flag for `id`, or `None` if it is not attached.
    fn is_paused(&self, id: SessionId) -> Option<bool>;
}

/// Audio output manager.
pub struct AudioOutput {
    mixer: MixerSink,
    sample_rate: u32,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioOutput {
    /// Open the output device and start rendering.
    pub fn start(config: &AudioConfig) -> Result<Self, PlaybackError> {
        let mixer = MixerSink::new().map_err(|e| PlaybackError::AudioInit(e.to_string()))?;
        let (ready_tx, ready_rx) = bounded::<Result<u32, PlaybackError>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let render = mixer.clone();
        let config = config.clone();
        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match open_stream(&config, render) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Returns once the sender is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| PlaybackError::AudioInit(e.to_string()))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| PlaybackError::AudioInit("audio thread exited".to_string()))??;

        Ok(Self {
            mixer,
            sample_rate,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.mixer.clear();
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl AudioSink for AudioOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn attach(&self, id: SessionId, source: Box<dyn Source>, on_finish: Completion) {
        self.mixer.attach(id, source, on_finish);
    }

    fn clear(&self) {
        self.mixer.clear();
    }

    fn set_paused(&self, id: SessionId, paused: bool) {
        self.mixer.set_paused(id, paused);
    }

    fn is_paused(&self, id: SessionId) -> Option<bool> {
        self.mixer.is_paused(id)
    }
}

/// Pick the device, negotiate a config, build and start the stream.
fn open_stream(config: &AudioConfig, mixer: MixerSink) -> Result<(Stream, u32), PlaybackError> {
    let host = cpal::default_host();
    let device = select_device(&host, &config.output_device)?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    tracing::info!("Using audio device: {}", device_name);

    let supported = preferred_config(&device, config.sample_rate)?;
    let sample_rate = supported.sample_rate().0;
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    tracing::info!(
        "Audio format: {}Hz, {} channels, {:?}",
        sample_rate,
        stream_config.channels,
        supported.sample_format()
    );

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, mixer),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, mixer),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, mixer),
        format => {
            return Err(PlaybackError::AudioInit(format!(
                "Unsupported sample format: {:?}",
                format
            )));
        }
    }
    .map_err(|e| PlaybackError::AudioInit(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PlaybackError::AudioInit(e.to_string()))?;

    Ok((stream, sample_rate))
}

/// The named device if configured and present, else the system default.
fn select_device(host: &cpal::Host, wanted: &str) -> Result<Device, PlaybackError> {
    if !wanted.is_empty() {
        let found = host
            .output_devices()
            .map_err(|e| PlaybackError::AudioInit(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false));
        match found {
            Some(device) => return Ok(device),
            None => tracing::warn!("Output device {:?} not found, using default", wanted),
        }
    }

    host.default_output_device()
        .ok_or_else(|| PlaybackError::AudioInit("No output device found".to_string()))
}

/// A stereo config at `rate` if the device offers one, else its default.
fn preferred_config(
    device: &Device,
    rate: u32,
) -> Result<cpal::SupportedStreamConfig, PlaybackError> {
    if rate > 0
        && let Ok(ranges) = device.supported_output_configs()
    {
        let wanted = cpal::SampleRate(rate);
        let matching = ranges
            .filter(|r| r.channels() == 2)
            .filter(|r| r.min_sample_rate() <= wanted && wanted <= r.max_sample_rate())
            .find(|r| matches!(r.sample_format(), SampleFormat::F32 | SampleFormat::I16));
        if let Some(range) = matching {
            return Ok(range.with_sample_rate(wanted));
        }
        tracing::debug!("Device has no stereo {}Hz config, using its default", rate);
    }

    device
        .default_output_config()
        .map_err(|e| PlaybackError::AudioInit(e.to_string()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mixer: MixerSink,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut frames: Vec<Frame> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let needed = data.len() / channels.max(1);
            if frames.len() != needed {
                frames.resize(needed, [0.0; 2]);
            }
            mixer.render(&mut frames);

            for (out, frame) in data.chunks_mut(channels.max(1)).zip(&frames) {
                match out {
                    [mono] => *mono = T::from_sample((frame[0] + frame[1]) * 0.5),
                    [left, right, rest @ ..] => {
                        *left = T::from_sample(frame[0]);
                        *right = T::from_sample(frame[1]);
                        for s in rest {
                            *s = T::from_sample(0.0f32);
                        }
                    }
                    [] => {}
                }
            }
        },
        |err| {
            tracing::error!("Audio stream error: {}", err);
        },
        None,
    )
}

/// List available audio output devices.
pub fn list_audio_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Get the current/default audio device name.
pub fn current_audio_device() -> String {
    let host = cpal::default_host();
    host.default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_else(|| "Unknown".to_string())
}

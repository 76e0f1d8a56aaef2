//! Audio decoder using symphonia for multi-format support.
//!
//! Supported formats:
//! - MP3
//! - FLAC
//! - OGG Vorbis
//! - WAV/PCM
//!
//! The container reader is picked explicitly from a [`FormatKind`] (file
//! extension for local files, `Content-Type` for streams) instead of probing,
//! so an unsupported local file is rejected before it is ever opened.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::default::formats::{FlacReader, MpaReader, OggReader, WavReader};

use super::PlaybackError;
use super::source::{Frame, Source};

/// Container formats the player can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Mp3,
    Wav,
    Flac,
    Ogg,
}

impl FormatKind {
    /// Format for a local file, judged by extension alone (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            "flac" => Some(Self::Flac),
            "ogg" => Some(Self::Ogg),
            _ => None,
        }
    }

    /// Format for a network stream.
    ///
    /// Only Ogg is recognised from the header; everything else, including a
    /// missing header, is treated as MP3 since that is what most radio
    /// servers send regardless of label.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let ct = content_type.unwrap_or_default().to_ascii_lowercase();
        if ct.contains("ogg") || ct.contains("vorbis") {
            Self::Ogg
        } else {
            Self::Mp3
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
        }
    }

    fn open_reader(
        self,
        mss: MediaSourceStream,
        opts: &FormatOptions,
    ) -> Result<Box<dyn FormatReader>, SymphoniaError> {
        Ok(match self {
            Self::Mp3 => Box::new(MpaReader::try_new(mss, opts)?),
            Self::Wav => Box::new(WavReader::try_new(mss, opts)?),
            Self::Flac => Box::new(FlacReader::try_new(mss, opts)?),
            Self::Ogg => Box::new(OggReader::try_new(mss, opts)?),
        })
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Open a local file for decoding.
///
/// Unsupported extensions fail before any I/O happens.
pub fn open_file(path: &Path) -> Result<DecodedStream, PlaybackError> {
    let kind = FormatKind::from_path(path).ok_or_else(|| unsupported(path))?;

    let file = File::open(path).map_err(|source| PlaybackError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    decode(mss, kind, &path.display().to_string())
}

/// The error for a path whose extension is not in the supported set.
pub fn unsupported(path: &Path) -> PlaybackError {
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| "(none)".to_string());
    PlaybackError::UnsupportedFormat(ext)
}

/// Start decoding `mss` as `kind`.
///
/// On failure `mss` (and the file or connection under it) is dropped before
/// the error is returned.
pub fn decode(
    mss: MediaSourceStream,
    kind: FormatKind,
    origin: &str,
) -> Result<DecodedStream, PlaybackError> {
    let decode_err = |source| PlaybackError::Decode {
        origin: origin.to_string(),
        format: kind,
        source,
    };

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };
    let reader = kind.open_reader(mss, &format_opts).map_err(decode_err)?;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PlaybackError::NoAudioTrack(origin.to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| PlaybackError::NoAudioTrack(format!("{} (unknown sample rate)", origin)))?;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(decode_err)?;

    tracing::debug!(
        origin,
        format = kind.extension(),
        sample_rate,
        channels,
        "Decoder ready"
    );

    Ok(DecodedStream {
        reader,
        decoder,
        track_id,
        sample_rate,
        format: kind,
        origin: origin.to_string(),
        samples: None,
        pending: Vec::new(),
        cursor: 0,
        finished: false,
        error: None,
    })
}

/// Decoded PCM from one container, as stereo frames at its native rate.
pub struct DecodedStream {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    format: FormatKind,
    origin: String,
    samples: Option<SampleBuffer<f32>>,
    pending: Vec<Frame>,
    cursor: usize,
    finished: bool,
    error: Option<PlaybackError>,
}

impl DecodedStream {
    /// Get the native sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decode the next packet into `pending`.
    ///
    /// Returns `false` at end of stream or after a fatal error.
    fn decode_next(&mut self) -> bool {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return false;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return self.fail(e),
            };

            // Skip packets from other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::trace!(origin = %self.origin, "Skipping bad frame: {}", e);
                    continue;
                }
                Err(e) => return self.fail(e),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);
            let needed = decoded.capacity() * channels;
            if self.samples.as_ref().is_some_and(|buf| buf.capacity() < needed) {
                self.samples = None;
            }
            let capacity = decoded.capacity() as u64;
            let samples = self
                .samples
                .get_or_insert_with(|| SampleBuffer::new(capacity, spec));
            samples.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending.extend(samples.samples().chunks_exact(channels).map(|s| {
                if channels == 1 { [s[0], s[0]] } else { [s[0], s[1]] }
            }));
            self.cursor = 0;
            return true;
        }
    }

    fn fail(&mut self, source: SymphoniaError) -> bool {
        tracing::warn!(origin = %self.origin, "Decode error: {}", source);
        self.error = Some(PlaybackError::Decode {
            origin: self.origin.clone(),
            format: self.format,
            source,
        });
        false
    }
}

impl Source for DecodedStream {
    fn pull(&mut self, frames: &mut [Frame]) -> usize {
        let mut filled = 0;
        while filled < frames.len() {
            if self.cursor < self.pending.len() {
                let n = (self.pending.len() - self.cursor).min(frames.len() - filled);
                frames[filled..filled + n]
                    .copy_from_slice(&self.pending[self.cursor..self.cursor + n]);
                self.cursor += n;
                filled += n;
            } else if self.finished || !self.decode_next() {
                self.finished = true;
                break;
            }
        }
        filled
    }

    fn error(&self) -> Option<&PlaybackError> {
        self.error.as_ref()
    }
}

//! WAV input/output and the 16 kHz mono clip handed to transcribers.

use std::io::{Cursor, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use thiserror::Error;

use super::resample::{resample_to_16k, stereo_to_mono};

/// Sample rate every [`AudioClip`] is stored at.
pub const CLIP_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("failed to encode WAV: {0}")]
    Encode(String),
}

// ---------------------------------------------------------------------------
// AudioClip
// ---------------------------------------------------------------------------

/// Mono `f32` samples in `[-1.0, 1.0]` at 16 kHz.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
}

impl AudioClip {
    /// Wrap samples that are already 16 kHz mono.
    pub fn from_mono_16k(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Down-mix and resample interleaved samples captured at `sample_rate`.
    pub fn from_interleaved(samples: &[f32], sample_rate: u32, channels: u16) -> Self {
        let mono = stereo_to_mono(samples, channels);
        Self {
            samples: resample_to_16k(&mono, sample_rate),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / CLIP_SAMPLE_RATE as f32
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
    }

    /// Encode as a 16-bit PCM mono WAV file in memory.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, WavError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: CLIP_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = WavWriter::new(&mut cursor, spec)
                .map_err(|e| WavError::Encode(e.to_string()))?;
            for &sample in &self.samples {
                let s16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer
                    .write_sample(s16)
                    .map_err(|e| WavError::Encode(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| WavError::Encode(e.to_string()))?;
        }
        Ok(cursor.into_inner())
    }

    /// Write the clip to `path` as 16-bit PCM WAV.
    pub fn save(&self, path: &Path) -> Result<(), WavError> {
        let bytes = self.to_wav_bytes()?;
        std::fs::write(path, bytes).map_err(|e| WavError::Write {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a WAV file, down-mix to mono and resample to 16 kHz.
pub fn load_wav(path: &Path) -> Result<AudioClip, WavError> {
    let reader = WavReader::open(path).map_err(|e| match e {
        hound::Error::IoError(io) => WavError::Read {
            path: path.display().to_string(),
            reason: io.to_string(),
        },
        other => WavError::UnsupportedFormat(other.to_string()),
    })?;
    let clip = decode(reader)?;
    log::debug!(
        "audio: loaded {} ({:.2}s, peak {:.3})",
        path.display(),
        clip.duration_secs(),
        clip.peak()
    );
    Ok(clip)
}

/// Decode an in-memory WAV file.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioClip, WavError> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| WavError::UnsupportedFormat(e.to_string()))?;
    decode(reader)
}

fn decode<R: Read>(reader: WavReader<R>) -> Result<AudioClip, WavError> {
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(WavError::UnsupportedFormat("zero channels".into()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(WavError::UnsupportedFormat(format!(
                    "{}-bit integer samples",
                    spec.bits_per_sample
                )));
            }
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| WavError::UnsupportedFormat(e.to_string()))?
        }
        SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(WavError::UnsupportedFormat(format!(
                    "{}-bit float samples",
                    spec.bits_per_sample
                )));
            }
            reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| WavError::UnsupportedFormat(e.to_string()))?
        }
    };

    Ok(AudioClip::from_interleaved(
        &interleaved,
        spec.sample_rate,
        spec.channels,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Pre-transcription audio quality gate.
//!
//! [`AudioQuality`] checks a 16 kHz mono [`AudioClip`] before it is sent to
//! a transcriber:
//!
//! | Check | Outcome |
//! |-------|---------|
//! | Duration below minimum | [`AudioError::TooShort`], treated as no speech |
//! | Duration above maximum | [`AudioError::TooLong`] |
//! | Peak under silence threshold | [`AudioError::TooQuiet`], treated as no speech |
//! | Too many clipped samples | [`AudioError::Clipping`] |
//!
//! # Example
//!
//! ```rust
//! use qgis_plugin_generator::audio::{AudioClip, AudioError, AudioQuality};
//!
//! let validator = AudioQuality::new(0.5, 60.0);
//!
//! // 8000 samples @ 16 kHz = 0.5 s (just at the minimum)
//! let clip = AudioClip::from_mono_16k(vec![0.1_f32; 8_000]);
//! assert!(validator.validate(&clip).is_ok());
//!
//! let silent = AudioClip::from_mono_16k(vec![0.0_f32; 16_000]);
//! assert!(matches!(validator.validate(&silent), Err(AudioError::TooQuiet { .. })));
//! ```

use thiserror::Error;

use crate::config::AudioConfig;

use super::wav::{AudioClip, CLIP_SAMPLE_RATE};

// ---------------------------------------------------------------------------
// AudioError
// ---------------------------------------------------------------------------

/// Reason an audio clip failed the quality gate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioError {
    #[error("recording too short: {got_secs:.2}s (minimum {min_secs:.2}s)")]
    TooShort { min_secs: f32, got_secs: f32 },

    #[error("recording too long: {got_secs:.2}s (maximum {max_secs:.2}s)")]
    TooLong { max_secs: f32, got_secs: f32 },

    #[error("audio too quiet: peak amplitude {amplitude:.4} (threshold {threshold:.4})")]
    TooQuiet { amplitude: f32, threshold: f32 },

    #[error("audio clipping: {clipped_pct:.1}% of samples clipped (max {max_pct:.1}%)")]
    Clipping { clipped_pct: f32, max_pct: f32 },
}

// ---------------------------------------------------------------------------
// AudioQuality
// ---------------------------------------------------------------------------

/// Validates a clip before transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioQuality {
    pub min_recording_secs: f32,
    pub max_recording_secs: f32,
    /// Minimum peak amplitude for the clip to count as non-silent.
    pub silence_threshold: f32,
    /// Amplitude above which a sample counts as clipped.
    pub clipping_threshold: f32,
    /// Maximum share of clipped samples, in percent.
    pub clipping_max_pct: f32,
}

impl Default for AudioQuality {
    fn default() -> Self {
        Self::from_config(&AudioConfig::default())
    }
}

impl AudioQuality {
    /// Create a validator with the given duration limits and default thresholds.
    pub fn new(min_secs: f32, max_secs: f32) -> Self {
        Self {
            min_recording_secs: min_secs,
            max_recording_secs: max_secs,
            ..Default::default()
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            min_recording_secs: config.min_recording_secs,
            max_recording_secs: config.max_recording_secs,
            silence_threshold: config.silence_threshold,
            clipping_threshold: 0.99,
            clipping_max_pct: 10.0,
        }
    }

    /// Run the checks in order: duration, silence, clipping.  Returns the
    /// first failure.
    pub fn validate(&self, clip: &AudioClip) -> Result<(), AudioError> {
        let duration_secs = clip.len() as f32 / CLIP_SAMPLE_RATE as f32;

        if duration_secs < self.min_recording_secs {
            return Err(AudioError::TooShort {
                min_secs: self.min_recording_secs,
                got_secs: duration_secs,
            });
        }
        if duration_secs > self.max_recording_secs {
            return Err(AudioError::TooLong {
                max_secs: self.max_recording_secs,
                got_secs: duration_secs,
            });
        }

        let peak = clip.peak();
        if peak < self.silence_threshold {
            return Err(AudioError::TooQuiet {
                amplitude: peak,
                threshold: self.silence_threshold,
            });
        }

        if !clip.is_empty() {
            let clipped = clip
                .samples()
                .iter()
                .filter(|&&s| s.abs() > self.clipping_threshold)
                .count();
            let clipped_pct = clipped as f32 / clip.len() as f32 * 100.0;
            if clipped_pct > self.clipping_max_pct {
                return Err(AudioError::Clipping {
                    clipped_pct,
                    max_pct: self.clipping_max_pct,
                });
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_clip(secs: f32, amplitude: f32) -> AudioClip {
        let n = (secs * 16_000.0) as usize;
        AudioClip::from_mono_16k(vec![amplitude; n])
    }

    #[test]
    fn valid_audio_passes() {
        let validator = AudioQuality::default();
        assert!(validator.validate(&make_clip(1.0, 0.3)).is_ok());
    }

    #[test]
    fn too_short_is_no_speech() {
        let validator = AudioQuality::new(0.5, 60.0);
        let err = validator.validate(&make_clip(0.1, 0.3)).unwrap_err();
        assert!(matches!(err, AudioError::TooShort { .. }), "{err}");
    }

    #[test]
    fn empty_clip_is_too_short() {
        let err = AudioQuality::default()
            .validate(&AudioClip::default())
            .unwrap_err();
        assert!(matches!(err, AudioError::TooShort { .. }));
    }

    #[test]
    fn too_long_rejected() {
        let validator = AudioQuality::new(0.5, 10.0);
        let err = validator.validate(&make_clip(11.0, 0.3)).unwrap_err();
        assert!(matches!(err, AudioError::TooLong { .. }), "{err}");
    }

    #[test]
    fn silent_audio_is_no_speech() {
        let err = AudioQuality::default()
            .validate(&make_clip(1.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, AudioError::TooQuiet { .. }), "{err}");
    }

    #[test]
    fn threshold_comes_from_config() {
        let config = AudioConfig {
            silence_threshold: 0.05,
            ..AudioConfig::default()
        };
        let validator = AudioQuality::from_config(&config);
        assert!(matches!(
            validator.validate(&make_clip(1.0, 0.04)).unwrap_err(),
            AudioError::TooQuiet { .. }
        ));
    }

    #[test]
    fn heavy_clipping_rejected() {
        let mut validator = AudioQuality::default();
        validator.clipping_max_pct = 5.0;
        let err = validator.validate(&make_clip(1.0, 1.0)).unwrap_err();
        assert!(matches!(err, AudioError::Clipping { .. }), "{err}");
    }

    #[test]
    fn minor_clipping_within_limit_passes() {
        let total = 16_000usize;
        let clipped_count = total * 5 / 100;
        let mut samples = vec![0.3_f32; total - clipped_count];
        samples.extend(vec![1.0_f32; clipped_count]);
        let clip = AudioClip::from_mono_16k(samples);
        assert!(AudioQuality::default().validate(&clip).is_ok());
    }

    #[test]
    fn error_display_is_informative() {
        let err = AudioError::TooShort {
            min_secs: 0.5,
            got_secs: 0.1,
        };
        let msg = err.to_string();
        assert!(msg.contains("0.10"), "message: {msg}");
        assert!(msg.contains("0.50"), "message: {msg}");
    }
}

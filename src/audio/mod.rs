//! Voice input: WAV loading, microphone capture, resampling, quality gate.
//!
//! # Pipeline
//!
//! ```text
//! WAV file ─load_wav─┐
//!                    ├─▶ stereo_to_mono → resample_to_16k → AudioClip → AudioQuality
//! Microphone ────────┘   (record_until, feature `mic`)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use qgis_plugin_generator::audio::{load_wav, AudioQuality};
//!
//! let clip = load_wav(Path::new("request.wav")).unwrap();
//! AudioQuality::default().validate(&clip).unwrap();
//! println!("{:.1}s of audio", clip.duration_secs());
//! ```

#[cfg(feature = "mic")]
pub mod capture;
pub mod quality;
pub mod resample;
pub mod wav;

#[cfg(feature = "mic")]
pub use capture::{record_until, AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use quality::{AudioError, AudioQuality};
pub use resample::{resample_to_16k, stereo_to_mono};
pub use wav::{decode_wav, load_wav, AudioClip, WavError, CLIP_SAMPLE_RATE};

//! Speech-to-text collaborator.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                 Transcriber (trait)                   │
//! │                                                       │
//! │   ┌────────────────┐        ┌─────────────────────┐   │
//! │   │ HttpTranscriber │        │ WhisperTranscriber  │   │
//! │   │ multipart WAV   │        │ whisper.cpp, feature│   │
//! │   │ /v1/audio/...   │        │ `whisper`           │   │
//! │   └───────┬────────┘        └──────────┬──────────┘   │
//! │           └──────────────┬─────────────┘              │
//! │                          ▼                            │
//! │              AudioClip (16 kHz mono) → text           │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use qgis_plugin_generator::audio::load_wav;
//! use qgis_plugin_generator::config::SttConfig;
//! use qgis_plugin_generator::stt::build_transcriber;
//!
//! # async fn example() {
//! let stt = build_transcriber(&SttConfig::default()).unwrap();
//! let clip = load_wav(Path::new("request.wav")).unwrap();
//! println!("{}", stt.transcribe(&clip).await.unwrap());
//! # }
//! ```

use std::sync::Arc;

use crate::config::{SttBackend, SttConfig};

pub mod engine;
pub mod http;
#[cfg(feature = "whisper")]
pub mod whisper;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{SttError, Transcriber};
pub use http::HttpTranscriber;
#[cfg(feature = "whisper")]
pub use whisper::WhisperTranscriber;

#[cfg(test)]
pub use engine::MockTranscriber;

/// Build the transcriber selected by `config.backend`.
pub fn build_transcriber(config: &SttConfig) -> Result<Arc<dyn Transcriber>, SttError> {
    match config.backend {
        SttBackend::Http => Ok(Arc::new(HttpTranscriber::from_config(config))),
        #[cfg(feature = "whisper")]
        SttBackend::Whisper => Ok(Arc::new(WhisperTranscriber::from_config(config)?)),
        #[cfg(not(feature = "whisper"))]
        SttBackend::Whisper => Err(SttError::BackendDisabled("whisper")),
    }
}

//! In-process whisper.cpp backend (cargo feature `whisper`).
//!
//! The model is loaded once; every call creates its own `WhisperState`, so
//! one transcriber can serve concurrent calls without locking.  Inference is
//! CPU-bound and runs on `spawn_blocking`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::AudioClip;
use crate::config::SttConfig;

use super::engine::{SttError, Transcriber};

pub struct WhisperTranscriber {
    ctx: Arc<WhisperContext>,
    language: Option<String>,
    n_threads: i32,
}

impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("language", &self.language)
            .field("n_threads", &self.n_threads)
            .finish_non_exhaustive()
    }
}

/// Physical parallelism capped at 8; whisper.cpp gains little beyond that.
fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

impl WhisperTranscriber {
    /// Load a GGML model from `model_path`.
    pub fn load(model_path: &Path, language: &str) -> Result<Self, SttError> {
        if !model_path.exists() {
            return Err(SttError::ModelNotFound(model_path.display().to_string()));
        }
        let path_str = model_path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                model_path.display()
            ))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SttError::ContextInit(e.to_string()))?;
        log::info!("stt: loaded whisper model {}", model_path.display());

        let language = match language.trim() {
            "" | "auto" => None,
            lang => Some(lang.to_string()),
        };

        Ok(Self {
            ctx: Arc::new(ctx),
            language,
            n_threads: optimal_threads(),
        })
    }

    pub fn from_config(config: &SttConfig) -> Result<Self, SttError> {
        Self::load(&config.resolved_model_path(), &config.language)
    }
}

fn run_inference(
    ctx: &WhisperContext,
    language: Option<&str>,
    n_threads: i32,
    audio: &[f32],
) -> Result<String, SttError> {
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_language(language);
    params.set_n_threads(n_threads);
    params.set_print_progress(false);
    params.set_print_realtime(false);

    let mut state = ctx
        .create_state()
        .map_err(|e| SttError::ContextInit(e.to_string()))?;
    state
        .full(params, audio)
        .map_err(|e| SttError::Transcription(e.to_string()))?;

    let n_segments = state
        .full_n_segments()
        .map_err(|e| SttError::Transcription(e.to_string()))?;

    let mut text = String::new();
    for i in 0..n_segments {
        let segment = state
            .full_get_segment_text(i)
            .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;
        text.push_str(&segment);
    }
    Ok(text.trim().to_string())
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, SttError> {
        let ctx = Arc::clone(&self.ctx);
        let language = self.language.clone();
        let n_threads = self.n_threads;
        let audio = clip.samples().to_vec();

        tokio::task::spawn_blocking(move || {
            run_inference(&ctx, language.as_deref(), n_threads, &audio)
        })
        .await
        .map_err(|e| SttError::Transcription(format!("inference task failed: {e}")))?
    }

    fn name(&self) -> &str {
        "whisper.cpp"
    }
}

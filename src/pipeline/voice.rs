//! Voice front door: audio clip → transcript → [`GenerationRequest`].
//!
//! ```text
//! AudioClip ─▶ AudioQuality ──silent / too short──▶ NoSpeech
//!                  │
//!                  ▼
//!            Transcriber ──blank text──▶ NoSpeech
//!                  │
//!                  ▼
//!         GenerationRequest ─▶ Request
//! ```
//!
//! A `NoSpeech` outcome means nothing was submitted; the orchestrator is
//! never invoked for it.

use thiserror::Error;

use crate::audio::{AudioClip, AudioError, AudioQuality};
use crate::stt::{SttError, Transcriber};

use super::error::ErrorKind;
use super::request::{GenerationRequest, PluginOptions, RequestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSpeechReason {
    /// The clip was shorter than the configured minimum.
    TooShort,
    /// The clip's peak amplitude never crossed the silence threshold.
    Silent,
    /// The transcriber heard nothing intelligible.
    EmptyTranscript,
}

impl NoSpeechReason {
    pub fn describe(&self) -> &'static str {
        match self {
            NoSpeechReason::TooShort => "recording too short",
            NoSpeechReason::Silent => "no sound above the silence threshold",
            NoSpeechReason::EmptyTranscript => "no text detected in the recording",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceOutcome {
    Request(GenerationRequest),
    NoSpeech(NoSpeechReason),
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("{}", describe_transcription_error(.0))]
    Transcription(#[from] SttError),

    #[error(transparent)]
    Request(#[from] RequestError),
}

impl VoiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoiceError::Audio(_) | VoiceError::Request(_) => ErrorKind::InvalidRequest,
            VoiceError::Transcription(e) => e.kind(),
        }
    }
}

/// Appended when the transcription service could not be used.
pub const STT_SERVICE_HINT: &str = "verify that the transcription service is running";

fn describe_transcription_error(err: &SttError) -> String {
    if err.is_service_failure() {
        format!("{err}; {STT_SERVICE_HINT}")
    } else {
        err.to_string()
    }
}

/// What the transcriber heard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    Text(String),
    NoSpeech(NoSpeechReason),
}

/// Gate `clip` on quality, then transcribe it.
///
/// Clipping is logged and tolerated; a clip that is too long is an error.
pub async fn transcribe_clip(
    transcriber: &dyn Transcriber,
    clip: &AudioClip,
    quality: &AudioQuality,
) -> Result<Transcript, VoiceError> {
    match quality.validate(clip) {
        Ok(()) => {}
        Err(AudioError::TooShort { .. }) => {
            log::info!("voice: clip too short ({:.2}s)", clip.duration_secs());
            return Ok(Transcript::NoSpeech(NoSpeechReason::TooShort));
        }
        Err(AudioError::TooQuiet { amplitude, .. }) => {
            log::info!("voice: clip is silent (peak {amplitude:.4})");
            return Ok(Transcript::NoSpeech(NoSpeechReason::Silent));
        }
        Err(e @ AudioError::Clipping { .. }) => {
            log::warn!("voice: {e}; transcribing anyway");
        }
        Err(e) => return Err(e.into()),
    }

    log::info!(
        "voice: transcribing {:.1}s with {}",
        clip.duration_secs(),
        transcriber.name()
    );
    let text = transcriber.transcribe(clip).await?;
    let text = text.trim();
    if text.is_empty() {
        log::info!("voice: transcription is empty");
        return Ok(Transcript::NoSpeech(NoSpeechReason::EmptyTranscript));
    }
    Ok(Transcript::Text(text.to_string()))
}

/// Full voice front door: quality gate, transcription and request
/// construction.
pub async fn request_from_voice(
    transcriber: &dyn Transcriber,
    clip: &AudioClip,
    plugin_name: &str,
    options: PluginOptions,
    quality: &AudioQuality,
) -> Result<VoiceOutcome, VoiceError> {
    match transcribe_clip(transcriber, clip, quality).await? {
        Transcript::Text(text) => {
            let request = GenerationRequest::new(text, plugin_name, options)?;
            if request.is_terse() {
                log::warn!(
                    "voice: transcript is short ({:?}); the plan may be generic",
                    request.description()
                );
            }
            Ok(VoiceOutcome::Request(request))
        }
        Transcript::NoSpeech(reason) => Ok(VoiceOutcome::NoSpeech(reason)),
    }
}

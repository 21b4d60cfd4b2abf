//! HTTP backend: multipart POST to an OpenAI-compatible
//! `/v1/audio/transcriptions` endpoint (faster-whisper-server, LocalAI,
//! llama-server, OpenAI).

use async_trait::async_trait;

use crate::audio::AudioClip;
use crate::config::SttConfig;

use super::engine::{SttError, Transcriber};

pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
    model: String,
    language: Option<String>,
}

impl HttpTranscriber {
    pub fn from_config(config: &SttConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let url = config.base_url.trim_end_matches('/').to_string();
        log::info!("stt: HTTP endpoint {url}");

        let language = match config.language.trim() {
            "" | "auto" => None,
            lang => Some(lang.to_string()),
        };

        Self {
            client,
            url,
            model: config.model.clone(),
            language,
        }
    }

    fn form(&self, wav: Vec<u8>) -> Result<reqwest::multipart::Form, SttError> {
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("request.wav")
            .mime_str("audio/wav")
            .map_err(|e| SttError::UnsupportedAudio(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(lang) = &self.language {
            form = form.text("language", lang.clone());
        }
        Ok(form)
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, SttError> {
        let wav = clip
            .to_wav_bytes()
            .map_err(|e| SttError::UnsupportedAudio(e.to_string()))?;
        let form = self.form(wav)?;

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SttError::Parse(e.to_string()))?;
        let text = json["text"]
            .as_str()
            .ok_or_else(|| SttError::Parse("response has no \"text\" field".into()))?
            .trim()
            .to_string();

        log::debug!("stt: transcription {text:?}");
        Ok(text)
    }

    async fn health(&self) -> Result<(), SttError> {
        // Any HTTP answer proves the service is listening; not every server
        // implements /health.
        self.client
            .get(format!("{}/health", self.url))
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "HTTP"
    }
}

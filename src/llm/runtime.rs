//! Core `LlmRuntime` trait and the `HttpRuntime` implementation.
//!
//! `HttpRuntime` speaks either the Ollama native chat API (`/api/chat`) or
//! any OpenAI-compatible `/v1/chat/completions` endpoint.  All connection
//! details come from [`LlmConfig`]; nothing is hardcoded.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{LlmConfig, LlmProvider};

/// Longest error body kept in [`LlmError::Status`].
const MAX_ERROR_BODY: usize = 300;

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors that can occur while asking the runtime for one completion.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport or connection error (runtime not running, DNS, reset).
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("LLM request timed out")]
    Timeout,

    /// The runtime answered with a non-success status (unknown model,
    /// overloaded server, bad key).
    #[error("LLM runtime returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// The LLM returned a response with no usable text content.
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    /// `true` when the runtime could not be used at all, as opposed to
    /// answering with unusable content.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            LlmError::Request(_) | LlmError::Timeout | LlmError::Status { .. }
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::Parse(e.to_string())
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// LlmRuntime trait
// ---------------------------------------------------------------------------

/// One stateless text completion: role instructions in, generated text out.
///
/// Implementors must be `Send + Sync` so a single runtime can be shared by
/// every stage of every run (`Arc<dyn LlmRuntime>`).  Each call is
/// independent; no conversation state is kept between calls.
#[async_trait]
pub trait LlmRuntime: Send + Sync {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String, LlmError>;

    /// Reachability check used by `check`.  Defaults to "reachable".
    async fn health(&self) -> Result<(), LlmError> {
        Ok(())
    }

    /// Model identifier, for logs.
    fn model(&self) -> &str;
}

// ---------------------------------------------------------------------------
// HttpRuntime
// ---------------------------------------------------------------------------

/// Calls a local or remote LLM runtime over HTTP.
///
/// # No hardcoded URLs
/// All connection details (`provider`, `base_url`, `api_key`, `model`) come
/// exclusively from the [`LlmConfig`] passed to [`HttpRuntime::from_config`].
pub struct HttpRuntime {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpRuntime {
    /// Build an `HttpRuntime` from application config.
    ///
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.timeout_secs`.  A default client is used if the builder
    /// fails.
    pub fn from_config(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request_body(&self, instructions: &str, input: &str) -> serde_json::Value {
        let messages = serde_json::json!([
            { "role": "system", "content": instructions },
            { "role": "user",   "content": input        }
        ]);

        match self.config.provider {
            LlmProvider::Ollama => {
                let mut options = serde_json::json!({ "temperature": self.config.temperature });
                if let Some(ctx) = self.config.context_window {
                    options["num_ctx"] = ctx.into();
                }
                if let Some(max) = self.config.max_tokens {
                    options["num_predict"] = max.into();
                }
                serde_json::json!({
                    "model":    self.config.model,
                    "messages": messages,
                    "stream":   false,
                    "options":  options
                })
            }
            LlmProvider::OpenAiCompatible => {
                let mut body = serde_json::json!({
                    "model":       self.config.model,
                    "messages":    messages,
                    "stream":      false,
                    "temperature": self.config.temperature
                });
                if let Some(max) = self.config.max_tokens {
                    body["max_tokens"] = max.into();
                }
                body
            }
        }
    }

    /// Attach `Authorization: Bearer …` only when a non-empty key is set.
    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.config.api_key.as_deref().unwrap_or("");
        if key.is_empty() {
            req
        } else {
            req.bearer_auth(key)
        }
    }
}

/// Turn a non-2xx response into [`LlmError::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(LlmError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Pull the generated text out of a chat response for either wire format.
fn extract_content(provider: LlmProvider, json: &serde_json::Value) -> Result<String, LlmError> {
    let content = match provider {
        LlmProvider::Ollama => json["message"]["content"].as_str(),
        LlmProvider::OpenAiCompatible => json["choices"][0]["message"]["content"].as_str(),
    };

    let text = content.ok_or(LlmError::EmptyResponse)?.trim().to_string();
    if text.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl LlmRuntime for HttpRuntime {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String, LlmError> {
        let path = match self.config.provider {
            LlmProvider::Ollama => "/api/chat",
            LlmProvider::OpenAiCompatible => "/v1/chat/completions",
        };
        let url = self.endpoint(path);
        let body = self.request_body(instructions, input);

        log::debug!(
            "llm: POST {url} model={} ({} + {} chars)",
            self.config.model,
            instructions.len(),
            input.len()
        );

        let response = self.authorize(self.client.post(&url).json(&body)).send().await?;
        let response = check_status(response).await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        extract_content(self.config.provider, &json)
    }

    async fn health(&self) -> Result<(), LlmError> {
        let path = match self.config.provider {
            LlmProvider::Ollama => "/api/tags",
            LlmProvider::OpenAiCompatible => "/v1/models",
        };
        let response = self
            .authorize(self.client.get(self.endpoint(path)))
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

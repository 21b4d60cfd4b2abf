//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to the
//! orchestrator at construction time.  Missing keys fall back to their
//! defaults, so a hand-edited `settings.toml` only needs the values it
//! changes.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// LlmProvider
// ---------------------------------------------------------------------------

/// Wire protocol spoken by the LLM runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    /// Ollama native chat API (`POST /api/chat`), no authentication.
    #[default]
    Ollama,
    /// Any OpenAI-compatible REST API (`POST /v1/chat/completions`):
    /// LM Studio, vLLM, llama-server, OpenAI, Groq …
    OpenAiCompatible,
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Settings for the LLM runtime shared by every pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which wire protocol to use.
    pub provider: LlmProvider,
    /// Base URL of the API endpoint (no trailing path).
    pub base_url: String,
    /// API key, only sent when non-empty.
    pub api_key: Option<String>,
    /// Model identifier sent with every request (e.g. `"llama3:8b"`).
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Upper bound on generated tokens per stage; `None` lets the runtime decide.
    pub max_tokens: Option<u32>,
    /// Ollama `num_ctx`; `None` keeps the model default.
    pub context_window: Option<u32>,
    /// Seconds to wait for one stage response.  Local models on CPU can
    /// take several minutes for the Developer stage.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: "http://localhost:11434".into(),
            api_key: None,
            model: "llama3:8b".into(),
            temperature: 0.2,
            max_tokens: None,
            context_window: Some(8192),
            timeout_secs: 600,
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Where speech is turned into text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SttBackend {
    /// OpenAI-compatible `/v1/audio/transcriptions` service
    /// (faster-whisper-server, LocalAI, llama-server …).
    #[default]
    Http,
    /// In-process whisper.cpp; requires the `whisper` cargo feature.
    Whisper,
}

/// Settings for the transcription collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub backend: SttBackend,
    /// Base URL of the HTTP transcription service.
    pub base_url: String,
    /// Model name sent to the HTTP service (e.g. `"base"`, `"whisper-1"`).
    pub model: String,
    /// ISO-639-1 code, or `"auto"` for language detection.
    pub language: String,
    /// GGML model file for the in-process backend.  `None` resolves to
    /// `<models_dir>/ggml-<model>.bin`.
    pub model_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend: SttBackend::default(),
            base_url: "http://localhost:8000".into(),
            model: "base".into(),
            language: "auto".into(),
            model_path: None,
            timeout_secs: 120,
        }
    }
}

impl SttConfig {
    /// Resolved GGML model path for the in-process backend.
    pub fn resolved_model_path(&self) -> PathBuf {
        self.model_path.clone().unwrap_or_else(|| {
            AppPaths::new()
                .models_dir
                .join(format!("ggml-{}.bin", self.model))
        })
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for voice capture and the pre-transcription quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Target sample rate in Hz handed to the transcriber (must be 16 000).
    pub sample_rate: u32,
    /// Minimum recording length in seconds before transcription is attempted.
    pub min_recording_secs: f32,
    /// Maximum recording length in seconds.
    pub max_recording_secs: f32,
    /// Peak amplitude under which a clip counts as silence.
    pub silence_threshold: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            min_recording_secs: 0.5,
            max_recording_secs: 300.0,
            silence_threshold: 0.01,
        }
    }
}

// ---------------------------------------------------------------------------
// OutputConfig
// ---------------------------------------------------------------------------

/// What happens when `<name>.zip` already exists in the output directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionPolicy {
    /// Atomically replace the previous archive.
    #[default]
    Overwrite,
    /// Refuse to write and fail the run.
    Fail,
}

/// Where generated archives land.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory; `None` uses [`AppPaths::output_dir`].
    pub dir: Option<PathBuf>,
    pub on_existing: CollisionPolicy,
}

impl OutputConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().output_dir)
    }
}

// ---------------------------------------------------------------------------
// PluginDefaults
// ---------------------------------------------------------------------------

/// Broad category of the generated plugin, used to steer the Analyst.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginKind {
    #[default]
    DataProcessing,
    Analysis,
    ImportExport,
    Visualization,
    Utility,
}

impl PluginKind {
    pub const ALL: [PluginKind; 5] = [
        PluginKind::DataProcessing,
        PluginKind::Analysis,
        PluginKind::ImportExport,
        PluginKind::Visualization,
        PluginKind::Utility,
    ];

    /// Human-readable label used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            PluginKind::DataProcessing => "data processing",
            PluginKind::Analysis => "analysis tool",
            PluginKind::ImportExport => "importer/exporter",
            PluginKind::Visualization => "visualization",
            PluginKind::Utility => "general utility",
        }
    }

    /// Parse a CLI-style name (`"analysis"`, `"import-export"` …).
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "dataprocessing" | "processing" => Some(PluginKind::DataProcessing),
            "analysis" => Some(PluginKind::Analysis),
            "importexport" | "io" => Some(PluginKind::ImportExport),
            "visualization" | "visualisation" => Some(PluginKind::Visualization),
            "utility" => Some(PluginKind::Utility),
            _ => None,
        }
    }
}

/// Default manifest metadata and UI toggles applied to every request unless
/// overridden on the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginDefaults {
    pub version: String,
    pub author: String,
    pub email: String,
    /// Written to `qgisMinimumVersion` in `metadata.txt`.
    pub qgis_minimum_version: String,
    pub kind: PluginKind,
    pub add_menu: bool,
    pub add_toolbar: bool,
    pub add_dialog: bool,
}

impl Default for PluginDefaults {
    fn default() -> Self {
        Self {
            version: "1.0.0".into(),
            author: "Unknown Author".into(),
            email: "author@example.com".into(),
            qgis_minimum_version: "3.0".into(),
            kind: PluginKind::default(),
            add_menu: true,
            add_toolbar: true,
            add_dialog: false,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Append log lines to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use qgis_plugin_generator::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// LLM runtime settings.
    pub llm: LlmConfig,
    /// Transcription settings.
    pub stt: SttConfig,
    /// Voice capture / quality gate settings.
    pub audio: AudioConfig,
    /// Archive destination and collision policy.
    pub output: OutputConfig,
    /// Default plugin metadata.
    pub plugin: PluginDefaults,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

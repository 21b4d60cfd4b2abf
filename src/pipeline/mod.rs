//! Generation pipeline: request in, installable plugin archive out.
//!
//! # Architecture
//!
//! ```text
//!  typed text ───────────────┐
//!                            ▼
//!  voice ─▶ request_from_voice ─▶ GenerationRequest
//!                                        │
//!                                        ▼
//!                     Orchestrator::spawn / Orchestrator::run   ← tokio task
//!                                        │
//!         ┌──────────────────────────────┼──────────────────────────────┐
//!         ▼                              ▼                              ▼
//!   Analyst (plan)  ──▶  Developer (file blocks)  ──▶  Reviewer (file blocks)
//!                                                                       │
//!                                                                       ▼
//!                                                  PluginPackager ─▶ <name>.zip
//!
//!  ProgressEvent (mpsc, read-only for the caller) ◀── every transition
//!  CancelToken ──▶ checked between stages, raced against each LLM call
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use qgis_plugin_generator::config::AppConfig;
//! use qgis_plugin_generator::llm::HttpRuntime;
//! use qgis_plugin_generator::package::PluginPackager;
//! use qgis_plugin_generator::pipeline::{GenerationRequest, Orchestrator, PluginOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let orchestrator = Arc::new(Orchestrator::new(
//!         Arc::new(HttpRuntime::from_config(&config.llm)),
//!         PluginPackager::from_config(&config.output),
//!     ));
//!
//!     let request = GenerationRequest::new(
//!         "add a toolbar button that computes polygon areas",
//!         "AreaCalc",
//!         PluginOptions::from(&config.plugin),
//!     )
//!     .unwrap();
//!
//!     let mut handle = orchestrator.spawn(request);
//!     while let Some(event) = handle.next_event().await {
//!         println!("{event:?}");
//!     }
//!     println!("{}", handle.wait().await.unwrap().archive.display());
//! }
//! ```

pub mod cancel;
pub mod error;
pub mod request;
pub mod runner;
pub mod stage;
pub mod state;
pub mod voice;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use cancel::CancelToken;
pub use error::{ErrorKind, PipelineError};
pub use request::{GenerationRequest, PluginOptions, RequestError, TERSE_DESCRIPTION_CHARS};
pub use runner::{Orchestrator, ProgressEvent, ProgressSender, RunHandle, RunReport};
pub use stage::{Role, Stage, StageOutput};
pub use state::PipelineState;
pub use voice::{
    request_from_voice, transcribe_clip, NoSpeechReason, Transcript, VoiceError, VoiceOutcome,
};

//! LLM collaborator for the generation pipeline.
//!
//! This module provides:
//! * [`LlmRuntime`] — async trait: one stateless completion per call.
//! * [`HttpRuntime`] — Ollama native / OpenAI-compatible HTTP backend.
//! * [`PromptBuilder`] — role instructions for Analyst, Developer, Reviewer.
//! * [`LlmError`] — error variants for LLM operations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use qgis_plugin_generator::config::AppConfig;
//! use qgis_plugin_generator::llm::{HttpRuntime, LlmRuntime};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let runtime = HttpRuntime::from_config(&config.llm);
//!
//!     let plan = runtime
//!         .complete("You are a QGIS analyst.", "buffer every layer by 10 m")
//!         .await
//!         .unwrap();
//!     println!("{plan}");
//! }
//! ```

pub mod prompt;
pub mod runtime;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use prompt::PromptBuilder;
pub use runtime::{HttpRuntime, LlmError, LlmRuntime};

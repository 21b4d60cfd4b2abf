//! QGIS plugin generator.
//!
//! Turns a natural-language description (typed, or transcribed from voice)
//! into an installable QGIS plugin archive by running a fixed chain of
//! LLM-backed roles:
//!
//! ```text
//! description ──▶ Analyst ──▶ Developer ──▶ Reviewer ──▶ Packager ──▶ <name>.zip
//! ```
//!
//! The LLM runtime and the transcription service are external collaborators
//! reached through the narrow [`llm::LlmRuntime`] and [`stt::Transcriber`]
//! traits; this crate owns the sequencing, the file-block grammar, the
//! validation boundary and the archive format.

pub mod audio;
pub mod config;
pub mod history;
pub mod llm;
pub mod package;
pub mod pipeline;
pub mod stt;

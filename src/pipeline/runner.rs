//! Pipeline orchestrator: drives Analyst → Developer → Reviewer → Packager.
//!
//! [`Orchestrator`] owns the shared [`LlmRuntime`] and the
//! [`PluginPackager`].  Each run owns its [`GenerationRequest`] and every
//! intermediate output exclusively; nothing is shared between runs except
//! the packager's write lock.
//!
//! # Pipeline flow
//!
//! ```text
//! GenerationRequest
//!   └─▶ runtime.complete(Analyst)    [Analyzing]   plan text
//!   └─▶ runtime.complete(Developer)  [Developing]  draft file blocks (parse-checked)
//!   └─▶ runtime.complete(Reviewer)   [Reviewing]   final file blocks → PluginFileSet
//!   └─▶ spawn_blocking(package)      [Packaging]   <output_dir>/<name>.zip
//!                                    [Done]
//! any error ─▶ [Failed(stage)], no archive written
//! ```
//!
//! Progress is reported over an unbounded `tokio::sync::mpsc` channel the
//! caller only reads from.  Every LLM call is raced against the run's
//! [`CancelToken`]; a cancelled call's future is dropped and its result is
//! never consumed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::llm::{LlmRuntime, PromptBuilder};
use crate::package::{parse_blocks, PluginFileSet, PluginPackager};

use super::cancel::CancelToken;
use super::error::{ErrorKind, PipelineError};
use super::request::GenerationRequest;
use super::stage::{Role, Stage, StageOutput};
use super::state::PipelineState;

// ---------------------------------------------------------------------------
// ProgressEvent
// ---------------------------------------------------------------------------

/// One-directional notifications from a run to its observer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StateChanged(PipelineState),
    StageCompleted { stage: Stage, chars: usize },
    ArchiveWritten { path: PathBuf },
    Failed { kind: ErrorKind, message: String },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub request: GenerationRequest,
    pub stages: Vec<StageOutput>,
    pub files: PluginFileSet,
    pub archive: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn output(&self, role: Role) -> Option<&StageOutput> {
        self.stages.iter().find(|s| s.role == role)
    }

    /// Human-readable record of the run: request, archive, file list and
    /// every stage's raw output.
    pub fn render_transcript(&self) -> String {
        let options = self.request.options();
        let mut out = String::with_capacity(4096);

        out.push_str("QGIS plugin generation report\n");
        out.push_str("=============================\n\n");
        out.push_str(&format!("Plugin:     {}\n", self.request.plugin_name()));
        out.push_str(&format!("Version:    {}\n", options.version));
        out.push_str(&format!("Author:     {}\n", options.author));
        out.push_str(&format!("Type:       {}\n", options.kind.label()));
        out.push_str(&format!(
            "Started:    {}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!(
            "Finished:   {}\n",
            self.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!("Archive:    {}\n\n", self.archive.display()));

        out.push_str("Request:\n");
        out.push_str(self.request.description());
        out.push_str("\n\nFiles:\n");
        for (path, content) in self.files.iter() {
            out.push_str(&format!("  - {path} ({} bytes)\n", content.len()));
        }

        for stage in &self.stages {
            out.push_str(&format!(
                "\n----- {} ({}) -----\n",
                stage.role.title(),
                stage.produced_at.format("%H:%M:%S")
            ));
            out.push_str(&stage.content);
            out.push('\n');
        }
        out
    }

    pub fn save_transcript(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.render_transcript())
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences the three LLM roles and the packager for one request at a time.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use qgis_plugin_generator::config::AppConfig;
/// use qgis_plugin_generator::llm::HttpRuntime;
/// use qgis_plugin_generator::package::PluginPackager;
/// use qgis_plugin_generator::pipeline::{GenerationRequest, Orchestrator, PluginOptions};
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let orchestrator = Arc::new(Orchestrator::new(
///     Arc::new(HttpRuntime::from_config(&config.llm)),
///     PluginPackager::from_config(&config.output),
/// ));
///
/// let request = GenerationRequest::new(
///     "compute the area of every polygon",
///     "AreaCalc",
///     PluginOptions::default(),
/// )
/// .unwrap();
///
/// let mut handle = orchestrator.spawn(request);
/// while let Some(event) = handle.next_event().await {
///     println!("{event:?}");
/// }
/// let report = handle.wait().await.unwrap();
/// println!("{}", report.archive.display());
/// # }
/// ```
pub struct Orchestrator {
    runtime: Arc<dyn LlmRuntime>,
    packager: PluginPackager,
}

impl Orchestrator {
    pub fn new(runtime: Arc<dyn LlmRuntime>, packager: PluginPackager) -> Self {
        Self { runtime, packager }
    }

    pub fn packager(&self) -> &PluginPackager {
        &self.packager
    }

    /// Run the full chain for `request`.
    ///
    /// Emits a `StateChanged` for every transition (ending in `Done` or
    /// `Failed`) and a `Failed` event carrying the error kind on failure.
    /// A dropped progress receiver does not stop the run.
    pub async fn run(
        &self,
        request: GenerationRequest,
        progress: &ProgressSender,
        cancel: &CancelToken,
    ) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        let mut state = PipelineState::START;
        emit(progress, ProgressEvent::StateChanged(state));

        log::info!(
            "pipeline: starting run for {} with model {}",
            request.plugin_name(),
            self.runtime.model()
        );

        match self.run_chain(&request, &mut state, progress, cancel).await {
            Ok((stages, files, archive)) => {
                log::info!("pipeline: {} done → {}", request.plugin_name(), archive.display());
                Ok(RunReport {
                    request,
                    stages,
                    files,
                    archive,
                    started_at,
                    finished_at: Utc::now(),
                })
            }
            Err(err) => {
                state = state.fail();
                log::error!("pipeline: {} failed: {err}", request.plugin_name());
                emit(progress, ProgressEvent::StateChanged(state));
                emit(
                    progress,
                    ProgressEvent::Failed {
                        kind: err.kind(),
                        message: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Run the chain on a tokio task and return a handle to observe,
    /// cancel and await it.
    pub fn spawn(self: &Arc<Self>, request: GenerationRequest) -> RunHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelToken::new();

        let orchestrator = Arc::clone(self);
        let run_cancel = cancel.clone();
        let task = tokio::spawn(async move { orchestrator.run(request, &tx, &run_cancel).await });

        RunHandle {
            events: rx,
            cancel,
            task,
        }
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    async fn run_chain(
        &self,
        request: &GenerationRequest,
        state: &mut PipelineState,
        progress: &ProgressSender,
        cancel: &CancelToken,
    ) -> Result<(Vec<StageOutput>, PluginFileSet, PathBuf), PipelineError> {
        let prompts = PromptBuilder::new(request);
        let mut stages: Vec<StageOutput> = Vec::with_capacity(Role::CHAIN.len());
        let mut final_files = PluginFileSet::new();

        for role in Role::CHAIN {
            let stage = Stage::from(role);
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled { stage });
            }

            let previous = stages.last().map(|s| s.content.as_str());
            let (instructions, input) = prompts.build(role, previous);

            log::info!("pipeline: {stage} stage started");
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::warn!("pipeline: {stage} cancelled, dropping in-flight request");
                    return Err(PipelineError::Cancelled { stage });
                }
                result = self.runtime.complete(&instructions, &input) => result,
            };

            let text = result.map_err(|e| PipelineError::from_llm(stage, e))?;
            if text.trim().is_empty() {
                return Err(PipelineError::Malformed {
                    stage,
                    reason: "empty response".into(),
                });
            }

            if role.emits_files() {
                let files =
                    parse_blocks(&text).map_err(|e| PipelineError::from_parse(stage, e))?;
                log::debug!("pipeline: {stage} produced {} file blocks", files.len());
                final_files = files;
            }

            emit(
                progress,
                ProgressEvent::StageCompleted {
                    stage,
                    chars: text.chars().count(),
                },
            );
            stages.push(StageOutput::new(role, text));

            *state = state.advance();
            emit(progress, ProgressEvent::StateChanged(*state));
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: Stage::Packager,
            });
        }

        let packager = self.packager.clone();
        let name = request.plugin_name().to_string();
        let files = final_files.clone();
        let archive = tokio::task::spawn_blocking(move || packager.package(&files, &name))
            .await
            .map_err(|e| PipelineError::Internal(format!("packaging task failed: {e}")))?
            .map_err(PipelineError::from_archive)?;

        emit(
            progress,
            ProgressEvent::ArchiveWritten {
                path: archive.clone(),
            },
        );
        *state = state.advance();
        emit(progress, ProgressEvent::StateChanged(*state));

        Ok((stages, final_files, archive))
    }
}

fn emit(progress: &ProgressSender, event: ProgressEvent) {
    // Observer may have gone away; the run continues regardless.
    let _ = progress.send(event);
}

// ---------------------------------------------------------------------------
// RunHandle
// ---------------------------------------------------------------------------

/// Handle to a spawned run.
pub struct RunHandle {
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    cancel: CancelToken,
    task: tokio::task::JoinHandle<Result<RunReport, PipelineError>>,
}

impl RunHandle {
    /// Next progress event; `None` once the run has finished and every
    /// event has been read.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel("cancelled by user");
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the run to finish.  Unread progress events are discarded.
    pub async fn wait(self) -> Result<RunReport, PipelineError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Internal(format!("pipeline task failed: {e}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::CollisionPolicy;
    use crate::llm::LlmError;
    use crate::package::serialize_blocks;
    use crate::package::fileset::tests::minimal_set;
    use crate::pipeline::PluginOptions;

    /// Returns canned answers in order and records every input it saw.
    struct ScriptedRuntime {
        answers: Mutex<VecDeque<Result<String, LlmError>>>,
        inputs: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl ScriptedRuntime {
        fn new(answers: Vec<Result<String, LlmError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                inputs: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.inputs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmRuntime for ScriptedRuntime {
        async fn complete(&self, _instructions: &str, input: &str) -> Result<String, LlmError> {
            self.inputs.lock().unwrap().push(input.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            "add a toolbar button that computes polygon areas",
            "AreaCalc",
            PluginOptions::default(),
        )
        .unwrap()
    }

    fn happy_answers() -> Vec<Result<String, LlmError>> {
        let blocks = serialize_blocks(&minimal_set());
        vec![
            Ok("PLAN: use QgsDistanceArea on the active layer".into()),
            Ok(blocks.clone()),
            Ok(blocks),
        ]
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn happy_path_writes_archive_and_reports_states() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(ScriptedRuntime::new(happy_answers()));
        let orchestrator = Orchestrator::new(
            runtime.clone(),
            PluginPackager::new(dir.path(), CollisionPolicy::Overwrite),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = orchestrator
            .run(request(), &tx, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(report.archive, dir.path().join("AreaCalc.zip"));
        assert!(report.archive.exists());
        assert_eq!(report.stages.len(), 3);
        assert!(report.files.contains("metadata.txt"));
        assert_eq!(runtime.calls(), 3);

        let states: Vec<PipelineState> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                PipelineState::Analyzing,
                PipelineState::Developing,
                PipelineState::Reviewing,
                PipelineState::Packaging,
                PipelineState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn each_stage_receives_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(ScriptedRuntime::new(happy_answers()));
        let orchestrator = Orchestrator::new(
            runtime.clone(),
            PluginPackager::new(dir.path(), CollisionPolicy::Overwrite),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        orchestrator
            .run(request(), &tx, &CancelToken::new())
            .await
            .unwrap();

        let inputs = runtime.inputs.lock().unwrap().clone();
        assert!(inputs[0].contains("computes polygon areas"));
        assert!(inputs[1].contains("PLAN: use QgsDistanceArea"));
        assert!(inputs[2].contains("=== FILE: metadata.txt ==="));
    }

    #[tokio::test]
    async fn unparseable_developer_output_stops_before_reviewer() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(ScriptedRuntime::new(vec![
            Ok("plan".into()),
            Ok("Sure! Here is some code without any markers.".into()),
            Ok("never used".into()),
        ]));
        let orchestrator = Orchestrator::new(
            runtime.clone(),
            PluginPackager::new(dir.path(), CollisionPolicy::Overwrite),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = orchestrator
            .run(request(), &tx, &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenerationMalformed);
        assert_eq!(err.stage(), Some(Stage::Developer));
        assert_eq!(runtime.calls(), 2);

        let events = drain(&mut rx);
        assert!(events.contains(&ProgressEvent::StateChanged(PipelineState::Failed(
            Stage::Developer
        ))));
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Failed {
                kind: ErrorKind::GenerationMalformed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn invalid_final_set_is_validation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = minimal_set();
        files.insert(
            "__init__.py",
            crate::package::FileContent::Text("# nothing here\n".into()),
        );
        let bad = serialize_blocks(&files);
        let runtime = Arc::new(ScriptedRuntime::new(vec![
            Ok("plan".into()),
            Ok(serialize_blocks(&minimal_set())),
            Ok(bad),
        ]));
        let orchestrator = Orchestrator::new(
            runtime,
            PluginPackager::new(dir.path(), CollisionPolicy::Overwrite),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = orchestrator
            .run(request(), &tx, &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert_eq!(err.stage(), Some(Stage::Packager));
        assert!(!dir.path().join("AreaCalc.zip").exists());
    }

    #[tokio::test]
    async fn cancel_before_start_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(ScriptedRuntime::new(happy_answers()));
        let orchestrator = Orchestrator::new(
            runtime.clone(),
            PluginPackager::new(dir.path(), CollisionPolicy::Overwrite),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancelToken::new();
        cancel.cancel("test");

        let err = orchestrator.run(request(), &tx, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.stage(), Some(Stage::Analyst));
        assert_eq!(runtime.calls(), 0);
    }

    #[tokio::test]
    async fn spawned_run_can_be_cancelled_mid_stage() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(
            ScriptedRuntime::new(happy_answers()).slow(Duration::from_secs(30)),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            runtime,
            PluginPackager::new(dir.path(), CollisionPolicy::Overwrite),
        ));

        let mut handle = orchestrator.spawn(request());
        assert_eq!(
            handle.next_event().await,
            Some(ProgressEvent::StateChanged(PipelineState::Analyzing))
        );
        handle.cancel();

        let err = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("run stops promptly")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(!dir.path().join("AreaCalc.zip").exists());
    }

    #[tokio::test]
    async fn transcript_lists_stages_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(ScriptedRuntime::new(happy_answers())),
            PluginPackager::new(dir.path(), CollisionPolicy::Overwrite),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let report = orchestrator
            .run(request(), &tx, &CancelToken::new())
            .await
            .unwrap();

        let text = report.render_transcript();
        assert!(text.contains("Plugin:     AreaCalc"));
        assert!(text.contains("- metadata.txt"));
        assert!(text.contains("----- Requirements Analyst"));
        assert!(text.contains("----- Reviewer"));

        let path = dir.path().join("reports/AreaCalc.txt");
        report.save_transcript(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    }
}

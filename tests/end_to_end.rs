//! Full-chain runs against scripted collaborators, checked through the
//! archive they leave on disk.

use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;

use qgis_plugin_generator::audio::{AudioClip, AudioQuality};
use qgis_plugin_generator::config::CollisionPolicy;
use qgis_plugin_generator::llm::{LlmError, LlmRuntime};
use qgis_plugin_generator::package::{serialize_blocks, FileContent, PluginFileSet, PluginPackager};
use qgis_plugin_generator::pipeline::{
    request_from_voice, CancelToken, ErrorKind, GenerationRequest, NoSpeechReason, Orchestrator,
    PipelineState, PluginOptions, ProgressEvent, Role, Stage, VoiceOutcome,
};
use qgis_plugin_generator::stt::{SttError, Transcriber};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Answers each call with the next scripted reply.
struct ScriptedRuntime {
    answers: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedRuntime {
    fn new(answers: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicUsize::new(0),
            delay: None,
        })
    }

    fn slow(answers: Vec<Result<String, LlmError>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmRuntime for ScriptedRuntime {
    async fn complete(&self, _instructions: &str, _input: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
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

struct FixedTranscriber(&'static str);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _clip: &AudioClip) -> Result<String, SttError> {
        Ok(self.0.to_string())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const METADATA: &str = "[general]\n\
name=AreaCalc\n\
qgisMinimumVersion=3.0\n\
description=Computes the area of selected polygons\n\
version=1.0.0\n\
author=Jane GIS\n\
email=jane@example.com\n";

fn plugin_files(main_body: &str) -> PluginFileSet {
    let mut files = PluginFileSet::new();
    files.insert("metadata.txt", FileContent::Text(METADATA.into()));
    files.insert(
        "__init__.py",
        FileContent::Text(
            "def classFactory(iface):\n    from .area_calc import AreaCalc\n    return AreaCalc(iface)\n"
                .into(),
        ),
    );
    files.insert("area_calc.py", FileContent::Text(main_body.into()));
    files.insert("icon.png", FileContent::Binary(vec![0x89, b'P', b'N', b'G', 0, 1]));
    files
}

fn draft() -> String {
    format!(
        "Here is the plugin.\n\n{}",
        serialize_blocks(&plugin_files("class AreaCalc:\n    pass\n"))
    )
}

fn reviewed() -> String {
    serialize_blocks(&plugin_files(
        "class AreaCalc:\n    def __init__(self, iface):\n        self.iface = iface\n",
    ))
}

fn area_request() -> GenerationRequest {
    GenerationRequest::new(
        "add a toolbar button that computes polygon areas into a new attribute column",
        "AreaCalc",
        PluginOptions::default(),
    )
    .unwrap()
}

fn orchestrator(runtime: Arc<ScriptedRuntime>, out: &Path) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        runtime,
        PluginPackager::new(out, CollisionPolicy::Overwrite),
    ))
}

fn read_entry(archive: &Path, name: &str) -> Vec<u8> {
    let mut zip = zip::ZipArchive::new(std::fs::File::open(archive).unwrap()).unwrap();
    let mut entry = zip.by_name(name).unwrap();
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).unwrap();
    bytes
}

/// Voice front door as the CLI drives it: only a `Request` outcome is
/// handed to the orchestrator.
async fn submit_voice(
    orch: &Arc<Orchestrator>,
    transcriber: &dyn Transcriber,
    clip: &AudioClip,
) -> Result<PathBuf, NoSpeechReason> {
    let outcome = request_from_voice(
        transcriber,
        clip,
        "AreaCalc",
        PluginOptions::default(),
        &AudioQuality::default(),
    )
    .await
    .unwrap();

    match outcome {
        VoiceOutcome::Request(request) => Ok(orch.spawn(request).wait().await.unwrap().archive),
        VoiceOutcome::NoSpeech(reason) => Err(reason),
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn area_calc_end_to_end() {
    let out = tempdir().unwrap();
    let runtime = ScriptedRuntime::new(vec![
        Ok("1. Toolbar action\n2. Sum polygon areas\n3. Show result".into()),
        Ok(draft()),
        Ok(reviewed()),
    ]);
    let orch = orchestrator(Arc::clone(&runtime), out.path());

    let mut handle = orch.spawn(area_request());
    let mut states = Vec::new();
    while let Some(event) = handle.next_event().await {
        if let ProgressEvent::StateChanged(state) = event {
            states.push(state);
        }
    }
    let report = handle.wait().await.unwrap();

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
    assert_eq!(runtime.calls(), 3);
    assert_eq!(report.archive, out.path().join("AreaCalc.zip"));
    assert!(report.output(Role::Analyst).is_some());

    let manifest = String::from_utf8(read_entry(&report.archive, "AreaCalc/metadata.txt")).unwrap();
    assert!(manifest.contains("name=AreaCalc"));
    let init = String::from_utf8(read_entry(&report.archive, "AreaCalc/__init__.py")).unwrap();
    assert!(init.contains("classFactory(iface)"));
    // The reviewed version wins over the draft.
    let main = String::from_utf8(read_entry(&report.archive, "AreaCalc/area_calc.py")).unwrap();
    assert!(main.contains("self.iface = iface"));
    assert_eq!(
        read_entry(&report.archive, "AreaCalc/icon.png"),
        vec![0x89, b'P', b'N', b'G', 0, 1]
    );
}

#[tokio::test]
async fn empty_reviewer_response_writes_nothing() {
    let out = tempdir().unwrap();
    let runtime = ScriptedRuntime::new(vec![Ok("plan".into()), Ok(draft()), Ok("  \n".into())]);
    let orch = orchestrator(runtime, out.path());

    let err = orch
        .run(
            area_request(),
            &tokio::sync::mpsc::unbounded_channel().0,
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::GenerationMalformed);
    assert_eq!(err.stage(), Some(Stage::Reviewer));
    assert!(!out.path().join("AreaCalc.zip").exists());
}

#[tokio::test]
async fn unavailable_developer_stops_the_chain() {
    let out = tempdir().unwrap();
    let runtime = ScriptedRuntime::new(vec![
        Ok("plan".into()),
        Err(LlmError::Request("connection refused".into())),
        Ok(reviewed()),
    ]);
    let orch = orchestrator(Arc::clone(&runtime), out.path());

    let mut handle = orch.spawn(area_request());
    let mut failure = None;
    while let Some(event) = handle.next_event().await {
        if let ProgressEvent::Failed { kind, .. } = event {
            failure = Some(kind);
        }
    }
    let err = handle.wait().await.unwrap_err();

    assert_eq!(failure, Some(ErrorKind::CollaboratorUnavailable));
    assert_eq!(err.stage(), Some(Stage::Developer));
    assert_eq!(runtime.calls(), 2, "reviewer must not be called");
    assert!(!out.path().join("AreaCalc.zip").exists());
}

#[tokio::test]
async fn empty_transcript_never_reaches_the_orchestrator() {
    let out = tempdir().unwrap();
    let runtime = ScriptedRuntime::new(vec![Ok("plan".into()), Ok(draft()), Ok(reviewed())]);
    let orch = orchestrator(Arc::clone(&runtime), out.path());
    let speech = AudioClip::from_mono_16k(vec![0.25; 32_000]);

    let outcome = submit_voice(&orch, &FixedTranscriber(""), &speech).await;

    assert_eq!(
        outcome,
        Err(NoSpeechReason::EmptyTranscript),
        "nothing should have been submitted"
    );
    assert_eq!(runtime.calls(), 0);
    assert!(!out.path().join("AreaCalc.zip").exists());
}

#[tokio::test]
async fn silent_clip_never_reaches_the_orchestrator() {
    let out = tempdir().unwrap();
    let runtime = ScriptedRuntime::new(vec![Ok("plan".into()), Ok(draft()), Ok(reviewed())]);
    let orch = orchestrator(Arc::clone(&runtime), out.path());
    let silent = AudioClip::from_mono_16k(vec![0.0; 32_000]);

    let outcome = submit_voice(&orch, &FixedTranscriber("unused"), &silent).await;

    assert_eq!(outcome, Err(NoSpeechReason::Silent));
    assert_eq!(runtime.calls(), 0);
}

#[tokio::test]
async fn spoken_request_generates_a_plugin() {
    let out = tempdir().unwrap();
    let runtime = ScriptedRuntime::new(vec![Ok("plan".into()), Ok(draft()), Ok(reviewed())]);
    let orch = orchestrator(Arc::clone(&runtime), out.path());
    let speech = AudioClip::from_mono_16k(vec![0.25; 32_000]);

    let archive = submit_voice(
        &orch,
        &FixedTranscriber("compute the area of selected polygons"),
        &speech,
    )
    .await
    .unwrap();

    assert_eq!(runtime.calls(), 3);
    assert!(archive.exists());
}

#[tokio::test]
async fn cancel_during_analyst_leaves_no_archive() {
    let out = tempdir().unwrap();
    let runtime = ScriptedRuntime::slow(
        vec![Ok("plan".into()), Ok(draft()), Ok(reviewed())],
        Duration::from_secs(30),
    );
    let orch = orchestrator(Arc::clone(&runtime), out.path());

    let mut handle = orch.spawn(area_request());
    assert_eq!(
        handle.next_event().await,
        Some(ProgressEvent::StateChanged(PipelineState::Analyzing))
    );
    handle.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("cancellation should end the run promptly")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(runtime.calls(), 1);
    assert!(!out.path().join("AreaCalc.zip").exists());
}

#[tokio::test]
async fn fail_policy_keeps_existing_archive() {
    let out = tempdir().unwrap();
    let existing = out.path().join("AreaCalc.zip");
    std::fs::write(&existing, b"previous build").unwrap();

    let runtime = ScriptedRuntime::new(vec![Ok("plan".into()), Ok(draft()), Ok(reviewed())]);
    let orch = Arc::new(Orchestrator::new(
        runtime,
        PluginPackager::new(out.path(), CollisionPolicy::Fail),
    ));

    let err = orch.spawn(area_request()).wait().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PackagingIoFailure);
    assert_eq!(std::fs::read(&existing).unwrap(), b"previous build");
}

#[tokio::test]
async fn generated_archive_installs_into_plugins_dir() {
    let out = tempdir().unwrap();
    let plugins = tempdir().unwrap();
    let runtime = ScriptedRuntime::new(vec![Ok("plan".into()), Ok(draft()), Ok(reviewed())]);
    let report = orchestrator(runtime, out.path())
        .spawn(area_request())
        .wait()
        .await
        .unwrap();

    let installed = PluginPackager::install(&report.archive, plugins.path()).unwrap();
    assert_eq!(installed, plugins.path().join("AreaCalc"));
    assert!(installed.join("metadata.txt").is_file());
    assert!(installed.join("__init__.py").is_file());
}

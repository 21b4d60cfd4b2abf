//! Application entry point: `qgis-plugin-gen`.
//!
//! # Startup sequence
//!
//! 1. Parse the command line ([`Cli`]).
//! 2. Load [`AppConfig`] (defaults on first run).
//! 3. Initialise logging from `[logging]`; `RUST_LOG` overrides the level.
//! 4. Dispatch the subcommand.  `generate` and `voice` spawn the
//!    orchestrator on the tokio runtime and stream its progress events to
//!    stdout; Ctrl-C cancels the run through its handle.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use qgis_plugin_generator::{
    audio::{load_wav, AudioClip, AudioQuality},
    config::{AppConfig, AppPaths, CollisionPolicy, PluginKind},
    history::{record_generation, History, HistoryEntry},
    llm::{HttpRuntime, LlmRuntime},
    package::{is_valid_plugin_name, PluginPackager},
    pipeline::{
        request_from_voice, transcribe_clip, GenerationRequest, Orchestrator, PluginOptions,
        ProgressEvent, RequestError, RunReport, Transcript, VoiceOutcome,
    },
    stt::build_transcriber,
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(
    name = "qgis-plugin-gen",
    version,
    about = "Generate installable QGIS plugins from a plain-language description"
)]
struct Cli {
    /// Settings file to use instead of the platform default.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a plugin from a typed description.
    Generate {
        #[arg(long)]
        name: String,
        #[arg(long, conflicts_with = "from_file")]
        description: Option<String>,
        /// Read the description from a text file.
        #[arg(long, value_name = "PATH")]
        from_file: Option<PathBuf>,
        #[command(flatten)]
        plugin: PluginArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Transcribe a spoken description, then generate the plugin.
    Voice {
        #[arg(long)]
        name: String,
        #[command(flatten)]
        audio: AudioArgs,
        #[command(flatten)]
        plugin: PluginArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print the transcript of a recording without generating anything.
    Transcribe {
        #[command(flatten)]
        audio: AudioArgs,
    },
    /// Extract a generated archive into a QGIS plugins directory.
    Install {
        #[arg(long, value_name = "PATH")]
        archive: PathBuf,
        /// Defaults to the QGIS default profile's plugin directory.
        #[arg(long, value_name = "DIR")]
        plugins_dir: Option<PathBuf>,
    },
    /// List previously generated plugins.
    History {
        #[arg(long)]
        clear: bool,
    },
    /// Inspect or create the settings file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Check the LLM runtime and the transcription service.
    Check,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the settings file location.
    Path,
    /// Write the default settings file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Overrides for `[plugin]` defaults.
#[derive(Debug, Args)]
struct PluginArgs {
    #[arg(long)]
    version: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    email: Option<String>,
    /// processing, analysis, import-export, visualization or utility.
    #[arg(long)]
    kind: Option<String>,
    #[arg(long)]
    no_menu: bool,
    #[arg(long)]
    no_toolbar: bool,
    /// Ask for a dialog window.
    #[arg(long)]
    dialog: bool,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Directory for the generated archive.
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    /// Fail instead of replacing an existing archive.
    #[arg(long)]
    no_overwrite: bool,
    /// Write every stage's output to this file.
    #[arg(long, value_name = "PATH")]
    save_report: Option<PathBuf>,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct AudioArgs {
    /// Read the recording from a WAV file.
    #[arg(long, value_name = "PATH")]
    wav: Option<PathBuf>,
    /// Record from the microphone until Enter is pressed.
    #[arg(long)]
    record: bool,
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings_file = cli
        .config
        .clone()
        .unwrap_or_else(|| AppPaths::new().settings_file);

    let (config, config_error) = match AppConfig::load_from(&settings_file) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    init_logging(&config)?;
    if let Some(e) = config_error {
        log::warn!(
            "main: failed to load {} ({e:#}); using defaults",
            settings_file.display()
        );
    }
    log::debug!("main: qgis-plugin-gen v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Generate {
            name,
            description,
            from_file,
            plugin,
            run,
        } => {
            let description = match (description, from_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => bail!("pass --description or --from-file"),
            };
            let options = plugin_options(&config, &plugin)?;
            let request = GenerationRequest::new(description, name, options)?;
            if request.is_terse() {
                println!("warning: the description is very short; the result may be generic");
            }
            generate(&config, request, &run).await
        }
        Command::Voice {
            name,
            audio,
            plugin,
            run,
        } => {
            check_plugin_name(&name)?;
            let options = plugin_options(&config, &plugin)?;
            let clip = acquire_clip(&audio).await?;
            let transcriber = build_transcriber(&config.stt)?;
            let quality = AudioQuality::from_config(&config.audio);

            match request_from_voice(transcriber.as_ref(), &clip, &name, options, &quality)
                .await
                .map_err(|e| anyhow!("{e} [{}]", e.kind()))?
            {
                VoiceOutcome::Request(request) => {
                    println!("Heard: {}", request.description());
                    if request.is_terse() {
                        println!(
                            "warning: the description is very short; the result may be generic"
                        );
                    }
                    generate(&config, request, &run).await
                }
                VoiceOutcome::NoSpeech(reason) => {
                    println!("No speech detected ({}); nothing was generated.", reason.describe());
                    Ok(())
                }
            }
        }
        Command::Transcribe { audio } => {
            let clip = acquire_clip(&audio).await?;
            let transcriber = build_transcriber(&config.stt)?;
            let quality = AudioQuality::from_config(&config.audio);
            match transcribe_clip(transcriber.as_ref(), &clip, &quality)
                .await
                .map_err(|e| anyhow!("{e} [{}]", e.kind()))?
            {
                Transcript::Text(text) => println!("{text}"),
                Transcript::NoSpeech(reason) => {
                    println!("No speech detected ({}).", reason.describe())
                }
            }
            Ok(())
        }
        Command::Install {
            archive,
            plugins_dir,
        } => {
            let plugins_dir = plugins_dir.unwrap_or_else(|| AppPaths::new().qgis_plugins_dir);
            let installed = PluginPackager::install(&archive, &plugins_dir)?;
            println!("Installed to {}", installed.display());
            println!("Restart QGIS or reload plugins, then enable it in the Plugin Manager.");
            Ok(())
        }
        Command::History { clear } => {
            let mut history = History::load()?;
            if clear {
                history.clear();
                history.save()?;
                println!("History cleared.");
                return Ok(());
            }
            if history.entries().is_empty() {
                println!("No plugins generated yet.");
            }
            for entry in history.entries() {
                println!(
                    "{}  {} {}  {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.plugin_name,
                    entry.version,
                    entry.archive.display()
                );
                println!("    {}", first_line(&entry.description));
            }
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
            ConfigAction::Path => {
                println!("{}", settings_file.display());
                Ok(())
            }
            ConfigAction::Init { force } => {
                if settings_file.exists() && !force {
                    bail!(
                        "{} already exists; pass --force to overwrite",
                        settings_file.display()
                    );
                }
                AppConfig::default().save_to(&settings_file)?;
                println!("Wrote {}", settings_file.display());
                Ok(())
            }
        },
        Command::Check => check(&config).await,
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging(config: &AppConfig) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    );
    builder.format_timestamp_secs();

    if let Some(path) = &config.logging.file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

fn plugin_options(config: &AppConfig, args: &PluginArgs) -> Result<PluginOptions> {
    let mut options = PluginOptions::from(&config.plugin);
    if let Some(version) = &args.version {
        options.version = version.clone();
    }
    if let Some(author) = &args.author {
        options.author = author.clone();
    }
    if let Some(email) = &args.email {
        options.email = email.clone();
    }
    if let Some(kind) = &args.kind {
        options.kind = PluginKind::from_name(kind).ok_or_else(|| {
            anyhow!(
                "unknown plugin kind {kind:?} \
                 (expected processing, analysis, import-export, visualization or utility)"
            )
        })?;
    }
    if args.no_menu {
        options.add_menu = false;
    }
    if args.no_toolbar {
        options.add_toolbar = false;
    }
    if args.dialog {
        options.add_dialog = true;
    }
    Ok(options)
}

fn build_packager(config: &AppConfig, run: &RunArgs) -> PluginPackager {
    let dir = run
        .output
        .clone()
        .unwrap_or_else(|| config.output.resolved_dir());
    let policy = if run.no_overwrite {
        CollisionPolicy::Fail
    } else {
        config.output.on_existing
    };
    PluginPackager::new(dir, policy)
}

async fn generate(config: &AppConfig, request: GenerationRequest, run: &RunArgs) -> Result<()> {
    let runtime: Arc<dyn LlmRuntime> = Arc::new(HttpRuntime::from_config(&config.llm));
    let orchestrator = Arc::new(Orchestrator::new(runtime, build_packager(config, run)));

    log::info!(
        "main: generating {:?} with {}",
        request.plugin_name(),
        config.llm.model
    );
    let report = run_with_progress(&orchestrator, request).await?;

    println!("Plugin archive: {}", report.archive.display());
    println!(
        "Install it with: qgis-plugin-gen install --archive {}",
        report.archive.display()
    );

    if let Some(path) = &run.save_report {
        report
            .save_transcript(path)
            .with_context(|| format!("writing report {}", path.display()))?;
        println!("Report: {}", path.display());
    }

    record_generation(&AppPaths::new().history_file, HistoryEntry::from_report(&report));
    Ok(())
}

/// Drive a spawned run, printing each progress event.  The first Ctrl-C
/// cancels the run; the run still reports its own terminal state.
async fn run_with_progress(
    orchestrator: &Arc<Orchestrator>,
    request: GenerationRequest,
) -> Result<RunReport> {
    let mut handle = orchestrator.spawn(request);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                println!("Cancelling...");
                handle.cancel();
            }
        }
    }

    handle
        .wait()
        .await
        .map_err(|e| anyhow!("{e} [{}]", e.kind()))
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::StateChanged(state) => println!("==> {}", state.label()),
        ProgressEvent::StageCompleted { stage, chars } => {
            println!("    {stage} finished ({chars} chars)")
        }
        ProgressEvent::ArchiveWritten { path } => println!("    wrote {}", path.display()),
        ProgressEvent::Failed { kind, message } => println!("    {kind}: {message}"),
    }
    // stdout may be a pipe; keep progress lines timely.
    let _ = std::io::stdout().flush();
}

// ---------------------------------------------------------------------------
// Audio input
// ---------------------------------------------------------------------------

async fn acquire_clip(args: &AudioArgs) -> Result<AudioClip> {
    if let Some(path) = &args.wav {
        return Ok(load_wav(path)?);
    }
    record_clip().await
}

#[cfg(feature = "mic")]
async fn record_clip() -> Result<AudioClip> {
    use qgis_plugin_generator::audio::record_until;

    let clip = tokio::task::spawn_blocking(|| {
        record_until(|| {
            println!("Recording... press Enter to stop.");
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
        })
    })
    .await
    .context("recording task failed")??;
    Ok(clip)
}

#[cfg(not(feature = "mic"))]
async fn record_clip() -> Result<AudioClip> {
    bail!("this build has no microphone support (rebuild with --features mic), use --wav")
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

async fn check(config: &AppConfig) -> Result<()> {
    let runtime = HttpRuntime::from_config(&config.llm);
    match runtime.health().await {
        Ok(()) => println!("LLM runtime     {}  reachable ({})", config.llm.base_url, runtime.model()),
        Err(e) => println!("LLM runtime     {}  NOT reachable: {e}", config.llm.base_url),
    }

    match build_transcriber(&config.stt) {
        Ok(stt) => match stt.health().await {
            Ok(()) => println!("Transcription   {}  reachable", stt.name()),
            Err(e) => println!("Transcription   {}  NOT reachable: {e}", stt.name()),
        },
        Err(e) => println!("Transcription   unavailable: {e}"),
    }

    println!("Output dir      {}", config.output.resolved_dir().display());
    println!("QGIS plugins    {}", AppPaths::new().qgis_plugins_dir.display());
    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Reject a bad plugin name before any audio is recorded or transcribed.
fn check_plugin_name(name: &str) -> Result<(), RequestError> {
    let name = name.trim();
    if is_valid_plugin_name(name) {
        Ok(())
    } else {
        Err(RequestError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_plugin_name_checked_up_front() {
        assert!(check_plugin_name("AreaCalc").is_ok());
        assert!(check_plugin_name(" AreaCalc ").is_ok());
        assert_eq!(
            check_plugin_name("area-calc"),
            Err(RequestError::InvalidName("area-calc".into()))
        );
        assert!(check_plugin_name("").is_err());
    }

    #[test]
    fn first_line_of_empty_text_is_empty() {
        assert_eq!(first_line(""), "");
        assert_eq!(first_line("ok\nmore"), "ok");
    }
}

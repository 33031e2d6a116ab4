//! cloudup - Upload files and folders to cloud storage.
//!
//! Usage:
//!   cloudup upload <PATH>... --dest <REMOTE>   Upload files or folders
//!   cloudup check <NAME> --parent <REMOTE>     Check whether a folder exists
//!   cloudup config                             Show the effective configuration
//!   cloudup --help                             Show help

mod settings;

use std::io::Write;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, OptionExt, Result, bail};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use cloudup_api::HttpBackend;
use cloudup_core::{
    ConflictAction, ConflictDecision, PendingUpload, UploadConfig, UploadError, UploadPhase,
};
use cloudup_ops::{RunOutcome, StorageBackend, UploadEvent, UploadOrchestrator, join_remote_path};
use cloudup_scan::{DropScanner, FsOpener, IgnoreFilter, pick_files, pick_folder};

use crate::settings::Settings;

/// Exit code after an interrupted upload.
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "cloudup",
    version,
    about = "Upload files and folders to cloud storage",
    long_about = "cloudup uploads files and folder trees to a storage server.\n\n\
                  When an uploaded folder already exists at the destination you \
                  can merge into it, replace it, or upload under a new name."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Storage API base URL
    #[arg(long, global = true, env = "CLOUDUP_SERVER")]
    server: Option<String>,

    /// Bearer token for the storage API
    #[arg(long, global = true, env = "CLOUDUP_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload files or folders
    Upload {
        /// Files or directories to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Remote folder to upload into
        #[arg(short, long, default_value = "/")]
        dest: String,

        /// How the paths are interpreted
        #[arg(short, long, value_enum, default_value_t = Mode::Auto)]
        mode: Mode,

        /// Resolve a folder conflict without prompting (merge, replace, rename)
        #[arg(long, value_name = "ACTION")]
        on_conflict: Option<ConflictAction>,

        /// New folder name when resolving with rename
        #[arg(long, value_name = "NAME")]
        rename_to: Option<String>,

        /// Transfers per batch
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
    },

    /// Check whether a folder exists on the server
    Check {
        /// Folder name
        name: String,

        /// Remote parent folder
        #[arg(short, long, default_value = "/")]
        parent: String,
    },

    /// Show the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum Mode {
    /// Mixed files and directories, expanded like a drop
    #[default]
    Auto,
    /// Individual files, uploaded flat
    Files,
    /// A single directory, uploaded as one folder
    Folder,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (settings, config_path) = Settings::load(cli.config.as_deref())?;
    let mut settings = settings.with_overrides(cli.server, cli.token);

    match cli.command {
        Command::Upload {
            paths,
            dest,
            mode,
            on_conflict,
            rename_to,
            concurrency,
        } => {
            if let Some(concurrency) = concurrency {
                settings.upload.concurrency = concurrency;
            }
            settings.validate()?;

            let request = UploadCommand {
                paths,
                dest,
                mode,
                on_conflict,
                rename_to,
            };
            if !run_upload(&settings, request).await? {
                std::process::exit(EXIT_CANCELLED);
            }
        }
        Command::Check { name, parent } => {
            run_check(&settings, &name, &parent).await?;
        }
        Command::Config => {
            match &config_path {
                Some(path) if path.exists() => println!("# {}", path.display()),
                Some(path) => println!("# {} (not found, using defaults)", path.display()),
                None => println!("# no config directory, using defaults"),
            }
            print!("{}", settings.to_display_toml()?);
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if let Err(e) = subscriber.try_init() {
        eprintln!("Failed to init tracing subscriber: {e}");
    }
}

struct UploadCommand {
    paths: Vec<PathBuf>,
    dest: String,
    mode: Mode,
    on_conflict: Option<ConflictAction>,
    rename_to: Option<String>,
}

/// Run an upload. Returns `false` if it was cancelled.
async fn run_upload(settings: &Settings, command: UploadCommand) -> Result<bool> {
    let selection = select(&command.paths, command.mode, &settings.upload)?;
    if selection.is_empty() {
        bail!("Nothing to upload");
    }
    eprintln!(
        "Uploading {} file(s), {} to {}",
        selection.len(),
        format_size(selection.total_bytes()),
        command.dest
    );

    let backend = HttpBackend::new(&settings.client)?;
    let orchestrator = UploadOrchestrator::new(backend, settings.upload.clone());
    let mut prompt_events = orchestrator.subscribe();
    let display = spawn_progress_display(orchestrator.subscribe());

    let interrupt = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            let mut presses = 0;
            while tokio::signal::ctrl_c().await.is_ok() {
                presses += 1;
                match interrupt_action(presses) {
                    Interrupt::Cancel => {
                        eprintln!("\nCancelling... (press Ctrl-C again to quit)");
                        orchestrator.cancel();
                    }
                    Interrupt::Exit => std::process::exit(EXIT_CANCELLED),
                }
            }
        }
    });

    let mut outcome = orchestrator.submit(selection, command.dest.as_str()).await?;
    let result = loop {
        match outcome {
            RunOutcome::ConflictPending(decision) => {
                outcome = match command.on_conflict {
                    Some(action) => {
                        resolve_with(&orchestrator, action, command.rename_to.as_deref()).await?
                    }
                    None => {
                        resolve_interactively(&orchestrator, &decision, &command.dest, &mut prompt_events)
                            .await?
                    }
                };
            }
            RunOutcome::Completed(summary) => {
                println!("{}", summary.summary());
                break Ok(true);
            }
            RunOutcome::Cancelled => {
                eprintln!("Upload cancelled");
                break Ok(false);
            }
            RunOutcome::Failed { message } => {
                orchestrator.dismiss_error();
                break Err(color_eyre::eyre::eyre!("Upload failed: {message}"));
            }
        }
    };

    interrupt.abort();
    display.abort();
    result
}

/// What a Ctrl-C press does during an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Cancel the run and let it wind down.
    Cancel,
    /// Quit at once, even if a request is stuck.
    Exit,
}

fn interrupt_action(presses: usize) -> Interrupt {
    if presses <= 1 {
        Interrupt::Cancel
    } else {
        Interrupt::Exit
    }
}

/// Turn the command-line paths into a selection.
fn select(paths: &[PathBuf], mode: Mode, config: &UploadConfig) -> Result<PendingUpload> {
    let filter = IgnoreFilter::new(config.ignore_patterns.as_slice())?;

    let selection = match mode {
        Mode::Files => pick_files(paths)?,
        Mode::Folder => {
            let [root] = paths else {
                bail!("--mode folder takes exactly one directory");
            };
            pick_folder(root, &filter).with_context(|| format!("Failed to read {}", root.display()))?
        }
        Mode::Auto => {
            let scan = DropScanner::new(FsOpener::new(config.read_page_size))
                .with_filter(filter)
                .scan_paths(paths)?;
            for warning in &scan.warnings {
                tracing::warn!(path = %warning.path.display(), "{}", warning.message);
            }
            if !scan.warnings.is_empty() {
                eprintln!("{} path(s) could not be read and were skipped", scan.warnings.len());
            }
            if scan.skipped_empty > 0 {
                tracing::info!(count = scan.skipped_empty, "skipped empty files");
            }
            scan.selection
        }
    };

    Ok(selection)
}

/// Resolve a conflict from command-line flags.
async fn resolve_with(
    orchestrator: &UploadOrchestrator<HttpBackend>,
    action: ConflictAction,
    rename_to: Option<&str>,
) -> Result<RunOutcome> {
    let outcome = match action {
        ConflictAction::Rename => {
            let name = rename_to.ok_or_eyre("--rename-to is required with --on-conflict rename")?;
            orchestrator.rename(name).await?
        }
        ConflictAction::Merge | ConflictAction::Replace => orchestrator.resolve(action).await?,
    };
    Ok(outcome)
}

/// Ask on stdin how to resolve a conflict.
async fn resolve_interactively(
    orchestrator: &UploadOrchestrator<HttpBackend>,
    decision: &ConflictDecision,
    dest: &str,
    events: &mut broadcast::Receiver<UploadEvent>,
) -> Result<RunOutcome> {
    let question = format!(
        "\"{}\" already exists in {dest}. [m]erge, [r]eplace, re[n]ame or [c]ancel? ",
        decision.folder_name
    );

    loop {
        let Some(answer) = prompt(question.clone(), events).await? else {
            return Ok(RunOutcome::Cancelled);
        };

        match answer.to_ascii_lowercase().as_str() {
            "m" | "merge" => return Ok(orchestrator.resolve(ConflictAction::Merge).await?),
            "r" | "replace" => return Ok(orchestrator.resolve(ConflictAction::Replace).await?),
            "n" | "rename" => {
                orchestrator.request_rename()?;
                if let Some(outcome) = prompt_rename(orchestrator, events).await? {
                    return Ok(outcome);
                }
                orchestrator.back_to_choices()?;
            }
            "c" | "cancel" => {
                orchestrator.cancel();
                return Ok(RunOutcome::Cancelled);
            }
            _ => eprintln!("Please answer m, r, n or c"),
        }
    }
}

/// Ask for a new folder name until one is free. An empty answer goes back.
async fn prompt_rename(
    orchestrator: &UploadOrchestrator<HttpBackend>,
    events: &mut broadcast::Receiver<UploadEvent>,
) -> Result<Option<RunOutcome>> {
    loop {
        let Some(name) = prompt("New folder name (empty to go back): ".to_string(), events).await?
        else {
            return Ok(Some(RunOutcome::Cancelled));
        };
        if name.is_empty() {
            return Ok(None);
        }

        match orchestrator.rename(&name).await {
            Ok(outcome) => return Ok(Some(outcome)),
            Err(err @ (UploadError::RenameCollision { .. } | UploadError::InvalidFolderName { .. })) => {
                eprintln!("{err}");
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Read one trimmed line from stdin. `None` if the session was cancelled first.
async fn prompt(
    question: String,
    events: &mut broadcast::Receiver<UploadEvent>,
) -> Result<Option<String>> {
    let read = tokio::task::spawn_blocking(move || {
        let mut stderr = std::io::stderr();
        write!(stderr, "{question}")?;
        stderr.flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok::<_, std::io::Error>(line)
    });

    tokio::select! {
        line = read => {
            let line = line.context("Prompt task failed")??;
            Ok(Some(line.trim().to_string()))
        }
        _ = wait_for_cancel(events) => Ok(None),
    }
}

async fn wait_for_cancel(events: &mut broadcast::Receiver<UploadEvent>) {
    loop {
        match events.recv().await {
            Ok(UploadEvent::Cancelled { .. }) => return,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

/// Render session events on stderr.
fn spawn_progress_display(mut events: broadcast::Receiver<UploadEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut in_progress = false;
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };

            match event {
                UploadEvent::PhaseChanged(UploadPhase::Selecting) => {
                    eprintln!("Checking destination...");
                }
                UploadEvent::PhaseChanged(UploadPhase::Uploading { percent }) => {
                    in_progress = true;
                    draw_progress(percent);
                }
                UploadEvent::Progress { percent } => {
                    in_progress = true;
                    draw_progress(percent);
                }
                UploadEvent::Completed(_) | UploadEvent::Failed { .. } | UploadEvent::Cancelled { .. } => {
                    if in_progress {
                        eprintln!();
                        in_progress = false;
                    }
                }
                _ => {}
            }
        }
    })
}

fn draw_progress(percent: u8) {
    let bar = make_bar(f64::from(percent) / 100.0, 30);
    eprint!("\r {bar} {percent:>3}%");
    let _ = std::io::stderr().flush();
}

async fn run_check(settings: &Settings, name: &str, parent: &str) -> Result<()> {
    let backend = HttpBackend::new(&settings.client)?;
    let exists = backend
        .folder_exists(name, parent)
        .await
        .with_context(|| format!("Failed to query {}", backend.server_url()))?;

    let location = join_remote_path(parent, name);
    if exists {
        println!("{location} exists");
    } else {
        println!("{location} does not exist");
    }
    Ok(())
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

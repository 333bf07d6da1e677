//! subdub - subtitle and dubbing pipeline
//!
//! Runs the pipeline steps (audio extraction, transcription, translation,
//! subtitle burning, narration synthesis) either one at a time from the command
//! line, as a whole chain, or behind the HTTP API.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, Level};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use subdub::cli::{parse_languages, Args, Commands};
use subdub::config::Config;
use subdub::naming::{base_filename, ArtifactLayout};
use subdub::server;
use subdub::session::{Session, SessionStore};
use subdub::setup::SetupManager;
use subdub::subtitle::NarrationSource;
use subdub::workflow::Workflow;

const CONFIG_FILE: &str = "subdub.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.verbose)?;
    info!("Starting subdub");

    if let Commands::InitConfig { output } = &args.command {
        Config::default().save_to_file(output)?;
        println!("Wrote default configuration to {}", output.display());
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    let session_id = args
        .session
        .as_deref()
        .map(SessionStore::parse_id)
        .transpose()?;

    let setup_manager = SetupManager::new()?;
    let workflow = Workflow::new(config);

    match args.command {
        Commands::Serve { bind } => {
            setup_manager.initialize(&workflow).await?;
            let bind = bind.unwrap_or_else(|| workflow.config().server.bind_address.clone());
            server::serve(workflow, &bind).await?;
        }
        Commands::Extract { input } => {
            setup_manager.ensure_directories(workflow.config()).await?;
            let id = session_id.unwrap_or_else(Uuid::new_v4);
            let layout = workflow.layout_for(Some(&id));

            let file_name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = tokio::fs::read(&input).await?;

            let upload = workflow.store_upload(&layout, &file_name, &bytes).await?;
            let output = with_spinner(
                "Extracting audio",
                workflow.extract_audio(&layout, &upload.video_filename),
            )
            .await?;

            if workflow.config().storage.isolate_sessions {
                println!("Session: {} (pass --session {} to the later steps)", id, id);
            }
            print_json(&output)?;
        }
        Commands::Subtitles { video, model } => {
            let layout = workflow.step_layout(session_id.as_ref())?;
            let output = with_spinner(
                "Transcribing",
                workflow.generate_subtitles(&layout, &video, model.as_deref()),
            )
            .await?;
            print_json(&output)?;
        }
        Commands::Translate { video, lang, model } => {
            let layout = workflow.step_layout(session_id.as_ref())?;
            let output = with_spinner(
                "Translating",
                workflow.translate_subtitles(&layout, &video, &lang, model.as_deref()),
            )
            .await?;
            print_json(&output)?;
        }
        Commands::Burn { video, subtitles, suffix } => {
            let layout = workflow.step_layout(session_id.as_ref())?;
            let subtitle_path = workflow.resolve_subtitle_path(&subtitles)?;
            let output = with_spinner(
                "Burning subtitles",
                workflow.burn_subtitles(&layout, &video, &subtitle_path, &suffix),
            )
            .await?;
            print_json(&output)?;
        }
        Commands::Dub { video, subtitles, lang } => {
            let layout = workflow.step_layout(session_id.as_ref())?;
            let raw = tokio::fs::read_to_string(&subtitles).await?;
            let sources = vec![NarrationSource::Raw(raw)];
            let output = with_spinner(
                "Synthesizing narration",
                workflow.synthesize_speech(&layout, &video, &sources, &lang),
            )
            .await?;
            print_json(&output)?;
        }
        Commands::Process { input, target_langs, model, dub } => {
            setup_manager.initialize(&workflow).await?;
            info!("Processing video file: {}", input.display());

            let mut session = session_id.map(Session::with_id).unwrap_or_default();
            let languages = parse_languages(&target_langs);
            workflow
                .process_video(&mut session, &input, &languages, model.as_deref(), dub)
                .await?;

            print_json(&session.snapshot())?;
        }
        Commands::Status { video } => {
            let layout = workflow.layout_for(session_id.as_ref());
            print_status(&layout, &video);
        }
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

/// `--config`, else `./subdub.toml` when present, else defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None if Path::new(CONFIG_FILE).exists() => {
            info!("Found {} in current directory, loading...", CONFIG_FILE);
            Config::from_file(CONFIG_FILE)?
        }
        None => Config::default(),
    };
    Ok(config)
}

async fn with_spinner<T, F>(message: &'static str, step: F) -> T
where
    F: Future<Output = T>,
{
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));

    let output = step.await;
    spinner.finish_and_clear();
    output
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_status(layout: &ArtifactLayout, video: &str) {
    let base = base_filename(video);
    let artifacts = layout.discover(base);

    if artifacts.is_empty() {
        println!("No artifacts found for {}", base);
        return;
    }

    println!("\nArtifacts for {}:", base);
    println!("{:<22} {:<8} {:<60}", "Kind", "Variant", "Path");
    println!("{}", "-".repeat(90));
    for artifact in artifacts {
        let (kind, variant) = match serde_json::to_value(&artifact.kind) {
            Ok(value) => (
                value["kind"].as_str().unwrap_or_default().to_string(),
                value["variant"].as_str().unwrap_or_default().to_string(),
            ),
            Err(_) => (format!("{:?}", artifact.kind), String::new()),
        };
        println!("{:<22} {:<8} {:<60}", kind, variant, artifact.artifact.url);
    }
}

fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".subdub").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation; the guard flushes the file writer when main returns
    let file_appender = rolling::daily(&log_dir, "subdub.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("subdub.log").display()
    );
    Ok(guard)
}

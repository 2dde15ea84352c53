//! `pickplace` – tabletop perception and pick-and-place manifest generation.
//!
//! Subcommands:
//!
//! - `run <frames…>` – replay PCD frames (ascii or binary) through the
//!   pipeline, one at a time, writing `output_<scene>.yaml` after every frame.
//! - `init` – write a default `pickplace.toml`.
//! - `check` – load the configuration, the model and the task parameters and
//!   report whether they fit together.
//!
//! **Ctrl-C** stops the replay after the frame in progress.

mod config;
mod pcd;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use pickplace_middleware::{BusError, EventBus, Topic, TopicReceiver};
use pickplace_perception::{ClassifierModel, ModelError, ObjectClassifier};
use pickplace_planner::ManifestWriter;
use pickplace_runtime::{
    FrameDispatcher, ParamError, ParameterSource, PipelineContext, StaticParams, TomlParamFile, init_tracing,
};
use pickplace_types::{Event, EventPayload, FrameReport, SensorFrame};

use crate::config::{Config, ConfigError};
use crate::pcd::{PcdError, read_pcd};

#[derive(Parser, Debug)]
#[command(name = "pickplace", version, about = "Tabletop perception and pick-and-place manifest generation")]
struct Cli {
    /// Configuration file.
    #[arg(short, long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay PCD frames through the pipeline.
    Run {
        /// PCD files, processed in order.
        #[arg(required = true)]
        frames: Vec<PathBuf>,
        /// Override the configured scene number.
        #[arg(long)]
        scene: Option<i32>,
        /// Override the configured output directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Validate configuration, model and task parameters.
    Check,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("no configuration at {0}; run `pickplace init` first")]
    MissingConfig(PathBuf),

    #[error("{0} already exists; pass --force to overwrite")]
    ConfigExists(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot load model: {0}")]
    Model(#[from] ModelError),

    #[error(transparent)]
    Params(#[from] ParamError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() -> ExitCode {
    // Hold the guard for the whole process so pending spans are flushed.
    let _guard = init_tracing("pickplace");
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Init { force } => init(&cli.config, force),
        Command::Check => check(&cli.config),
        Command::Run {
            frames,
            scene,
            output_dir,
        } => run(&cli.config, frames, scene, output_dir),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommands
// ─────────────────────────────────────────────────────────────────────────────

fn init(path: &Path, force: bool) -> Result<bool, CliError> {
    if path.exists() && !force {
        return Err(CliError::ConfigExists(path.to_path_buf()));
    }
    config::save_to(&Config::default(), path)?;
    println!("  {} Config written to {}", "✓".green().bold(), path.display().to_string().bold());
    Ok(true)
}

fn check(path: &Path) -> Result<bool, CliError> {
    let cfg = load_config(path)?;
    println!("  Config      {}", path.display().to_string().bold());
    println!("  Scene       {}", cfg.scene);

    let ctx = build_context(&cfg)?;
    let model = ctx.classifier().model();
    println!(
        "  Model       {} ({} classes, {} features)",
        cfg.model_path.display(),
        model.classes.len(),
        model.dimension()
    );

    let params = ctx.params().load()?;
    println!(
        "  Task        {} pick-list entries, {} drop locations",
        params.object_list.len(),
        params.dropbox.len()
    );

    let mut ok = true;
    for entry in &params.object_list {
        if !model.classes.contains(&entry.name) {
            println!("  {} `{}` is not a model class; it can never be picked", "!".yellow().bold(), entry.name);
            ok = false;
        }
        if !params.dropbox.iter().any(|d| d.group == entry.group) {
            println!("  {} group `{}` has no drop location", "!".yellow().bold(), entry.group);
            ok = false;
        }
    }
    println!(
        "  Manifest    {}",
        ctx.manifest().path_for(cfg.scene).display().to_string().bold()
    );
    if ok {
        println!("  {} configuration is consistent", "✓".green().bold());
    }
    Ok(ok)
}

fn run(path: &Path, frames: Vec<PathBuf>, scene: Option<i32>, output_dir: Option<PathBuf>) -> Result<bool, CliError> {
    let mut cfg = load_config(path)?;
    if let Some(scene) = scene {
        cfg.scene = scene;
    }
    if let Some(dir) = output_dir {
        cfg.output_dir = dir;
    }
    let ctx = Arc::new(build_context(&cfg)?);
    let capacity = cfg.queue_capacity.max(1);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(replay(ctx, capacity, frames))
}

// ─────────────────────────────────────────────────────────────────────────────
// Replay
// ─────────────────────────────────────────────────────────────────────────────

/// Publish each frame and wait for its outcome before sending the next.
async fn replay(ctx: Arc<PipelineContext>, capacity: usize, frames: Vec<PathBuf>) -> Result<bool, CliError> {
    let bus = EventBus::new(capacity);
    let mut reports = bus.subscribe_to(Topic::FrameReports);

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    let ctrlc_tx = Arc::clone(&stop_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after the current frame …".yellow().bold());
        let _ = ctrlc_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will abort immediately");
    }

    let dispatcher = FrameDispatcher::new(ctx, bus.clone());
    let mut dispatcher_stop = stop_rx.clone();
    let handle = tokio::spawn(dispatcher.run_until(async move {
        let _ = dispatcher_stop.wait_for(|stop| *stop).await;
    }));

    let mut all_ok = true;
    for path in &frames {
        if *stop_rx.borrow() {
            break;
        }
        let cloud = match read_pcd(path) {
            Ok(cloud) => cloud,
            Err(e) => {
                print_unreadable(path, &e);
                all_ok = false;
                continue;
            }
        };
        let frame = SensorFrame::new(path.display().to_string(), cloud);
        let frame_id = frame.id;
        bus.publish_required(Topic::SensorFrames, Event::new("pickplace-cli", EventPayload::SensorFrame(frame)))?;

        let mut stop = stop_rx.clone();
        let outcome = tokio::select! {
            outcome = await_outcome(&mut reports, frame_id) => outcome,
            _ = stop.wait_for(|stop| *stop) => None,
        };
        match outcome {
            Some(EventPayload::FrameReport(report)) => print_report(path, &report),
            Some(EventPayload::FrameFault { kind, message, .. }) => {
                println!("  {} {}  {} {}", "✗".red().bold(), path.display(), kind.red(), message);
                all_ok = false;
            }
            _ => break,
        }
    }

    let _ = stop_tx.send(true);
    match handle.await {
        Ok(stats) => info!(processed = stats.processed, failed = stats.failed, "replay finished"),
        Err(e) => warn!(error = %e, "dispatcher task ended abnormally"),
    }
    Ok(all_ok)
}

/// Next report or fault for `frame_id`; `None` if the bus closed.
async fn await_outcome(
    reports: &mut TopicReceiver,
    frame_id: uuid::Uuid,
) -> Option<EventPayload> {
    while let Some(event) = reports.next().await {
        let matches = match &event.payload {
            EventPayload::FrameReport(report) => report.frame_id == frame_id,
            EventPayload::FrameFault { frame_id: id, .. } => *id == frame_id,
            _ => false,
        };
        if matches {
            return Some(event.payload);
        }
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<Config, CliError> {
    config::load_from(path)?.ok_or_else(|| CliError::MissingConfig(path.to_path_buf()))
}

fn build_context(cfg: &Config) -> Result<PipelineContext, CliError> {
    let model = ClassifierModel::load(&cfg.model_path)?;
    let classifier = ObjectClassifier::new(Arc::new(model), Arc::new(cfg.normals.estimator()), cfg.features.clone())?;
    let params: Arc<dyn ParameterSource> = match &cfg.params_file {
        Some(file) => Arc::new(TomlParamFile::new(file)),
        None => Arc::new(StaticParams::new(cfg.task.clone())),
    };
    let writer = ManifestWriter::new(&cfg.output_dir, cfg.manifest_format);
    Ok(
        PipelineContext::new(cfg.scene, cfg.pipeline.clone(), classifier, params, writer)
            .with_arm_policy(Arc::new(cfg.arms.policy())),
    )
}

fn print_unreadable(path: &Path, e: &PcdError) {
    println!("  {} {}  {}", "✗".red().bold(), path.display(), e.to_string().red());
}

fn print_report(path: &Path, report: &FrameReport) {
    println!(
        "  {} {}  {} clusters [{}]  {} assignment(s)  {}",
        "✓".green().bold(),
        path.display(),
        report.clusters,
        report.labels.join(", "),
        report.assignments.len(),
        format!("{:.1} ms", report.latency_us as f64 / 1000.0).dimmed()
    );
    for a in &report.assignments {
        println!(
            "      {:<10} {:>5} arm  pick ({:.3}, {:.3}, {:.3})",
            a.object_name.bold(),
            a.arm_name.to_string(),
            a.pick_pose.position.x,
            a.pick_pose.position.y,
            a.pick_pose.position.z
        );
    }
    if !report.unmatched.is_empty() {
        println!("      {} {}", "not found:".dimmed(), report.unmatched.join(", "));
    }
    if let Some(manifest) = &report.manifest_path {
        println!("      {} {}", "→".cyan(), manifest.display());
    }
}

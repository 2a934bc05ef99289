use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use vigil_core::{EuclideanMatcher, GalleryEntry, MatchResult, Matcher};

mod config;
mod engine;
mod replay;

use config::Config;
use engine::VerificationResult;
use replay::{ReplayCamera, ReplayDetector, Trace};

#[derive(Parser)]
#[command(name = "vigil", version, about = "Face liveness verification")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded detection trace through the verification pipeline
    Replay {
        /// Trace file (JSON)
        trace: PathBuf,
        /// Configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Gallery of enrolled descriptors (JSON array) to match the result against
        #[arg(long)]
        gallery: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config {
        /// Configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct ReplayReport {
    #[serde(flatten)]
    result: VerificationResult,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    matched: Option<MatchResult>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Replay {
            trace,
            config,
            gallery,
        } => replay(&trace, config.as_deref(), gallery.as_deref()).await,
        Command::Config { config } => {
            let config = Config::load(config.as_deref())?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn replay(trace_path: &Path, config: Option<&Path>, gallery: Option<&Path>) -> Result<()> {
    let config = Config::load(config)?;
    let trace = Trace::load(trace_path)?;
    let gallery = gallery.map(load_gallery).transpose()?;
    let threshold = config.matching.distance_threshold;

    tracing::info!(
        trace = %trace_path.display(),
        frames = trace.frames.len(),
        "replaying trace"
    );

    let engine = engine::spawn_engine(
        ReplayCamera::new(trace.camera_failure),
        ReplayDetector::new(trace.frames),
        config,
    )?;
    let result = engine.verify().await.context("verification failed")?;

    let matched = match (&gallery, &result.descriptor) {
        (Some(gallery), Some(descriptor)) => {
            Some(EuclideanMatcher.compare(descriptor, gallery, threshold))
        }
        _ => None,
    };

    let report = ReplayReport { result, matched };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_gallery(path: &Path) -> Result<Vec<GalleryEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read gallery {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse gallery {}", path.display()))
}

//! Predictor Engine - Main Entry Point
//!
//! Scores one slice of a delimited input file (or every slice, with
//! `--all-slices`) against an exported model artifact.

use anyhow::{bail, Context, Result};
use clap::Parser;
use predictor_engine::{config::AppConfig, run_slices, Predictor};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[clap(name = "predictor-engine", about = "Offline batch scoring for exported models")]
struct Args {
    /// Path to the TOML configuration file
    #[clap(long, default_value = "config/config.toml")]
    config: PathBuf,

    /// Model artifact directory (overrides `artifact.dir`)
    #[clap(long)]
    artifact: Option<PathBuf>,

    /// Input file (overrides `scoring.input_path`)
    #[clap(long)]
    input: Option<PathBuf>,

    /// Output directory (overrides `scoring.output_dir`)
    #[clap(long)]
    output_dir: Option<PathBuf>,

    /// Slice handled by this worker (overrides `scoring.slice_id`)
    #[clap(long)]
    slice_id: Option<usize>,

    /// Total number of slices (overrides `scoring.slice_num`)
    #[clap(long)]
    slice_num: Option<usize>,

    /// Score every slice in this process, `scoring.workers` at a time
    #[clap(long)]
    all_slices: bool,
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("predictor_engine={}", config.logging.level).parse()?);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = AppConfig::load_from_path(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(dir) = args.artifact {
        config.artifact.dir = dir;
    }
    if let Some(input) = args.input {
        config.scoring.input_path = Some(input);
    }
    if let Some(dir) = args.output_dir {
        config.scoring.output_dir = dir;
    }
    if let Some(slice_id) = args.slice_id {
        config.scoring.slice_id = slice_id;
    }
    if let Some(slice_num) = args.slice_num {
        config.scoring.slice_num = slice_num;
    }

    init_logging(&config)?;
    info!("Starting Predictor Engine");

    let Some(input_path) = config.scoring.input_path.clone() else {
        bail!("no input file: set scoring.input_path or pass --input");
    };
    let options = config.score_options();
    let output_dir = config.scoring.output_dir.clone();

    info!(
        artifact = %config.artifact.dir.display(),
        device = %config.artifact.device,
        batch_size = options.batch_size,
        input = %input_path.display(),
        output_dir = %output_dir.display(),
        "Configuration loaded"
    );

    if args.all_slices {
        let reports = run_slices(
            config.artifact.dir.clone(),
            config.load_options(),
            input_path,
            output_dir,
            options,
            config.scoring.slice_num,
            config.scoring.workers,
        )
        .await?;

        let mut failed = 0;
        for report in &reports {
            match report {
                Ok(report) => info!(
                    slice_id = report.slice_id,
                    rows = report.rows_written,
                    skipped = report.lines_skipped,
                    output = %report.output_path.display(),
                    "Slice complete"
                ),
                Err(e) => {
                    failed += 1;
                    error!(error = %e, "Slice failed");
                }
            }
        }
        if failed > 0 {
            bail!("{} of {} slices failed", failed, reports.len());
        }
    } else {
        let slice = config.slice()?;
        let artifact = config.artifact.dir.clone();
        let load_options = config.load_options();

        let report = tokio::task::spawn_blocking(move || {
            let mut predictor = Predictor::load_with(&artifact, load_options)?;
            info!(backend = predictor.backend(), "Predictor loaded");
            predictor.score_file(&input_path, &output_dir, slice, &options)
        })
        .await??;

        info!(
            slice_id = report.slice_id,
            rows = report.rows_written,
            skipped = report.lines_skipped,
            batches = report.batches,
            output = %report.output_path.display(),
            "Slice complete"
        );
    }

    info!("Predictor Engine shutting down...");
    Ok(())
}

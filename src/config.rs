//! Configuration management for the predictor engine

use crate::models::assembler::ColumnSelection;
use crate::models::loader::{Device, LoadOptions};
use crate::models::signature::InputMap;
use crate::scorer::{MalformedPolicy, ScoreOptions, SliceSpec};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Prefix of environment overrides, e.g. `PREDICTOR__SCORING__SLICE_ID=3`
pub const ENV_PREFIX: &str = "PREDICTOR";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub artifact: ArtifactConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    /// Directory holding the exported model
    pub dir: PathBuf,
    /// `cpu`, `gpu` or `gpu:<id>`
    #[serde(default)]
    pub device: Device,
    /// Threads for intra-op parallelism (default: 1)
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    /// Caller field to tensor renames
    #[serde(default)]
    pub input_map: InputMap,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("model"),
            device: Device::Cpu,
            intra_threads: default_intra_threads(),
            input_map: InputMap::new(),
        }
    }
}

fn default_intra_threads() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    /// Records per model call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    32
}

/// Offline scoring job configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub input_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// `ALL_COLUMNS` or a comma separated list of input columns
    pub reserved_cols: ColumnSelection,
    /// `ALL_COLUMNS` or a comma separated list of outputs
    pub output_cols: ColumnSelection,
    pub slice_id: usize,
    pub slice_num: usize,
    pub input_sep: String,
    pub output_sep: String,
    pub feature_sep: Option<String>,
    pub selected_cols: Option<Vec<usize>>,
    pub input_has_header: bool,
    pub with_header: bool,
    pub on_malformed: MalformedPolicy,
    /// Slices scored at once with `--all-slices`
    pub workers: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let options = ScoreOptions::default();
        Self {
            input_path: None,
            output_dir: PathBuf::from("output"),
            reserved_cols: options.reserved_cols,
            output_cols: options.output_cols,
            slice_id: 0,
            slice_num: 1,
            input_sep: options.input_sep,
            output_sep: options.output_sep,
            feature_sep: options.feature_sep,
            selected_cols: options.selected_cols,
            input_has_header: options.input_has_header,
            with_header: options.with_header,
            on_malformed: options.on_malformed,
            workers: 1,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `PREDICTOR__*` environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            device: self.artifact.device,
            intra_threads: self.artifact.intra_threads,
            input_map: self.artifact.input_map.clone(),
        }
    }

    pub fn score_options(&self) -> ScoreOptions {
        let scoring = &self.scoring;
        ScoreOptions {
            reserved_cols: scoring.reserved_cols.clone(),
            output_cols: scoring.output_cols.clone(),
            input_sep: scoring.input_sep.clone(),
            output_sep: scoring.output_sep.clone(),
            feature_sep: scoring.feature_sep.clone(),
            selected_cols: scoring.selected_cols.clone(),
            input_has_header: scoring.input_has_header,
            with_header: scoring.with_header,
            on_malformed: scoring.on_malformed,
            batch_size: self.predictor.batch_size,
        }
    }

    pub fn slice(&self) -> Result<SliceSpec> {
        SliceSpec::new(self.scoring.slice_id, self.scoring.slice_num)
            .context("Invalid slice configuration")
    }
}

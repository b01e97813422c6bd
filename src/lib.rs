//! Predictor Engine Library
//!
//! Batch and offline inference over exported ranking models: load an
//! artifact once, normalize caller records to its signature, run them in
//! fixed-size batches and write per-slice scored files for distributed jobs.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod predictor;
pub mod scorer;
pub mod types;

pub use config::AppConfig;
pub use error::{PredictorError, Result, ShapeError};
pub use models::assembler::ColumnSelection;
pub use models::loader::{ArtifactLoader, Device, LoadOptions};
pub use models::signature::Signature;
pub use normalizer::InputNormalizer;
pub use predictor::Predictor;
pub use scorer::{
    run_slices, DistributedFileScorer, MalformedPolicy, ScoreOptions, SliceReport, SliceSpec,
};
pub use types::{FieldValue, PredictionResult, RawInput, Value};

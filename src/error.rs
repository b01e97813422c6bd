//! Error taxonomy for artifact loading, normalization, execution and offline scoring.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error produced by an execution backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used by the library.
pub type Result<T> = std::result::Result<T, PredictorError>;

/// Errors surfaced by the prediction engine.
///
/// None of these are retried: given identical inputs the same failure recurs.
#[derive(Debug, Error)]
pub enum PredictorError {
    /// The artifact path does not resolve to a loadable model
    #[error("no model artifact found at {}", path.display())]
    ArtifactNotFound { path: PathBuf },

    /// The artifact exists but its runtime refused to load it
    #[error("failed to load artifact {}: {reason}", path.display())]
    ArtifactLoad { path: PathBuf, reason: String },

    /// The artifact declares no usable inputs/outputs, or a caller name cannot be resolved
    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    /// A record does not satisfy the signature
    #[error("record {record}: {source}")]
    InputShape {
        record: usize,
        #[source]
        source: ShapeError,
    },

    /// The model invocation failed for a batch
    #[error("execution failed on batch {batch_index} (size {batch_size}): {source}")]
    Execution {
        batch_index: usize,
        batch_size: usize,
        #[source]
        source: BoxError,
    },

    /// An input line has the wrong number of columns
    #[error("slice {slice_id}: malformed line {line}: {reason}")]
    MalformedLine {
        slice_id: usize,
        line: usize,
        reason: String,
    },

    /// Any other failure while scoring a line of a slice
    #[error("slice {slice_id}: line {line}: {source}")]
    Slice {
        slice_id: usize,
        line: usize,
        #[source]
        source: Box<PredictorError>,
    },

    /// A slice worker panicked or could not be scheduled
    #[error("slice {slice_id} worker failed: {reason}")]
    Worker { slice_id: usize, reason: String },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Why a single record failed normalization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("expected {expected} fields, got {got}")]
    TooFewFields { expected: usize, got: usize },

    #[error("expected {expected} fields, got {got}")]
    TooManyFields { expected: usize, got: usize },

    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("field `{field}` expects a single value, got {got}")]
    Arity { field: String, got: usize },

    #[error("field `{field}`: cannot parse {value:?} as {dtype}")]
    Parse {
        field: String,
        value: String,
        dtype: &'static str,
    },
}

impl PredictorError {
    /// Attach a slice line number to an error raised while scoring that line.
    pub(crate) fn at_line(self, slice_id: usize, line: usize) -> Self {
        match self {
            err @ PredictorError::MalformedLine { .. } | err @ PredictorError::Slice { .. } => err,
            other => PredictorError::Slice {
                slice_id,
                line,
                source: Box::new(other),
            },
        }
    }
}

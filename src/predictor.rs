//! Per-call prediction API over a loaded artifact

use crate::error::{PredictorError, Result};
use crate::metrics::ScoringMetrics;
use crate::models::assembler::ResultAssembler;
use crate::models::executor::BatchExecutor;
use crate::models::loader::{ArtifactLoader, LoadOptions, LoadedArtifact};
use crate::models::runtime::ExecutionContext;
use crate::models::signature::Signature;
use crate::normalizer::InputNormalizer;
use crate::scorer::{DistributedFileScorer, ScoreOptions, SliceReport, SliceSpec};
use crate::types::{PredictionResult, RawInput, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A loaded model ready to serve predictions.
///
/// The execution context is created once at load and reused for every call;
/// it is exclusively owned, so each parallel worker loads its own predictor.
pub struct Predictor {
    path: PathBuf,
    signature: Arc<Signature>,
    context: Box<dyn ExecutionContext>,
    normalizer: InputNormalizer,
    metrics: Arc<ScoringMetrics>,
}

impl Predictor {
    /// Load the artifact at `path` with default options.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with(path, LoadOptions::default())
    }

    pub fn load_with<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<Self> {
        let artifact = ArtifactLoader::with_options(options).load(path)?;
        Ok(Self::from_artifact(artifact))
    }

    pub fn from_artifact(artifact: LoadedArtifact) -> Self {
        let normalizer = InputNormalizer::new(artifact.signature.clone());
        Self {
            path: artifact.path,
            signature: artifact.signature,
            context: artifact.context,
            normalizer,
            metrics: Arc::new(ScoringMetrics::new()),
        }
    }

    /// Separator used to split [`RawInput::DelimitedLine`] records.
    pub fn with_feature_sep(mut self, sep: impl Into<String>) -> Self {
        self.normalizer = self.normalizer.with_feature_sep(sep);
        self
    }

    /// Accept up to `columns` extra trailing fields on positional records;
    /// they are ignored rather than rejected with `TooManyFields`.
    pub fn with_passthrough(mut self, columns: usize) -> Self {
        self.normalizer = self.normalizer.with_passthrough(columns);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn shared_signature(&self) -> Arc<Signature> {
        self.signature.clone()
    }

    pub fn backend(&self) -> &'static str {
        self.context.backend()
    }

    pub fn metrics(&self) -> &Arc<ScoringMetrics> {
        &self.metrics
    }

    pub(crate) fn context_mut(&mut self) -> &mut dyn ExecutionContext {
        self.context.as_mut()
    }

    /// Predict every record, `batch_size` records per model call.
    ///
    /// The result has one entry per input, in input order, holding every
    /// declared output. Any failing record or batch fails the whole call.
    pub fn predict(
        &mut self,
        inputs: &[RawInput],
        batch_size: usize,
    ) -> Result<Vec<PredictionResult>> {
        let executor = BatchExecutor::new(batch_size)?.with_metrics(self.metrics.clone());

        let normalized = inputs
            .iter()
            .enumerate()
            .map(|(record, raw)| {
                self.normalizer
                    .normalize(raw)
                    .map_err(|source| PredictorError::InputShape { record, source })
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = executor.execute(self.context.as_mut(), &normalized)?;

        let assembler = ResultAssembler::all(&self.signature);
        Ok(rows
            .into_iter()
            .map(|raw| assembler.assemble(raw, std::iter::empty::<(String, Value)>()))
            .collect())
    }

    /// Score this worker's slice of a delimited input file into
    /// `<output_dir>/slice_<slice_id>.csv`.
    pub fn score_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        input_path: P,
        output_dir: Q,
        slice: SliceSpec,
        options: &ScoreOptions,
    ) -> Result<SliceReport> {
        info!(
            artifact = %self.path.display(),
            input = %input_path.as_ref().display(),
            slice_id = slice.slice_id(),
            slice_num = slice.slice_num(),
            "Scoring file slice"
        );
        DistributedFileScorer::new(options.clone()).score(self, input_path, output_dir, slice)
    }
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("path", &self.path)
            .field("backend", &self.context.backend())
            .field("inputs", &self.signature.input_count())
            .field("outputs", &self.signature.output_count())
            .finish()
    }
}

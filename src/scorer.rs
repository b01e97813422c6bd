//! Offline scoring of large delimited files, partitioned across slices.
//!
//! Each data record (non-empty line, header excluded) gets a record index
//! counted from 0; slice `slice_id` of `slice_num` owns exactly the records
//! with `index % slice_num == slice_id`. The rule is stable across runs, so
//! re-running one slice on the same file reproduces the same rows.

use crate::error::{PredictorError, Result};
use crate::models::assembler::{ColumnSelection, ResultAssembler};
use crate::models::executor::BatchExecutor;
use crate::models::loader::LoadOptions;
use crate::models::signature::Signature;
use crate::normalizer::InputNormalizer;
use crate::predictor::Predictor;
use crate::types::value::LIST_SEP;
use crate::types::{NormalizedInput, RawInput, Value};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Name given to the payload column in delimited-line mode when the input has no header.
const FEATURES_COLUMN: &str = "features";

/// Which part of a partitioned job this worker owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSpec {
    slice_id: usize,
    slice_num: usize,
}

impl SliceSpec {
    pub fn new(slice_id: usize, slice_num: usize) -> Result<Self> {
        if slice_num == 0 {
            return Err(PredictorError::InvalidOptions(
                "slice_num must be greater than 0".to_string(),
            ));
        }
        if slice_id >= slice_num {
            return Err(PredictorError::InvalidOptions(format!(
                "slice_id {} out of range for slice_num {}",
                slice_id, slice_num
            )));
        }
        Ok(Self {
            slice_id,
            slice_num,
        })
    }

    /// The whole file as one slice.
    pub fn single() -> Self {
        Self {
            slice_id: 0,
            slice_num: 1,
        }
    }

    pub fn slice_id(&self) -> usize {
        self.slice_id
    }

    pub fn slice_num(&self) -> usize {
        self.slice_num
    }

    /// Whether this slice owns the data record at `record_index`.
    pub fn owns(&self, record_index: usize) -> bool {
        record_index % self.slice_num == self.slice_id
    }

    /// `<output_dir>/slice_<slice_id>.csv`
    pub fn output_file(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("slice_{}.csv", self.slice_id))
    }
}

/// What to do with a line that has the wrong column count or cannot be normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Abort the slice
    #[default]
    Fail,
    /// Log, count and continue
    Skip,
}

/// Settings of an offline scoring job
#[derive(Debug, Clone)]
pub struct ScoreOptions {
    /// Input columns echoed ahead of the outputs
    pub reserved_cols: ColumnSelection,
    /// Outputs written
    pub output_cols: ColumnSelection,
    pub input_sep: String,
    pub output_sep: String,
    /// When set, the payload column is one delimited line split on this separator
    pub feature_sep: Option<String>,
    /// 0-based feature column indices; defaults to the trailing columns
    pub selected_cols: Option<Vec<usize>>,
    /// First line of the input names the columns
    pub input_has_header: bool,
    /// Write a header line to each slice file
    pub with_header: bool,
    pub on_malformed: MalformedPolicy,
    pub batch_size: usize,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            reserved_cols: ColumnSelection::All,
            output_cols: ColumnSelection::All,
            input_sep: ",".to_string(),
            output_sep: ";".to_string(),
            feature_sep: None,
            selected_cols: None,
            input_has_header: false,
            with_header: true,
            on_malformed: MalformedPolicy::Fail,
            batch_size: 32,
        }
    }
}

impl ScoreOptions {
    fn validate(&self) -> Result<()> {
        if self.input_sep.is_empty() || self.output_sep.is_empty() {
            return Err(PredictorError::InvalidOptions(
                "input_sep and output_sep must not be empty".to_string(),
            ));
        }
        if self.output_sep.contains(LIST_SEP) {
            return Err(PredictorError::InvalidOptions(format!(
                "output_sep {:?} collides with the list value separator {:?}",
                self.output_sep, LIST_SEP
            )));
        }
        if matches!(&self.feature_sep, Some(sep) if sep.is_empty()) {
            return Err(PredictorError::InvalidOptions(
                "feature_sep must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one scored slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceReport {
    pub slice_id: usize,
    pub output_path: PathBuf,
    /// Data rows written (header excluded)
    pub rows_written: usize,
    pub lines_skipped: usize,
    pub batches: usize,
}

#[derive(Debug, Default)]
struct SliceCounts {
    rows_written: usize,
    lines_skipped: usize,
    batches: usize,
}

/// Where features and reserved columns live in an input line.
#[derive(Debug, Clone)]
struct ColumnLayout {
    names: Vec<String>,
    expected: usize,
    feature_cols: Vec<usize>,
    reserved_cols: Vec<usize>,
}

impl ColumnLayout {
    fn resolve(
        header: Option<&[String]>,
        expected: usize,
        signature: &Signature,
        options: &ScoreOptions,
    ) -> Result<Self> {
        let delimited = options.feature_sep.is_some();
        let wanted = if delimited { 1 } else { signature.input_count() };

        let feature_cols = match &options.selected_cols {
            Some(cols) => {
                if cols.len() != wanted {
                    return Err(PredictorError::InvalidOptions(format!(
                        "selected_cols names {} columns, model expects {}",
                        cols.len(),
                        wanted
                    )));
                }
                if let Some(col) = cols.iter().find(|&&c| c >= expected) {
                    return Err(PredictorError::InvalidOptions(format!(
                        "selected column {} out of range for {} input columns",
                        col, expected
                    )));
                }
                cols.clone()
            }
            None if expected < wanted => {
                return Err(PredictorError::InvalidOptions(format!(
                    "input has {} columns, model expects {} feature columns",
                    expected, wanted
                )))
            }
            None => (expected - wanted..expected).collect(),
        };

        let names: Vec<String> = match header {
            Some(names) => names.to_vec(),
            None => (0..expected)
                .map(|col| match feature_cols.iter().position(|&c| c == col) {
                    Some(_) if delimited => FEATURES_COLUMN.to_string(),
                    Some(input) => signature.caller_name(input).to_string(),
                    None => format!("col{}", col),
                })
                .collect(),
        };

        let reserved_cols = match &options.reserved_cols {
            ColumnSelection::All => (0..expected).collect(),
            ColumnSelection::Named(wanted) => wanted
                .iter()
                .map(|name| {
                    names.iter().position(|n| n == name).ok_or_else(|| {
                        PredictorError::InvalidOptions(format!(
                            "reserved column `{}` not found in input columns",
                            name
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };

        for (pos, &col) in reserved_cols.iter().enumerate() {
            if reserved_cols[..pos].iter().any(|&prev| names[prev] == names[col]) {
                return Err(PredictorError::InvalidOptions(format!(
                    "reserved column name `{}` appears more than once",
                    names[col]
                )));
            }
        }

        Ok(Self {
            names,
            expected,
            feature_cols,
            reserved_cols,
        })
    }

    fn reserved_names(&self) -> Vec<String> {
        self.reserved_cols
            .iter()
            .map(|&c| self.names[c].clone())
            .collect()
    }
}

/// Normalized records of the batch being filled, with what is needed to write them.
#[derive(Default)]
struct PendingBatch {
    inputs: Vec<NormalizedInput>,
    lines: Vec<usize>,
    reserved: Vec<Vec<String>>,
}

impl PendingBatch {
    fn len(&self) -> usize {
        self.inputs.len()
    }

    fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Streams one slice of an input file through normalize, batch-predict and
/// assemble, writing one output line per owned record.
#[derive(Debug, Clone)]
pub struct DistributedFileScorer {
    options: ScoreOptions,
}

impl DistributedFileScorer {
    pub fn new(options: ScoreOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ScoreOptions {
        &self.options
    }

    /// Score `slice` of `input_path` into `<output_dir>/slice_<slice_id>.csv`.
    ///
    /// Rows go to a temporary file that replaces the slice file only once the
    /// whole slice succeeded; a failed run leaves any previous output intact.
    pub fn score<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        predictor: &mut Predictor,
        input_path: P,
        output_dir: Q,
        slice: SliceSpec,
    ) -> Result<SliceReport> {
        let input_path = input_path.as_ref();
        let output_dir = output_dir.as_ref();
        self.options.validate()?;

        let reader = BufReader::new(File::open(input_path)?);
        fs::create_dir_all(output_dir)?;
        let output_path = slice.output_file(output_dir);
        let partial_path = output_path.with_extension("csv.partial");

        info!(
            slice_id = slice.slice_id(),
            slice_num = slice.slice_num(),
            input = %input_path.display(),
            output = %output_path.display(),
            reserved_cols = %self.options.reserved_cols,
            output_cols = %self.options.output_cols,
            "Slice scoring started"
        );

        let outcome = File::create(&partial_path)
            .map_err(PredictorError::from)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                let counts = self.write_slice(predictor, reader, &mut writer, slice)?;
                writer.flush()?;
                Ok(counts)
            });

        let counts = match outcome {
            Ok(counts) => {
                fs::rename(&partial_path, &output_path)?;
                counts
            }
            Err(err) => {
                if let Err(e) = fs::remove_file(&partial_path) {
                    warn!(
                        path = %partial_path.display(),
                        error = %e,
                        "Failed to remove partial output"
                    );
                }
                return Err(err);
            }
        };

        predictor.metrics().log_summary(slice.slice_id());
        info!(
            slice_id = slice.slice_id(),
            rows = counts.rows_written,
            skipped = counts.lines_skipped,
            batches = counts.batches,
            output = %output_path.display(),
            "Slice scoring finished"
        );

        Ok(SliceReport {
            slice_id: slice.slice_id(),
            output_path,
            rows_written: counts.rows_written,
            lines_skipped: counts.lines_skipped,
            batches: counts.batches,
        })
    }

    fn write_slice<R: BufRead, W: Write>(
        &self,
        predictor: &mut Predictor,
        reader: R,
        writer: &mut W,
        slice: SliceSpec,
    ) -> Result<SliceCounts> {
        let options = &self.options;
        let signature = predictor.shared_signature();
        let assembler = ResultAssembler::new(&signature, &options.output_cols)?;
        let executor =
            BatchExecutor::new(options.batch_size)?.with_metrics(predictor.metrics().clone());
        let mut normalizer = InputNormalizer::new(signature.clone());
        if let Some(sep) = &options.feature_sep {
            normalizer = normalizer.with_feature_sep(sep.clone());
        }

        let mut header: Option<Vec<String>> = None;
        let mut layout: Option<ColumnLayout> = None;
        let mut reserved_names: Vec<String> = Vec::new();
        let mut pending = PendingBatch::default();
        let mut record_index = 0usize;
        let mut counts = SliceCounts::default();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line?;
            let line = line.trim_end_matches('\r');

            if options.input_has_header && header.is_none() {
                header = Some(line.split(options.input_sep.as_str()).map(str::to_string).collect());
                continue;
            }
            // Only truly empty lines are blank; a line of empty fields is a record
            if line.is_empty() {
                continue;
            }

            let current = record_index;
            record_index += 1;

            if layout.is_none() {
                let expected = match &header {
                    Some(names) => names.len(),
                    None => line.split(options.input_sep.as_str()).count(),
                };
                let resolved =
                    ColumnLayout::resolve(header.as_deref(), expected, &signature, options)?;
                reserved_names = resolved.reserved_names();
                check_collisions(&reserved_names, &assembler)?;
                self.write_header(&mut *writer, &reserved_names, &assembler)?;
                layout = Some(resolved);
            }
            let Some(layout) = layout.as_ref() else {
                continue;
            };

            if !slice.owns(current) {
                continue;
            }

            let cols: Vec<&str> = line.split(options.input_sep.as_str()).collect();
            if cols.len() != layout.expected {
                let err = PredictorError::MalformedLine {
                    slice_id: slice.slice_id(),
                    line: line_no,
                    reason: format!("expected {} columns, got {}", layout.expected, cols.len()),
                };
                self.reject(err, predictor, &mut counts.lines_skipped)?;
                continue;
            }

            let raw = if options.feature_sep.is_some() {
                RawInput::DelimitedLine(cols[layout.feature_cols[0]].to_string())
            } else {
                RawInput::PositionalList(
                    layout
                        .feature_cols
                        .iter()
                        .map(|&c| cols[c].to_string())
                        .collect(),
                )
            };

            match normalizer.normalize(&raw) {
                Ok(input) => {
                    pending.inputs.push(input);
                    pending.lines.push(line_no);
                    pending
                        .reserved
                        .push(layout.reserved_cols.iter().map(|&c| cols[c].to_string()).collect());
                }
                Err(source) => {
                    let err = PredictorError::InputShape {
                        record: current,
                        source,
                    }
                    .at_line(slice.slice_id(), line_no);
                    self.reject(err, predictor, &mut counts.lines_skipped)?;
                    continue;
                }
            }

            if pending.len() == options.batch_size {
                counts.rows_written += self.flush(
                    &mut *writer,
                    &mut pending,
                    predictor,
                    &executor,
                    &assembler,
                    &reserved_names,
                    slice,
                    counts.batches,
                )?;
                counts.batches += 1;
            }
        }

        if !pending.is_empty() {
            counts.rows_written += self.flush(
                &mut *writer,
                &mut pending,
                predictor,
                &executor,
                &assembler,
                &reserved_names,
                slice,
                counts.batches,
            )?;
            counts.batches += 1;
        }

        if layout.is_none() {
            // No data lines: still produce a header-only file
            if let Some(names) = &header {
                let resolved = ColumnLayout::resolve(
                    Some(names.as_slice()),
                    names.len(),
                    &signature,
                    options,
                )?;
                reserved_names = resolved.reserved_names();
            } else if let ColumnSelection::Named(names) = &options.reserved_cols {
                if !names.is_empty() {
                    return Err(PredictorError::InvalidOptions(
                        "cannot resolve reserved columns of an empty input".to_string(),
                    ));
                }
            }
            check_collisions(&reserved_names, &assembler)?;
            self.write_header(&mut *writer, &reserved_names, &assembler)?;
        }

        Ok(counts)
    }

    fn write_header<W: Write>(
        &self,
        writer: &mut W,
        reserved_names: &[String],
        assembler: &ResultAssembler,
    ) -> Result<()> {
        if !self.options.with_header {
            return Ok(());
        }
        let names: Vec<&str> = reserved_names
            .iter()
            .map(String::as_str)
            .chain(assembler.output_names())
            .collect();
        writeln!(writer, "{}", names.join(&self.options.output_sep))?;
        Ok(())
    }

    /// Fail the slice, or log and count the line in skip mode.
    fn reject(
        &self,
        err: PredictorError,
        predictor: &Predictor,
        lines_skipped: &mut usize,
    ) -> Result<()> {
        match self.options.on_malformed {
            MalformedPolicy::Fail => Err(err),
            MalformedPolicy::Skip => {
                warn!(error = %err, "Skipping input line");
                predictor.metrics().record_skipped();
                *lines_skipped += 1;
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn flush<W: Write>(
        &self,
        writer: &mut W,
        pending: &mut PendingBatch,
        predictor: &mut Predictor,
        executor: &BatchExecutor,
        assembler: &ResultAssembler,
        reserved_names: &[String],
        slice: SliceSpec,
        batch_index: usize,
    ) -> Result<usize> {
        let first_line = pending.lines.first().copied().unwrap_or_default();
        let rows = executor
            .run_batch(predictor.context_mut(), &pending.inputs, batch_index)
            .map_err(|e| e.at_line(slice.slice_id(), first_line))?;

        let written = rows.len();
        for (raw, reserved) in rows.into_iter().zip(pending.reserved.drain(..)) {
            let reserved = reserved_names
                .iter()
                .cloned()
                .zip(reserved.into_iter().map(Value::Text));
            let result = assembler.assemble(raw, reserved);
            let fields: Vec<String> = result.values().map(ToString::to_string).collect();
            writeln!(writer, "{}", fields.join(&self.options.output_sep))?;
        }

        debug!(
            slice_id = slice.slice_id(),
            batch_index = batch_index,
            rows = written,
            first_line = first_line,
            "Batch written"
        );

        pending.inputs.clear();
        pending.lines.clear();
        pending.reserved.clear();
        Ok(written)
    }
}

fn check_collisions(reserved_names: &[String], assembler: &ResultAssembler) -> Result<()> {
    if let Some(name) = assembler
        .output_names()
        .find(|out| reserved_names.iter().any(|r| r == out))
    {
        return Err(PredictorError::InvalidOptions(format!(
            "reserved column `{}` collides with an output of the same name",
            name
        )));
    }
    Ok(())
}

/// Score all `slice_num` slices of a job in this process, at most `workers`
/// at a time. Every slice loads its own predictor; results are reported per
/// slice and a failed slice leaves the other slices' files in place.
pub async fn run_slices(
    artifact: PathBuf,
    load_options: LoadOptions,
    input_path: PathBuf,
    output_dir: PathBuf,
    options: ScoreOptions,
    slice_num: usize,
    workers: usize,
) -> Result<Vec<Result<SliceReport>>> {
    if slice_num == 0 {
        return Err(PredictorError::InvalidOptions(
            "slice_num must be greater than 0".to_string(),
        ));
    }

    let workers = workers.clamp(1, slice_num);
    info!(slice_num = slice_num, workers = workers, "Starting slice workers");

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut handles = Vec::with_capacity(slice_num);

    for slice_id in 0..slice_num {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PredictorError::Worker {
                slice_id,
                reason: e.to_string(),
            })?;

        let artifact = artifact.clone();
        let load_options = load_options.clone();
        let input_path = input_path.clone();
        let output_dir = output_dir.clone();
        let options = options.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let slice = SliceSpec::new(slice_id, slice_num)?;
            let mut predictor = Predictor::load_with(&artifact, load_options)?;
            predictor.score_file(&input_path, &output_dir, slice, &options)
        }));
    }

    let results = futures::future::join_all(handles)
        .await
        .into_iter()
        .enumerate()
        .map(|(slice_id, joined)| {
            joined.unwrap_or_else(|e| {
                Err(PredictorError::Worker {
                    slice_id,
                    reason: e.to_string(),
                })
            })
        })
        .collect();

    Ok(results)
}

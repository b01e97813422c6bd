//! ONNX Runtime backend for `model.onnx` artifacts

use crate::error::{BoxError, PredictorError, Result};
use crate::models::loader::{Device, LoadOptions};
use crate::models::runtime::{split_rows, ExecutionContext, OutputTensors};
use crate::models::signature::{DType, InputSpec, OutputSpec, Signature};
use crate::types::{NormalizedInput, Value};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputValue};
use ort::value::Tensor;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, info, warn};

/// ONNX Runtime session plus the feed layout derived from its inputs.
pub struct OnnxContext {
    session: Session,
    /// (tensor name, values per row) in signature input order
    feeds: Vec<(String, usize)>,
    outputs: Vec<String>,
}

impl OnnxContext {
    /// Build a session for `model_file`. When `declared` is given it must
    /// name exactly the session's inputs and a subset of its outputs.
    pub fn load(
        model_file: &Path,
        declared: Option<Signature>,
        options: &LoadOptions,
    ) -> Result<(Signature, Self)> {
        let load_err = |e: ort::Error| PredictorError::ArtifactLoad {
            path: model_file.to_path_buf(),
            reason: e.to_string(),
        };

        ort::init()
            .with_name("predictor-engine")
            .commit()
            .map_err(load_err)?;

        if let Device::Gpu(id) = options.device {
            warn!(gpu = id, "CUDA execution provider not compiled in, running on CPU");
        }

        let session = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_err)?
            .with_intra_threads(options.intra_threads)
            .map_err(load_err)?
            .commit_from_file(model_file)
            .map_err(load_err)?;

        let session_inputs: Vec<(String, usize)> = session
            .inputs
            .iter()
            .map(|input| {
                let width = input
                    .input_type
                    .tensor_shape()
                    .and_then(|shape| shape.iter().nth(1).copied())
                    .filter(|&w| w > 0)
                    .unwrap_or(1) as usize;
                (input.name.clone(), width)
            })
            .collect();
        let session_outputs: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        let signature = match declared {
            Some(signature) => {
                check_declared(&signature, &session_inputs, &session_outputs)?;
                signature
            }
            None => Signature::new(
                session_inputs
                    .iter()
                    .map(|(name, width)| {
                        let spec = InputSpec::new(name.clone(), DType::Float);
                        if *width > 1 {
                            spec.multi("|")
                        } else {
                            spec
                        }
                    })
                    .collect(),
                session_outputs.iter().map(OutputSpec::new).collect(),
            )?,
        };

        let feeds = signature
            .inputs()
            .iter()
            .map(|spec| {
                let width = session_inputs
                    .iter()
                    .find(|(name, _)| *name == spec.name)
                    .map(|(_, w)| *w)
                    .unwrap_or(1);
                (spec.name.clone(), width)
            })
            .collect();
        let outputs = signature.output_names().map(str::to_string).collect();

        info!(
            model = %model_file.display(),
            inputs = session_inputs.len(),
            outputs = session_outputs.len(),
            "ONNX session created"
        );

        Ok((
            signature,
            Self {
                session,
                feeds,
                outputs,
            },
        ))
    }
}

fn check_declared(
    signature: &Signature,
    inputs: &[(String, usize)],
    outputs: &[String],
) -> Result<()> {
    for spec in signature.inputs() {
        if !inputs.iter().any(|(name, _)| *name == spec.name) {
            return Err(PredictorError::SignatureMismatch(format!(
                "declared input `{}` is not a session input",
                spec.name
            )));
        }
    }
    if signature.input_count() != inputs.len() {
        return Err(PredictorError::SignatureMismatch(format!(
            "session has {} inputs, signature declares {}",
            inputs.len(),
            signature.input_count()
        )));
    }
    if let Some(name) = signature.output_names().find(|n| !outputs.iter().any(|o| o == n)) {
        return Err(PredictorError::SignatureMismatch(format!(
            "declared output `{}` is not a session output",
            name
        )));
    }
    Ok(())
}

fn push_f32(data: &mut Vec<f32>, value: &Value, width: usize) -> std::result::Result<(), BoxError> {
    match value {
        Value::List(items) if items.len() == width => {
            for item in items {
                push_f32(data, item, 1)?;
            }
        }
        Value::List(items) => {
            return Err(format!("expected {} values, got {}", width, items.len()).into());
        }
        scalar if width == 1 => {
            let v = scalar
                .as_f64()
                .ok_or_else(|| format!("non-numeric value {:?}", scalar))?;
            data.push(v as f32);
        }
        _ => return Err(format!("expected {} values, got a scalar", width).into()),
    }
    Ok(())
}

impl ExecutionContext for OnnxContext {
    fn backend(&self) -> &'static str {
        "onnx"
    }

    fn run(&mut self, batch: &[NormalizedInput]) -> std::result::Result<OutputTensors, BoxError> {
        let rows = batch.len();

        let mut feeds: Vec<(Cow<'static, str>, SessionInputValue<'static>)> =
            Vec::with_capacity(self.feeds.len());
        for (position, (name, width)) in self.feeds.iter().enumerate() {
            let mut data = Vec::with_capacity(rows * width);
            for input in batch {
                let value = input
                    .get(position)
                    .ok_or_else(|| format!("missing value for input `{}`", name))?;
                push_f32(&mut data, value, *width)?;
            }
            let tensor = Tensor::from_array((vec![rows as i64, *width as i64], data))?;
            feeds.push((Cow::Owned(name.clone()), tensor.into()));
        }

        let outputs = self.session.run(feeds)?;

        let mut columns = Vec::with_capacity(self.outputs.len());
        for name in &self.outputs {
            let output = outputs
                .get(name.as_str())
                .ok_or_else(|| format!("session produced no `{}` output", name))?;
            let (_shape, data) = output.try_extract_tensor::<f32>()?;
            let column = split_rows(name, data, rows)?;
            columns.push(column);
        }

        debug!(rows = rows, outputs = columns.len(), "ONNX batch complete");
        Ok(OutputTensors::new(columns))
    }
}

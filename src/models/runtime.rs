//! Execution contexts: the callable half of a loaded artifact

use crate::error::{BoxError, PredictorError, Result};
use crate::models::signature::Signature;
use crate::types::{NormalizedInput, Value};
use serde::Deserialize;
use std::collections::HashMap;

/// Output tensors of one batch, one column per signature output (in
/// signature order), each column holding one value per batch row.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensors {
    columns: Vec<Vec<Value>>,
}

impl OutputTensors {
    pub fn new(columns: Vec<Vec<Value>>) -> Self {
        Self { columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Transpose into per-row output vectors, checking every column has `rows` entries.
    pub fn into_rows(self, rows: usize) -> std::result::Result<Vec<Vec<Value>>, String> {
        if let Some((idx, col)) = self
            .columns
            .iter()
            .enumerate()
            .find(|(_, col)| col.len() != rows)
        {
            return Err(format!(
                "output {} returned {} rows for a batch of {}",
                idx,
                col.len(),
                rows
            ));
        }

        let width = self.columns.len();
        let mut out: Vec<Vec<Value>> = (0..rows).map(|_| Vec::with_capacity(width)).collect();
        for column in self.columns {
            for (row, value) in out.iter_mut().zip(column) {
                row.push(value);
            }
        }
        Ok(out)
    }
}

/// Split a flat row-major output buffer into one value per batch row: a
/// scalar when each row holds one element, a list otherwise.
#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
pub(crate) fn split_rows<T: Copy + Into<f64>>(
    name: &str,
    data: &[T],
    rows: usize,
) -> std::result::Result<Vec<Value>, String> {
    if rows == 0 {
        return Ok(Vec::new());
    }
    if data.is_empty() || data.len() % rows != 0 {
        return Err(format!(
            "output `{}` has {} elements, not a whole number of values per row for {} rows",
            name,
            data.len(),
            rows
        ));
    }

    let width = data.len() / rows;
    Ok(data
        .chunks(width)
        .map(|cells| match cells {
            [single] => Value::Float((*single).into()),
            _ => Value::List(cells.iter().map(|&v| Value::Float(v.into())).collect()),
        })
        .collect())
}

/// A loaded, stateful model entry point.
///
/// A context is owned by exactly one worker; it is never shared between
/// threads without external synchronization.
pub trait ExecutionContext: Send {
    /// Backend name, for logging.
    fn backend(&self) -> &'static str;

    /// Run the model on one batch of normalized inputs.
    fn run(&mut self, batch: &[NormalizedInput]) -> std::result::Result<OutputTensors, BoxError>;
}

/// Weights of one input in `model.json`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeatureWeights {
    /// `value * weight` (multi-valued inputs sum their values)
    Numeric { weight: f64 },
    /// Weight looked up by `fnv1a64(value) % weights.len()` (multi-valued inputs mean-pool)
    Hashed { weights: Vec<f64> },
}

/// On-disk form of `model.json`
#[derive(Debug, Clone, Deserialize)]
pub struct WideModelSpec {
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub features: HashMap<String, FeatureWeights>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WideOutput {
    Logits,
    Probs,
}

/// In-process wide (logistic) model over the signature's inputs.
#[derive(Debug, Clone)]
pub struct WideModel {
    bias: f64,
    /// Weights per input position; `None` for inputs the model ignores
    terms: Vec<Option<FeatureWeights>>,
    outputs: Vec<WideOutput>,
}

impl WideModel {
    pub fn from_spec(spec: WideModelSpec, signature: &Signature) -> Result<Self> {
        let mut terms: Vec<Option<FeatureWeights>> = vec![None; signature.input_count()];
        for (tensor, weights) in spec.features {
            let position = signature.input_position(&tensor).ok_or_else(|| {
                PredictorError::SignatureMismatch(format!(
                    "model weights reference undeclared input `{}`",
                    tensor
                ))
            })?;
            if let FeatureWeights::Hashed { weights } = &weights {
                if weights.is_empty() {
                    return Err(PredictorError::SignatureMismatch(format!(
                        "hashed input `{}` has no buckets",
                        tensor
                    )));
                }
            }
            terms[position] = Some(weights);
        }

        let outputs = signature
            .outputs()
            .iter()
            .map(|o| match o.name.as_str() {
                "logits" => Ok(WideOutput::Logits),
                "probs" => Ok(WideOutput::Probs),
                other => Err(PredictorError::SignatureMismatch(format!(
                    "wide model cannot produce output `{}`",
                    other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            bias: spec.bias,
            terms,
            outputs,
        })
    }

    fn logit(&self, input: &NormalizedInput) -> std::result::Result<f64, BoxError> {
        if input.len() != self.terms.len() {
            return Err(format!(
                "expected {} feature values, got {}",
                self.terms.len(),
                input.len()
            )
            .into());
        }

        let mut sum = self.bias;
        for (position, (term, value)) in self.terms.iter().zip(input.values()).enumerate() {
            let contribution = match term {
                None => 0.0,
                Some(FeatureWeights::Numeric { weight }) => numeric_term(value, position)? * weight,
                Some(FeatureWeights::Hashed { weights }) => hashed_term(value, weights),
            };
            sum += contribution;
        }
        Ok(sum)
    }
}

impl ExecutionContext for WideModel {
    fn backend(&self) -> &'static str {
        "wide"
    }

    fn run(&mut self, batch: &[NormalizedInput]) -> std::result::Result<OutputTensors, BoxError> {
        let logits = batch
            .iter()
            .map(|input| self.logit(input))
            .collect::<std::result::Result<Vec<f64>, BoxError>>()?;

        let columns = self
            .outputs
            .iter()
            .map(|output| match output {
                WideOutput::Logits => logits.iter().map(|&l| Value::Float(l)).collect(),
                WideOutput::Probs => logits.iter().map(|&l| Value::Float(sigmoid(l))).collect(),
            })
            .collect();

        Ok(OutputTensors::new(columns))
    }
}

fn numeric_term(value: &Value, position: usize) -> std::result::Result<f64, BoxError> {
    match value {
        Value::List(items) => items.iter().map(|v| numeric_term(v, position)).sum(),
        other => other
            .as_f64()
            .ok_or_else(|| format!("input {} is not numeric: {:?}", position, other).into()),
    }
}

fn hashed_term(value: &Value, weights: &[f64]) -> f64 {
    let bucket =
        |v: &Value| weights[(fnv1a64(v.hash_key().as_bytes()) % weights.len() as u64) as usize];
    match value {
        Value::List(items) if items.is_empty() => 0.0,
        Value::List(items) => items.iter().map(bucket).sum::<f64>() / items.len() as f64,
        scalar => bucket(scalar),
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// 64-bit FNV-1a, stable across platforms and runs.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        state ^= *b as u64;
        state = state.wrapping_mul(0x0000_0100_0000_01b3);
    }
    state
}

//! Declared input/output signature of a model artifact

use crate::error::{PredictorError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Element type of an input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    #[default]
    String,
    Int,
    Float,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::String => "string",
            DType::Int => "int",
            DType::Float => "float",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an input takes one value or a list of values per record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Arity {
    #[default]
    Scalar,
    Multi,
}

fn default_separator() -> String {
    "|".to_string()
}

/// One declared model input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    /// Tensor name inside the artifact
    pub name: String,
    #[serde(default)]
    pub dtype: DType,
    #[serde(default)]
    pub arity: Arity,
    /// Separator for multi-valued inputs supplied as a single text
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Substituted when the supplied value is empty
    #[serde(default)]
    pub default: Option<String>,
}

impl InputSpec {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
            arity: Arity::Scalar,
            separator: default_separator(),
            default: None,
        }
    }

    pub fn multi(mut self, separator: impl Into<String>) -> Self {
        self.arity = Arity::Multi;
        self.separator = separator.into();
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// One declared model output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// On-disk form of `signature.json`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SignatureFile {
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
}

/// Caller field name to tensor name table, for artifacts whose placeholders
/// were renamed on export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputMap(IndexMap<String, String>);

impl InputMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, caller: impl Into<String>, tensor: impl Into<String>) {
        self.0.insert(caller.into(), tensor.into());
    }

    /// Entries of `other` win over entries already present.
    pub fn merge(&mut self, other: &InputMap) {
        for (caller, tensor) in &other.0 {
            self.0.insert(caller.clone(), tensor.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InputMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Ordered inputs and outputs of a loaded artifact. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    inputs: Vec<InputSpec>,
    outputs: Vec<OutputSpec>,
    /// Caller-facing name per input position
    caller_names: Vec<String>,
}

impl Signature {
    pub fn new(inputs: Vec<InputSpec>, outputs: Vec<OutputSpec>) -> Result<Self> {
        if inputs.is_empty() {
            return Err(PredictorError::SignatureMismatch(
                "artifact declares no inputs".to_string(),
            ));
        }
        if outputs.is_empty() {
            return Err(PredictorError::SignatureMismatch(
                "artifact declares no outputs".to_string(),
            ));
        }
        ensure_unique("input", inputs.iter().map(|i| i.name.as_str()))?;
        ensure_unique("output", outputs.iter().map(|o| o.name.as_str()))?;
        if let Some(input) = inputs
            .iter()
            .find(|i| i.arity == Arity::Multi && i.separator.is_empty())
        {
            return Err(PredictorError::SignatureMismatch(format!(
                "multi-valued input `{}` has an empty separator",
                input.name
            )));
        }

        let caller_names = inputs.iter().map(|i| i.name.clone()).collect();
        Ok(Self {
            inputs,
            outputs,
            caller_names,
        })
    }

    /// Resolve caller names through a rename table.
    ///
    /// Every input tensor must be the target of exactly one entry and every
    /// entry must name a declared tensor.
    pub fn with_input_map(mut self, map: &InputMap) -> Result<Self> {
        if map.is_empty() {
            return Ok(self);
        }

        let mut callers: Vec<Option<String>> = vec![None; self.inputs.len()];
        for (caller, tensor) in map.iter() {
            let position = self.input_position(tensor).ok_or_else(|| {
                PredictorError::SignatureMismatch(format!(
                    "field `{}` maps to unknown input tensor `{}`",
                    caller, tensor
                ))
            })?;
            if let Some(previous) = &callers[position] {
                return Err(PredictorError::SignatureMismatch(format!(
                    "input tensor `{}` is mapped from both `{}` and `{}`",
                    tensor, previous, caller
                )));
            }
            callers[position] = Some(caller.to_string());
        }

        let mut caller_names = Vec::with_capacity(callers.len());
        for (position, caller) in callers.into_iter().enumerate() {
            match caller {
                Some(name) => caller_names.push(name),
                None => {
                    return Err(PredictorError::SignatureMismatch(format!(
                        "no caller field mapped to input tensor `{}`",
                        self.inputs[position].name
                    )))
                }
            }
        }
        self.caller_names = caller_names;
        Ok(self)
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Caller-facing field name for the input at `position`.
    pub fn caller_name(&self, position: usize) -> &str {
        &self.caller_names[position]
    }

    pub fn caller_names(&self) -> &[String] {
        &self.caller_names
    }

    pub fn input_position(&self, tensor: &str) -> Option<usize> {
        self.inputs.iter().position(|i| i.name == tensor)
    }

    pub fn output_position(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o.name == name)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|o| o.name.as_str())
    }
}

fn ensure_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashMap::new();
    for (idx, name) in names.enumerate() {
        if let Some(first) = seen.insert(name, idx) {
            return Err(PredictorError::SignatureMismatch(format!(
                "duplicate {} name `{}` at positions {} and {}",
                kind, name, first, idx
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_inputs() -> Signature {
        Signature::new(
            vec![
                InputSpec::new("input_1", DType::String),
                InputSpec::new("input_2", DType::Float),
            ],
            vec![OutputSpec::new("probs")],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_signature_rejected() {
        let err = Signature::new(vec![], vec![OutputSpec::new("probs")]).unwrap_err();
        assert!(matches!(err, PredictorError::SignatureMismatch(_)));

        let err = Signature::new(vec![InputSpec::new("a", DType::Int)], vec![]).unwrap_err();
        assert!(matches!(err, PredictorError::SignatureMismatch(_)));
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let err = Signature::new(
            vec![
                InputSpec::new("a", DType::Int),
                InputSpec::new("a", DType::Int),
            ],
            vec![OutputSpec::new("probs")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate input"));
    }

    #[test]
    fn test_caller_names_default_to_tensor_names() {
        let sig = two_inputs();
        assert_eq!(sig.caller_names(), &["input_1", "input_2"]);
    }

    #[test]
    fn test_input_map_renames_callers() {
        let map: InputMap = [("price", "input_2"), ("user_id", "input_1")]
            .into_iter()
            .collect();
        let sig = two_inputs().with_input_map(&map).unwrap();
        assert_eq!(sig.caller_name(0), "user_id");
        assert_eq!(sig.caller_name(1), "price");
    }

    #[test]
    fn test_input_map_missing_tensor_is_error() {
        let map: InputMap = [("user_id", "input_1")].into_iter().collect();
        let err = two_inputs().with_input_map(&map).unwrap_err();
        assert!(err.to_string().contains("input_2"));
    }

    #[test]
    fn test_input_map_unknown_tensor_is_error() {
        let map: InputMap = [("user_id", "input_1"), ("price", "input_9")]
            .into_iter()
            .collect();
        let err = two_inputs().with_input_map(&map).unwrap_err();
        assert!(err.to_string().contains("input_9"));
    }

    #[test]
    fn test_signature_file_defaults() {
        let file: SignatureFile = serde_json::from_str(
            r#"{"inputs": [{"name": "tags", "arity": "multi"}, {"name": "price", "dtype": "float"}],
                "outputs": [{"name": "probs"}]}"#,
        )
        .unwrap();
        assert_eq!(file.inputs[0].dtype, DType::String);
        assert_eq!(file.inputs[0].separator, "|");
        assert_eq!(file.inputs[1].arity, Arity::Scalar);
    }
}

//! Merging raw model outputs with reserved input columns

use crate::error::{PredictorError, Result};
use crate::models::signature::Signature;
use crate::types::{PredictionResult, Value};
use serde::Deserialize;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Keyword selecting every column
pub const ALL_COLUMNS: &str = "ALL_COLUMNS";

/// Which columns (reserved inputs or outputs) to keep.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum ColumnSelection {
    #[default]
    All,
    /// Named subset, kept in the order given
    Named(Vec<String>),
}

impl ColumnSelection {
    pub fn none() -> Self {
        ColumnSelection::Named(Vec::new())
    }

    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnSelection::Named(names.into_iter().map(Into::into).collect())
    }
}

impl FromStr for ColumnSelection {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim() == ALL_COLUMNS {
            return Ok(ColumnSelection::All);
        }
        Ok(ColumnSelection::Named(
            s.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }
}

impl From<String> for ColumnSelection {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(selection) => selection,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for ColumnSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelection::All => f.write_str(ALL_COLUMNS),
            ColumnSelection::Named(names) => f.write_str(&names.join(",")),
        }
    }
}

/// Builds caller-visible records: reserved columns first, then the selected
/// outputs in signature order. Values pass through untouched.
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    /// (signature position, name) of each written output
    outputs: Vec<(usize, String)>,
}

impl ResultAssembler {
    /// Keep every declared output.
    pub fn all(signature: &Signature) -> Self {
        Self {
            outputs: signature
                .output_names()
                .enumerate()
                .map(|(pos, name)| (pos, name.to_string()))
                .collect(),
        }
    }

    /// Keep only `selection`; unknown output names are a signature mismatch.
    pub fn new(signature: &Signature, selection: &ColumnSelection) -> Result<Self> {
        let names = match selection {
            ColumnSelection::All => return Ok(Self::all(signature)),
            ColumnSelection::Named(names) => names,
        };

        let mut positions = names
            .iter()
            .map(|name| {
                signature.output_position(name).ok_or_else(|| {
                    PredictorError::SignatureMismatch(format!(
                        "requested output `{}` is not declared by the artifact",
                        name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        positions.sort_unstable();
        positions.dedup();

        Ok(Self {
            outputs: positions
                .into_iter()
                .map(|pos| (pos, signature.outputs()[pos].name.clone()))
                .collect(),
        })
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(_, name)| name.as_str())
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Merge one row's raw outputs (all signature outputs, in order) with its reserved columns.
    pub fn assemble<I, K>(&self, raw_outputs: Vec<Value>, reserved: I) -> PredictionResult
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let reserved = reserved.into_iter();
        let mut result = PredictionResult::with_capacity(reserved.size_hint().0 + self.outputs.len());
        for (name, value) in reserved {
            result.insert(name, value);
        }

        let mut raw: Vec<Option<Value>> = raw_outputs.into_iter().map(Some).collect();
        for (pos, name) in &self.outputs {
            if let Some(value) = raw.get_mut(*pos).and_then(Option::take) {
                result.insert(name.clone(), value);
            }
        }
        result
    }
}

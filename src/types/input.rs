//! Caller-supplied records and their canonical, signature-ordered form

use crate::types::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value of one named field: a single (possibly delimited) text or an already-split list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::List(v)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(v: Vec<&str>) -> Self {
        FieldValue::List(v.into_iter().map(str::to_string).collect())
    }
}

/// One caller-supplied record, in any of the supported shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawInput {
    /// Ordered field strings, assigned to signature inputs by position
    PositionalList(Vec<String>),
    /// Field name to value, looked up by (possibly remapped) input name
    NamedMap(HashMap<String, FieldValue>),
    /// A single string holding all features joined by the feature separator
    DelimitedLine(String),
}

impl RawInput {
    pub fn positional<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RawInput::PositionalList(fields.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        RawInput::NamedMap(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn delimited(line: impl Into<String>) -> Self {
        RawInput::DelimitedLine(line.into())
    }

    /// Short name of the shape, for logging.
    pub fn shape(&self) -> &'static str {
        match self {
            RawInput::PositionalList(_) => "list",
            RawInput::NamedMap(_) => "map",
            RawInput::DelimitedLine(_) => "line",
        }
    }
}

/// Feature values aligned 1:1 with the signature's input order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedInput {
    values: Vec<Value>,
}

impl NormalizedInput {
    pub(crate) fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_input_deserializes_all_shapes() {
        let list: RawInput = serde_json::from_str(r#"["1", "2"]"#).unwrap();
        assert_eq!(list, RawInput::positional(["1", "2"]));

        let map: RawInput = serde_json::from_str(r#"{"a": "1", "b": ["x", "y"]}"#).unwrap();
        match map {
            RawInput::NamedMap(fields) => {
                assert_eq!(fields["a"], FieldValue::from("1"));
                assert_eq!(fields["b"], FieldValue::from(vec!["x", "y"]));
            }
            other => panic!("unexpected shape {}", other.shape()),
        }

        let line: RawInput = serde_json::from_str(r#""1\u0002x""#).unwrap();
        assert_eq!(line, RawInput::delimited("1\u{2}x"));
    }
}

//! Caller-visible prediction record

use crate::types::value::Value;
use indexmap::IndexMap;
use serde::Serialize;

/// One prediction: reserved input columns first (original order), then
/// requested outputs (signature order).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PredictionResult {
    fields: IndexMap<String, Value>,
}

impl PredictionResult {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Numeric output by name, e.g. `result.get_f64("probs")`.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serializes_in_insertion_order() {
        let mut result = PredictionResult::with_capacity(3);
        result.insert("user_id", Value::from("u1"));
        result.insert("logits", Value::Float(-0.25));
        result.insert("probs", Value::Float(0.4378));

        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#"{"user_id":"u1","logits":-0.25,"probs":0.4378}"#);
        assert_eq!(result.get_f64("probs"), Some(0.4378));
    }
}

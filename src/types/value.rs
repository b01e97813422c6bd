//! Typed scalar/list values flowing through the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between elements of a list value in its text form
pub const LIST_SEP: &str = ",";

/// A typed feature or output value.
///
/// Floats are kept as `f64` end to end and formatted with Rust's shortest
/// round-trip representation, so nothing is rounded on the way out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    /// Numeric view of the value (lists and non-numeric text yield `None`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(s) => s.parse().ok(),
            Value::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Stable textual key used for hashing categorical values.
    pub fn hash_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(LIST_SEP)?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_display_keeps_precision() {
        let v = Value::Float(0.123_456_789_012_345_67);
        let parsed: f64 = v.to_string().parse().unwrap();
        assert_eq!(parsed, 0.123_456_789_012_345_67);
    }

    #[test]
    fn test_list_display() {
        let v = Value::List(vec![Value::Int(1), Value::Float(0.5), "a".into()]);
        assert_eq!(v.to_string(), "1,0.5,a");
    }

    #[test]
    fn test_as_f64() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::from("2.5").as_f64(), Some(2.5));
        assert_eq!(Value::List(vec![]).as_f64(), None);
    }
}

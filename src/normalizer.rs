//! Input normalization: any supported record shape into signature-ordered features.
//!
//! Everything downstream of this module sees only [`NormalizedInput`]; the
//! executor never branches on whether the caller sent a list, a map or a raw
//! delimited line.

use crate::error::ShapeError;
use crate::models::signature::{Arity, DType, InputSpec, Signature};
use crate::types::{FieldValue, NormalizedInput, RawInput, Value};
use std::sync::Arc;

/// Default separator between features of a [`RawInput::DelimitedLine`].
pub const DEFAULT_FEATURE_SEP: &str = "\u{2}";

/// Converts raw records into [`NormalizedInput`] against a fixed signature.
#[derive(Debug, Clone)]
pub struct InputNormalizer {
    signature: Arc<Signature>,
    feature_sep: String,
    /// Trailing non-signature columns a positional record may carry
    passthrough: usize,
}

impl InputNormalizer {
    pub fn new(signature: Arc<Signature>) -> Self {
        Self {
            signature,
            feature_sep: DEFAULT_FEATURE_SEP.to_string(),
            passthrough: 0,
        }
    }

    pub fn with_feature_sep(mut self, sep: impl Into<String>) -> Self {
        self.feature_sep = sep.into();
        self
    }

    /// Accept up to `columns` extra trailing fields on positional records.
    pub fn with_passthrough(mut self, columns: usize) -> Self {
        self.passthrough = columns;
        self
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn feature_sep(&self) -> &str {
        &self.feature_sep
    }

    /// Normalize one record.
    pub fn normalize(&self, raw: &RawInput) -> Result<NormalizedInput, ShapeError> {
        match raw {
            RawInput::PositionalList(fields) => self.normalize_fields(fields),
            RawInput::NamedMap(fields) => {
                let values = self
                    .signature
                    .inputs()
                    .iter()
                    .enumerate()
                    .map(|(position, spec)| {
                        let caller = self.signature.caller_name(position);
                        match fields.get(caller) {
                            Some(FieldValue::Text(text)) => parse_text(spec, text),
                            Some(FieldValue::List(items)) => parse_list(spec, items),
                            None => Err(ShapeError::MissingField(caller.to_string())),
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(NormalizedInput::new(values))
            }
            RawInput::DelimitedLine(line) => {
                let fields: Vec<&str> = line.split(self.feature_sep.as_str()).collect();
                self.normalize_fields(&fields)
            }
        }
    }

    /// Assign `fields` to signature inputs by position.
    pub fn normalize_fields<S: AsRef<str>>(
        &self,
        fields: &[S],
    ) -> Result<NormalizedInput, ShapeError> {
        let expected = self.signature.input_count();
        if fields.len() < expected {
            return Err(ShapeError::TooFewFields {
                expected,
                got: fields.len(),
            });
        }
        if fields.len() > expected + self.passthrough {
            return Err(ShapeError::TooManyFields {
                expected: expected + self.passthrough,
                got: fields.len(),
            });
        }

        let values = self
            .signature
            .inputs()
            .iter()
            .zip(fields)
            .map(|(spec, field)| parse_text(spec, field.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NormalizedInput::new(values))
    }
}

/// A single text value: split for multi-valued inputs, parsed for scalars.
fn parse_text(spec: &InputSpec, text: &str) -> Result<Value, ShapeError> {
    let text = match (&spec.default, text.is_empty()) {
        (Some(default), true) => default.as_str(),
        _ => text,
    };
    match spec.arity {
        Arity::Scalar => parse_scalar(spec, text),
        Arity::Multi if text.is_empty() => Ok(Value::List(Vec::new())),
        Arity::Multi => text
            .split(spec.separator.as_str())
            .map(|item| parse_scalar(spec, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
    }
}

/// An already-split list value.
fn parse_list(spec: &InputSpec, items: &[String]) -> Result<Value, ShapeError> {
    match spec.arity {
        Arity::Multi => items
            .iter()
            .map(|item| parse_scalar(spec, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Arity::Scalar if items.len() == 1 => parse_text(spec, &items[0]),
        Arity::Scalar => Err(ShapeError::Arity {
            field: spec.name.clone(),
            got: items.len(),
        }),
    }
}

fn parse_scalar(spec: &InputSpec, text: &str) -> Result<Value, ShapeError> {
    let parse_err = || ShapeError::Parse {
        field: spec.name.clone(),
        value: text.to_string(),
        dtype: spec.dtype.as_str(),
    };
    match spec.dtype {
        DType::String => Ok(Value::Text(text.to_string())),
        DType::Int => text.trim().parse().map(Value::Int).map_err(|_| parse_err()),
        DType::Float => text.trim().parse().map(Value::Float).map_err(|_| parse_err()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::signature::{InputMap, OutputSpec};

    fn signature() -> Arc<Signature> {
        Arc::new(
            Signature::new(
                vec![
                    InputSpec::new("user_id", DType::String),
                    InputSpec::new("age_level", DType::Int),
                    InputSpec::new("tag_category_list", DType::String).multi("|"),
                    InputSpec::new("price", DType::Float).with_default("0"),
                ],
                vec![OutputSpec::new("probs")],
            )
            .unwrap(),
        )
    }

    fn expected() -> NormalizedInput {
        NormalizedInput::new(vec![
            Value::from("u1"),
            Value::Int(3),
            Value::List(vec![Value::from("12"), Value::from("23")]),
            Value::Float(9.5),
        ])
    }

    #[test]
    fn test_all_shapes_normalize_identically() {
        let normalizer = InputNormalizer::new(signature());

        let list = RawInput::positional(["u1", "3", "12|23", "9.5"]);
        let delimited_map = RawInput::named([
            ("user_id", FieldValue::from("u1")),
            ("age_level", FieldValue::from("3")),
            ("tag_category_list", FieldValue::from("12|23")),
            ("price", FieldValue::from("9.5")),
        ]);
        let split_map = RawInput::named([
            ("user_id", FieldValue::from("u1")),
            ("age_level", FieldValue::from(vec!["3"])),
            ("tag_category_list", FieldValue::from(vec!["12", "23"])),
            ("price", FieldValue::from("9.5")),
        ]);
        let line = RawInput::delimited("u1\u{2}3\u{2}12|23\u{2}9.5");

        for raw in [list, delimited_map, split_map, line] {
            assert_eq!(normalizer.normalize(&raw).unwrap(), expected(), "{}", raw.shape());
        }
    }

    #[test]
    fn test_positional_field_count() {
        let normalizer = InputNormalizer::new(signature());

        let err = normalizer
            .normalize(&RawInput::positional(["u1", "3", "12"]))
            .unwrap_err();
        assert_eq!(err, ShapeError::TooFewFields { expected: 4, got: 3 });

        let err = normalizer
            .normalize(&RawInput::positional(["u1", "3", "12", "1", "extra"]))
            .unwrap_err();
        assert_eq!(err, ShapeError::TooManyFields { expected: 4, got: 5 });

        let normalizer = normalizer.with_passthrough(1);
        let normalized = normalizer
            .normalize(&RawInput::positional(["u1", "3", "12|23", "9.5", "extra"]))
            .unwrap();
        assert_eq!(normalized, expected());
    }

    #[test]
    fn test_missing_named_field() {
        let normalizer = InputNormalizer::new(signature());
        let raw = RawInput::named([("user_id", "u1"), ("age_level", "3"), ("price", "1")]);
        assert_eq!(
            normalizer.normalize(&raw).unwrap_err(),
            ShapeError::MissingField("tag_category_list".to_string())
        );
    }

    #[test]
    fn test_renamed_inputs_looked_up_by_caller_name() {
        let sig = Signature::new(
            vec![
                InputSpec::new("input_1", DType::String),
                InputSpec::new("input_2", DType::Float),
            ],
            vec![OutputSpec::new("probs")],
        )
        .unwrap();
        let map: InputMap = [("user_id", "input_1"), ("price", "input_2")]
            .into_iter()
            .collect();
        let normalizer = InputNormalizer::new(Arc::new(sig.with_input_map(&map).unwrap()));

        let normalized = normalizer
            .normalize(&RawInput::named([("price", "2"), ("user_id", "u9")]))
            .unwrap();
        assert_eq!(normalized.values(), &[Value::from("u9"), Value::Float(2.0)]);

        let err = normalizer
            .normalize(&RawInput::named([("input_1", "u9"), ("input_2", "2")]))
            .unwrap_err();
        assert_eq!(err, ShapeError::MissingField("user_id".to_string()));
    }

    #[test]
    fn test_empty_values() {
        let normalizer = InputNormalizer::new(signature());
        let normalized = normalizer
            .normalize(&RawInput::positional(["", "3", "", ""]))
            .unwrap();
        assert_eq!(normalized.get(0), Some(&Value::from("")));
        assert_eq!(normalized.get(2), Some(&Value::List(vec![])));
        assert_eq!(normalized.get(3), Some(&Value::Float(0.0)));

        let err = normalizer
            .normalize(&RawInput::positional(["u1", "", "", ""]))
            .unwrap_err();
        assert!(matches!(err, ShapeError::Parse { dtype: "int", .. }));
    }

    #[test]
    fn test_list_for_scalar_input() {
        let normalizer = InputNormalizer::new(signature());
        let raw = RawInput::named([
            ("user_id", FieldValue::from(vec!["a", "b"])),
            ("age_level", FieldValue::from("3")),
            ("tag_category_list", FieldValue::from("1")),
            ("price", FieldValue::from("1")),
        ]);
        assert_eq!(
            normalizer.normalize(&raw).unwrap_err(),
            ShapeError::Arity {
                field: "user_id".to_string(),
                got: 2
            }
        );
    }

    #[test]
    fn test_custom_feature_separator() {
        let normalizer = InputNormalizer::new(signature()).with_feature_sep(";");
        let normalized = normalizer
            .normalize(&RawInput::delimited("u1;3;12|23;9.5"))
            .unwrap();
        assert_eq!(normalized, expected());
    }
}

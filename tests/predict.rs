mod common;

use common::*;
use predictor_engine::{FieldValue, LoadOptions, Predictor, PredictorError, RawInput, ShapeError};

fn list_inputs(n: usize) -> Vec<RawInput> {
    (0..n)
        .map(|i| {
            let (user, tags, price) = record(i);
            RawInput::positional([user, tags.join("|"), price])
        })
        .collect()
}

fn dict_inputs(n: usize) -> Vec<RawInput> {
    (0..n)
        .map(|i| {
            let (user, tags, price) = record(i);
            RawInput::named([
                ("user_id", FieldValue::from(user)),
                ("tags", FieldValue::from(tags)),
                ("price", FieldValue::from(price)),
            ])
        })
        .collect()
}

#[test]
fn test_predict_list_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut predictor = Predictor::load(write_artifact(dir.path())).unwrap();
    assert_eq!(predictor.backend(), "wide");

    let results = predictor.predict(&list_inputs(100), 32).unwrap();
    assert_eq!(results.len(), 100);
    for (i, result) in results.iter().enumerate() {
        let names: Vec<&str> = result.names().collect();
        assert_eq!(names, vec!["logits", "probs"]);
        let prob = result.get_f64("probs").unwrap();
        assert!((prob - reference_prob(i)).abs() < 1e-12, "record {}", i);
    }
    assert_eq!(predictor.metrics().records(), 100);
    assert_eq!(predictor.metrics().get_batch_stats().count, 4);
}

#[test]
fn test_predict_dict_matches_list() {
    let dir = tempfile::tempdir().unwrap();
    let mut predictor = Predictor::load(write_artifact(dir.path())).unwrap();

    let from_list = predictor.predict(&list_inputs(100), 32).unwrap();
    let from_dict = predictor.predict(&dict_inputs(100), 32).unwrap();
    assert_eq!(from_list, from_dict);
}

#[test]
fn test_predict_renamed_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut predictor = Predictor::load(write_renamed_artifact(dir.path())).unwrap();
    assert_eq!(predictor.signature().caller_names(), &["user_id", "tags", "price"]);

    let results = predictor.predict(&dict_inputs(100), 32).unwrap();
    assert_eq!(results.len(), 100);
    for (i, result) in results.iter().enumerate() {
        assert!((result.get_f64("probs").unwrap() - reference_prob(i)).abs() < 1e-12);
    }
}

#[test]
fn test_load_options_override_input_map() {
    let dir = tempfile::tempdir().unwrap();
    let model_dir = write_renamed_artifact(dir.path());

    let mut options = LoadOptions::default();
    options.input_map.insert("uid", "input_1");
    options.input_map.insert("user_id", "input_x");
    let err = Predictor::load_with(&model_dir, options).unwrap_err();
    assert!(matches!(err, PredictorError::SignatureMismatch(_)));
}

#[test]
fn test_batch_size_does_not_change_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut predictor = Predictor::load(write_artifact(dir.path())).unwrap();

    let reference = predictor.predict(&list_inputs(37), 1).unwrap();
    for batch_size in [2, 5, 32, 37, 100] {
        assert_eq!(predictor.predict(&list_inputs(37), batch_size).unwrap(), reference);
    }
}

#[test]
fn test_empty_input_yields_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut predictor = Predictor::load(write_artifact(dir.path())).unwrap();
    assert!(predictor.predict(&[], 32).unwrap().is_empty());
}

#[test]
fn test_bad_record_fails_whole_call() {
    let dir = tempfile::tempdir().unwrap();
    let mut predictor = Predictor::load(write_artifact(dir.path())).unwrap();

    let mut inputs = list_inputs(10);
    inputs[5] = RawInput::positional(["u1", "t1"]);
    let err = predictor.predict(&inputs, 4).unwrap_err();
    assert!(matches!(
        err,
        PredictorError::InputShape {
            record: 5,
            source: ShapeError::TooFewFields { expected: 3, got: 2 }
        }
    ));

    let mut inputs = list_inputs(3);
    inputs[2] = RawInput::positional(["u1", "t1", "cheap"]);
    let err = predictor.predict(&inputs, 4).unwrap_err();
    assert!(matches!(
        err,
        PredictorError::InputShape {
            record: 2,
            source: ShapeError::Parse { dtype: "float", .. }
        }
    ));
}

#[test]
fn test_zero_batch_size_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut predictor = Predictor::load(write_artifact(dir.path())).unwrap();
    assert!(matches!(
        predictor.predict(&list_inputs(1), 0),
        Err(PredictorError::InvalidOptions(_))
    ));
}

#[test]
fn test_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let err = Predictor::load(dir.path()).unwrap_err();
    assert!(matches!(err, PredictorError::ArtifactNotFound { .. }));

    let err = Predictor::load(dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, PredictorError::ArtifactNotFound { .. }));
}

#[test]
fn test_delimited_line_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut predictor = Predictor::load(write_artifact(dir.path())).unwrap();

    let inputs: Vec<RawInput> = (0..20)
        .map(|i| {
            let (user, tags, price) = record(i);
            RawInput::delimited(format!("{}\u{2}{}\u{2}{}", user, tags.join("|"), price))
        })
        .collect();
    let results = predictor.predict(&inputs, 8).unwrap();
    for (i, result) in results.iter().enumerate() {
        assert!((result.get_f64("probs").unwrap() - reference_prob(i)).abs() < 5e-5);
    }
}

#[test]
fn test_passthrough_columns_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path());

    let inputs: Vec<RawInput> = (0..5)
        .map(|i| {
            let (user, tags, price) = record(i);
            RawInput::positional([user, tags.join("|"), price, format!("row-{}", i)])
        })
        .collect();

    let mut strict = Predictor::load(&artifact).unwrap();
    let err = strict.predict(&inputs, 2).unwrap_err();
    assert!(matches!(
        err,
        PredictorError::InputShape {
            record: 0,
            source: ShapeError::TooManyFields { expected: 3, got: 4 }
        }
    ));

    let mut lenient = Predictor::load(&artifact).unwrap().with_passthrough(1);
    let results = lenient.predict(&inputs, 2).unwrap();
    for (i, result) in results.iter().enumerate() {
        assert!((result.get_f64("probs").unwrap() - reference_prob(i)).abs() < 1e-12);
    }
}

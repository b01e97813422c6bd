//! Shared fixtures: a small wide-model artifact and matching input files.

#![allow(dead_code)]

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

pub const BIAS: f64 = -0.5;
pub const USER_BUCKETS: usize = 16;
pub const TAG_BUCKETS: usize = 8;
pub const PRICE_WEIGHT: f64 = 0.01;

pub fn user_weights() -> Vec<f64> {
    (0..USER_BUCKETS).map(|i| (i as f64 - 8.0) / 10.0).collect()
}

pub fn tag_weights() -> Vec<f64> {
    (0..TAG_BUCKETS).map(|i| (i as f64) / 8.0 - 0.4).collect()
}

/// Feature values of record `i`: (user_id, tags, price)
pub fn record(i: usize) -> (String, Vec<String>, String) {
    (
        format!("u{}", i % 13),
        vec![format!("t{}", i % 5), format!("t{}", (i + 1) % 7)],
        format!("{}", i as f64 * 0.5),
    )
}

fn fnv(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
        (h ^ b as u64).wrapping_mul(0x100_0000_01b3)
    })
}

/// Independently computed click probability of record `i`.
pub fn reference_prob(i: usize) -> f64 {
    let (user, tags, price) = record(i);
    let users = user_weights();
    let tag_w = tag_weights();

    let mut logit = BIAS;
    logit += users[(fnv(&user) % USER_BUCKETS as u64) as usize];
    logit += tags
        .iter()
        .map(|t| tag_w[(fnv(t) % TAG_BUCKETS as u64) as usize])
        .sum::<f64>()
        / tags.len() as f64;
    logit += price.parse::<f64>().unwrap() * PRICE_WEIGHT;
    1.0 / (1.0 + (-logit).exp())
}

fn write_json(path: PathBuf, value: serde_json::Value) {
    fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

/// Write an artifact whose tensors are `user_id`, `tags` and `price`.
pub fn write_artifact(dir: &Path) -> PathBuf {
    write_artifact_with_names(dir, ["user_id", "tags", "price"], false)
}

/// Same model, but tensors exported as `input_1..3` with an `input_map.json`
/// restoring the caller names.
pub fn write_renamed_artifact(dir: &Path) -> PathBuf {
    write_artifact_with_names(dir, ["input_1", "input_2", "input_3"], true)
}

fn write_artifact_with_names(dir: &Path, tensors: [&str; 3], with_map: bool) -> PathBuf {
    let model_dir = dir.join("model");
    fs::create_dir_all(&model_dir).unwrap();

    write_json(
        model_dir.join("signature.json"),
        json!({
            "inputs": [
                { "name": tensors[0], "dtype": "string" },
                { "name": tensors[1], "dtype": "string", "arity": "multi", "separator": "|" },
                { "name": tensors[2], "dtype": "float" }
            ],
            "outputs": [{ "name": "logits" }, { "name": "probs" }]
        }),
    );

    let mut features = serde_json::Map::new();
    features.insert(tensors[0].to_string(), json!({ "kind": "hashed", "weights": user_weights() }));
    features.insert(tensors[1].to_string(), json!({ "kind": "hashed", "weights": tag_weights() }));
    features.insert(tensors[2].to_string(), json!({ "kind": "numeric", "weight": PRICE_WEIGHT }));
    write_json(
        model_dir.join("model.json"),
        json!({ "bias": BIAS, "features": features }),
    );

    if with_map {
        write_json(
            model_dir.join("input_map.json"),
            json!({ "user_id": tensors[0], "tags": tensors[1], "price": tensors[2] }),
        );
    }
    model_dir
}

/// `id,user_id,tags,price` lines for records `0..n`.
pub fn csv_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let (user, tags, price) = record(i);
            format!("{},{},{},{}", i, user, tags.join("|"), price)
        })
        .collect()
}

/// `id,<user_id \x02 tags \x02 price>` lines for records `0..n`.
pub fn delimited_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let (user, tags, price) = record(i);
            format!("{},{}\u{2}{}\u{2}{}", i, user, tags.join("|"), price)
        })
        .collect()
}

pub fn write_input(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(&path, body).unwrap();
    path
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

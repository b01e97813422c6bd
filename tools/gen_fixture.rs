//! Fixture Generator
//!
//! Writes a wide-model artifact plus a matching delimited input file, for
//! exercising `predictor-engine` end to end without an exported model.

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[clap(name = "gen-fixture", about = "Generate a wide-model artifact and input file")]
struct Args {
    /// Output directory; receives `model/` and `input.csv`
    #[clap(long, default_value = "fixture")]
    out_dir: PathBuf,

    /// Number of input lines
    #[clap(long, default_value_t = 10_000)]
    rows: usize,

    /// Hash buckets per categorical feature
    #[clap(long, default_value_t = 64)]
    buckets: usize,

    /// RNG seed, for reproducible fixtures
    #[clap(long, default_value_t = 7)]
    seed: u64,
}

/// Random input lines matching the generated signature
struct RecordGenerator {
    rng: StdRng,
    counter: u64,
}

impl RecordGenerator {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            counter: 0,
        }
    }

    /// `clk,user_id,item_ids,price,clicks`
    fn generate(&mut self) -> String {
        self.counter += 1;
        let items: Vec<String> = (0..self.rng.gen_range(1..5))
            .map(|_| format!("i{}", self.rng.gen_range(0..500)))
            .collect();
        format!(
            "{},u{},{},{:.2},{}",
            u8::from(self.rng.gen_bool(0.2)),
            self.rng.gen_range(0..10_000),
            items.join("|"),
            self.rng.gen_range(1.0..500.0),
            self.rng.gen_range(0..20)
        )
    }

    fn weights(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.rng.gen_range(-0.5..0.5)).collect()
    }
}

fn write_json(path: PathBuf, value: &serde_json::Value) -> Result<()> {
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gen_fixture=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let model_dir = args.out_dir.join("model");
    fs::create_dir_all(&model_dir)?;

    let mut generator = RecordGenerator::new(args.seed);

    write_json(
        model_dir.join("signature.json"),
        &json!({
            "inputs": [
                { "name": "user_id", "dtype": "string" },
                { "name": "item_ids", "dtype": "string", "arity": "multi", "separator": "|" },
                { "name": "price", "dtype": "float", "default": "0" },
                { "name": "clicks", "dtype": "int", "default": "0" }
            ],
            "outputs": [{ "name": "logits" }, { "name": "probs" }]
        }),
    )?;
    write_json(
        model_dir.join("model.json"),
        &json!({
            "bias": -1.2,
            "features": {
                "user_id": { "kind": "hashed", "weights": generator.weights(args.buckets) },
                "item_ids": { "kind": "hashed", "weights": generator.weights(args.buckets) },
                "price": { "kind": "numeric", "weight": 0.002 },
                "clicks": { "kind": "numeric", "weight": 0.05 }
            }
        }),
    )?;
    info!(model_dir = %model_dir.display(), buckets = args.buckets, "Artifact written");

    let input_path = args.out_dir.join("input.csv");
    let mut writer = BufWriter::new(File::create(&input_path)?);
    for i in 0..args.rows {
        writeln!(writer, "{}", generator.generate())?;
        if (i + 1) % 100_000 == 0 {
            info!("Generated {}/{} lines", i + 1, args.rows);
        }
    }
    writer.flush()?;

    info!(
        input = %input_path.display(),
        rows = args.rows,
        "Completed! Score with --artifact {} --input {}",
        model_dir.display(),
        input_path.display()
    );
    Ok(())
}

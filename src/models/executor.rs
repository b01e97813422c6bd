//! Fixed-size batching over an execution context

use crate::error::{PredictorError, Result};
use crate::metrics::ScoringMetrics;
use crate::models::runtime::ExecutionContext;
use crate::types::{NormalizedInput, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Runs normalized inputs through a context in consecutive batches of
/// `batch_size` (the last one may be shorter) and returns per-row raw
/// outputs in input order.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    batch_size: usize,
    metrics: Option<Arc<ScoringMetrics>>,
}

impl BatchExecutor {
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(PredictorError::InvalidOptions(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            batch_size,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<ScoringMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run every input; one failing batch fails the whole call.
    pub fn execute(
        &self,
        context: &mut dyn ExecutionContext,
        inputs: &[NormalizedInput],
    ) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::with_capacity(inputs.len());
        for (batch_index, batch) in inputs.chunks(self.batch_size).enumerate() {
            rows.extend(self.run_batch(context, batch, batch_index)?);
        }
        Ok(rows)
    }

    /// Run a single batch, reporting failures with its index and size.
    pub fn run_batch(
        &self,
        context: &mut dyn ExecutionContext,
        batch: &[NormalizedInput],
        batch_index: usize,
    ) -> Result<Vec<Vec<Value>>> {
        let batch_size = batch.len();
        let start = Instant::now();

        let rows = context
            .run(batch)
            .and_then(|tensors| tensors.into_rows(batch_size).map_err(Into::into))
            .map_err(|source| {
                error!(
                    backend = context.backend(),
                    batch_index = batch_index,
                    batch_size = batch_size,
                    error = %source,
                    "Batch execution failed"
                );
                PredictorError::Execution {
                    batch_index,
                    batch_size,
                    source,
                }
            })?;

        let elapsed = start.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_batch(elapsed, batch_size);
        }
        debug!(
            batch_index = batch_index,
            batch_size = batch_size,
            elapsed_us = elapsed.as_micros() as u64,
            "Batch executed"
        );

        Ok(rows)
    }
}

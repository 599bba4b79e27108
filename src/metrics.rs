//! Per-job performance ledger. Process-scoped, append-only, cleared only by
//! dropping the gateway that owns it.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::engine::EngineVariant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub file: String,
    pub elapsed_seconds: f64,
    pub input_size: u64,
    pub output_size: u64,
    pub format: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub variant: EngineVariant,
    /// Monotonic per (file, variant), starting at 0, in completion order.
    pub job_index: u64,
}

/// A completed job's facts, before the ledger assigns its index.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub file: String,
    pub elapsed_seconds: f64,
    pub input_size: u64,
    pub output_size: u64,
    pub format: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub variant: EngineVariant,
}

#[derive(Default)]
struct LedgerInner {
    entries: Vec<Metric>,
    counters: HashMap<(String, EngineVariant), u64>,
}

#[derive(Default)]
pub struct MetricsLedger {
    inner: Mutex<LedgerInner>,
}

impl MetricsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record, assigning its job index at append time so indices
    /// reflect completion order.
    pub fn record(&self, sample: MetricSample) -> Metric {
        let mut inner = self.inner.lock();
        let counter = inner
            .counters
            .entry((sample.file.clone(), sample.variant))
            .or_insert(0);
        let job_index = *counter;
        *counter += 1;

        let metric = Metric {
            file: sample.file,
            elapsed_seconds: sample.elapsed_seconds,
            input_size: sample.input_size,
            output_size: sample.output_size,
            format: sample.format,
            video_codec: sample.video_codec,
            audio_codec: sample.audio_codec,
            variant: sample.variant,
            job_index,
        };
        inner.entries.push(metric.clone());
        metric
    }

    /// All records so far, in append order. Repeatable: nothing is cleared.
    pub fn snapshot(&self) -> Vec<Metric> {
        self.inner.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

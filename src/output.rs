//! Result types returned by a batch run.

use crate::error::ItemError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a single item ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Converter exited 0. `output_dir` is the (renamed) converter output folder.
    Succeeded { output_dir: PathBuf },
    /// Recoverable per-item failure.
    Failed { error: ItemError },
    /// Cancellation arrived while this item's converter was running and it
    /// did not exit cleanly. Not counted as a failure.
    Cancelled,
}

/// Record of one attempted item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    /// 1-indexed position in the batch.
    pub index: usize,
    pub source: PathBuf,
    pub base_name: String,
    /// Destination folder, once resolved.
    pub destination: Option<PathBuf>,
    pub outcome: ItemOutcome,
    pub duration_ms: u64,
}

impl ItemResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Failed { .. })
    }
}

/// Final tally of a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Inputs never attempted because the run was cancelled or hit a fatal error.
    pub not_attempted: usize,
    pub cancelled: bool,
    pub items: Vec<ItemResult>,
    pub total_duration_ms: u64,
}

impl BatchSummary {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, item: ItemResult) {
        match item.outcome {
            ItemOutcome::Succeeded { .. } => self.succeeded += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
            ItemOutcome::Cancelled => {}
        }
        self.items.push(item);
    }

    pub(crate) fn finish(&mut self, duration_ms: u64) {
        self.not_attempted = self.total.saturating_sub(self.items.len());
        self.total_duration_ms = duration_ms;
    }

    /// True when every input converted and nothing was cancelled.
    pub fn all_succeeded(&self) -> bool {
        !self.cancelled && self.succeeded == self.total
    }

    /// The closing log line shown after a complete run.
    pub fn summary_line(&self) -> String {
        format!(
            "Conversion complete: {} succeeded, {} failed",
            self.succeeded, self.failed
        )
    }
}

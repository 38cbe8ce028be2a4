//! Observer trait for batch events.
//!
//! Pass an [`Arc<dyn BatchObserver>`] to [`crate::batch::BatchRunner::run`]
//! to receive events as the orchestrator walks the batch: item boundaries,
//! the exact converter command line, every line the converter prints, and
//! the final tally.
//!
//! The orchestrator runs on a background task and never touches front-end
//! state itself. A front-end with a single-threaded event loop should use
//! [`ChannelObserver`], which turns every callback into a [`BatchEvent`]
//! message on an unbounded channel; the loop drains the receiver and applies
//! the events on its own thread.
//!
//! # Example
//!
//! ```rust
//! use marker_batch::{BatchEvent, ChannelObserver};
//!
//! let (observer, mut rx) = ChannelObserver::channel();
//! // hand `observer` to BatchRunner::run on a spawned task, then:
//! # drop(observer);
//! while let Ok(event) = rx.try_recv() {
//!     if let BatchEvent::Line { line, .. } = event {
//!         println!("{line}");
//!     }
//! }
//! ```

use crate::output::BatchSummary;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Called by the orchestrator as it processes the batch.
///
/// All methods have default no-op implementations so implementors only
/// override what they care about. Calls arrive strictly in batch order from
/// a single task, but that task is not the caller's thread, hence
/// `Send + Sync`.
pub trait BatchObserver: Send + Sync {
    /// Called once before the first item.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when an item starts.
    ///
    /// # Arguments
    /// * `index` — 1-indexed position in the batch
    /// * `total` — number of inputs in the batch
    /// * `source` — the input PDF
    fn on_item_start(&self, index: usize, total: usize, source: &Path) {
        let _ = (index, total, source);
    }

    /// The shell-style command line about to be launched.
    fn on_command(&self, index: usize, command_line: &str) {
        let _ = (index, command_line);
    }

    /// One line of converter output (stdout and stderr merged), without the
    /// trailing newline.
    fn on_output_line(&self, index: usize, line: &str) {
        let _ = (index, line);
    }

    /// The item converted successfully.
    fn on_item_success(&self, index: usize, total: usize, output_dir: &Path) {
        let _ = (index, total, output_dir);
    }

    /// The item failed; the batch continues.
    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// A non-fatal oddity worth surfacing (e.g. the output rename was skipped).
    fn on_warning(&self, index: usize, message: &str) {
        let _ = (index, message);
    }

    /// The run stopped because cancellation was requested.
    fn on_cancelled(&self, completed: usize, total: usize) {
        let _ = (completed, total);
    }

    /// The run ended early on a fatal error. Reported exactly once.
    fn on_fatal(&self, error: &str) {
        let _ = error;
    }

    /// Called once after every item was attempted and the run was not cancelled.
    fn on_batch_complete(&self, summary: &BatchSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Shared observer handle as accepted by the orchestrator.
pub type SharedObserver = Arc<dyn BatchObserver>;

/// Owned, message-form of every [`BatchObserver`] callback.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    BatchStarted { total: usize },
    ItemStarted { index: usize, total: usize, source: PathBuf },
    Command { index: usize, command_line: String },
    Line { index: usize, line: String },
    ItemSucceeded { index: usize, total: usize, output_dir: PathBuf },
    ItemFailed { index: usize, total: usize, error: String },
    Warning { index: usize, message: String },
    Cancelled { completed: usize, total: usize },
    Fatal { error: String },
    BatchCompleted(BatchSummary),
}

/// Forwards every callback as a [`BatchEvent`] over an unbounded channel.
///
/// Sends never block the orchestrator; if the receiver was dropped the
/// events are silently discarded.
#[derive(Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<BatchEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end the front-end loop drains.
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn send(&self, event: BatchEvent) {
        let _ = self.tx.send(event);
    }
}

impl BatchObserver for ChannelObserver {
    fn on_batch_start(&self, total: usize) {
        self.send(BatchEvent::BatchStarted { total });
    }

    fn on_item_start(&self, index: usize, total: usize, source: &Path) {
        self.send(BatchEvent::ItemStarted {
            index,
            total,
            source: source.to_path_buf(),
        });
    }

    fn on_command(&self, index: usize, command_line: &str) {
        self.send(BatchEvent::Command {
            index,
            command_line: command_line.to_string(),
        });
    }

    fn on_output_line(&self, index: usize, line: &str) {
        self.send(BatchEvent::Line {
            index,
            line: line.to_string(),
        });
    }

    fn on_item_success(&self, index: usize, total: usize, output_dir: &Path) {
        self.send(BatchEvent::ItemSucceeded {
            index,
            total,
            output_dir: output_dir.to_path_buf(),
        });
    }

    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        self.send(BatchEvent::ItemFailed {
            index,
            total,
            error: error.to_string(),
        });
    }

    fn on_warning(&self, index: usize, message: &str) {
        self.send(BatchEvent::Warning {
            index,
            message: message.to_string(),
        });
    }

    fn on_cancelled(&self, completed: usize, total: usize) {
        self.send(BatchEvent::Cancelled { completed, total });
    }

    fn on_fatal(&self, error: &str) {
        self.send(BatchEvent::Fatal {
            error: error.to_string(),
        });
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        self.send(BatchEvent::BatchCompleted(summary.clone()));
    }
}

//! Batch Conversion Orchestrator.
//!
//! [`BatchRunner::run`] walks the inputs of a [`BatchSettings`] snapshot in
//! order and, for each one, creates the destination folder, applies the PDF
//! disposition, runs the converter while streaming its output to the
//! observer, and marks the output folder. Exactly one converter process is
//! alive at any moment.
//!
//! ## Run state
//!
//! ```text
//!          run()                cancel()
//!  Idle ──────────▶ Running ───────────────▶ CancelRequested
//!                      │                            │
//!                      └──── done / fatal ──────────┴──▶ Finished
//! ```
//!
//! `Finished` behaves like `Idle` for the next `run`. A `run` while
//! `Running` or `CancelRequested` is refused with
//! [`BatchError::AlreadyRunning`]. The transition to `Finished` is made by a
//! guard, so it happens on every exit path.
//!
//! ## Failure model
//!
//! Per-item problems ([`ItemError`]) are tallied and the batch moves on.
//! A missing converter executable ends the batch with
//! [`BatchError::ConverterNotFound`], reported once through
//! [`BatchObserver::on_fatal`](crate::progress::BatchObserver::on_fatal).
//! Cancellation is not an error: items not yet started are simply not
//! attempted.

use crate::config::{BatchSettings, InputEntry};
use crate::error::{BatchError, ItemError};
use crate::output::{BatchSummary, ItemOutcome, ItemResult};
use crate::pipeline::command::Invocation;
use crate::pipeline::finalize::{self, Finalized};
use crate::pipeline::process::{self, LaunchError};
use crate::pipeline::{disposition, layout};
use crate::progress::SharedObserver;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Lifecycle of a [`BatchRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Running,
    CancelRequested,
    Finished,
}

struct Shared {
    state: Mutex<RunState>,
    cancel_tx: watch::Sender<bool>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs batches one at a time. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BatchRunner {
    shared: Arc<Shared>,
}

/// Requests cancellation of the runner's active batch from any thread.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchRunner {
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RunState::Idle),
                cancel_tx,
            }),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> RunState {
        *self.shared.state()
    }

    /// Convert every input of `settings`, in order.
    ///
    /// # Returns
    /// `Ok(BatchSummary)` when the batch ran to completion or was cancelled
    /// (check `summary.cancelled`), even if some items failed.
    ///
    /// # Errors
    /// Fatal conditions only: converter executable missing, inputs missing
    /// at start, no inputs, or a batch already running on this runner.
    pub async fn run(
        &self,
        settings: &BatchSettings,
        observer: SharedObserver,
    ) -> Result<BatchSummary, BatchError> {
        let _guard = self.begin()?;
        let mut cancel_rx = self.shared.cancel_tx.subscribe();
        let started = Instant::now();
        let total = settings.inputs.len();

        if let Err(e) = preflight(settings).await {
            observer.on_fatal(&e.to_string());
            return Err(e);
        }

        info!(
            "Starting conversion of {} file{}",
            total,
            if total == 1 { "" } else { "s" }
        );
        observer.on_batch_start(total);

        let mut summary = BatchSummary::new(total);

        for (i, entry) in settings.inputs.iter().enumerate() {
            if *cancel_rx.borrow() {
                debug!("Cancelled before item {}", i + 1);
                break;
            }

            let index = i + 1;
            observer.on_item_start(index, total, &entry.source);

            let outcome =
                run_item(settings, entry, index, total, &observer, &mut cancel_rx).await;
            let item = match outcome {
                Ok(item) => item,
                Err(fatal) => {
                    warn!("Batch aborted: {}", fatal);
                    observer.on_fatal(&fatal.to_string());
                    return Err(fatal);
                }
            };

            match &item.outcome {
                ItemOutcome::Succeeded { output_dir } => {
                    info!("[{}/{}] {} converted", index, total, entry.source.display());
                    observer.on_item_success(index, total, output_dir);
                }
                ItemOutcome::Failed { error } => {
                    warn!("[{}/{}] {} failed: {}", index, total, entry.source.display(), error);
                    observer.on_item_error(index, total, &error.to_string());
                }
                ItemOutcome::Cancelled => {
                    info!("[{}/{}] {} cancelled", index, total, entry.source.display());
                }
            }
            summary.record(item);
        }

        summary.cancelled = *cancel_rx.borrow();
        summary.finish(started.elapsed().as_millis() as u64);

        if summary.cancelled {
            info!("Conversion cancelled after {} of {} items", summary.items.len(), total);
            observer.on_cancelled(summary.items.len(), total);
        } else {
            info!("{}", summary.summary_line());
            observer.on_batch_complete(&summary);
        }

        Ok(summary)
    }

    fn begin(&self) -> Result<RunGuard<'_>, BatchError> {
        let mut state = self.shared.state();
        if matches!(*state, RunState::Running | RunState::CancelRequested) {
            return Err(BatchError::AlreadyRunning);
        }
        self.shared.cancel_tx.send_replace(false);
        *state = RunState::Running;
        Ok(RunGuard {
            shared: &self.shared,
        })
    }
}

impl CancelHandle {
    /// Stop the active batch: no further items start and the running
    /// converter is asked to terminate. Idempotent; no-op when idle.
    pub fn cancel(&self) {
        let mut state = self.shared.state();
        if *state == RunState::Running {
            *state = RunState::CancelRequested;
            self.shared.cancel_tx.send_replace(true);
            info!("Conversion cancelled by user");
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        *self.shared.state() == RunState::CancelRequested
    }
}

/// Returns the runner to `Finished` however `run` exits.
struct RunGuard<'a> {
    shared: &'a Shared,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.shared.state() = RunState::Finished;
    }
}

/// Every input must still exist before anything is touched.
async fn preflight(settings: &BatchSettings) -> Result<(), BatchError> {
    if settings.inputs.is_empty() {
        return Err(BatchError::InvalidConfig(
            "At least one input PDF is required".into(),
        ));
    }

    let mut missing: Vec<PathBuf> = Vec::new();
    for entry in &settings.inputs {
        if tokio::fs::metadata(&entry.source).await.is_err() {
            missing.push(entry.source.clone());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(BatchError::MissingInputs { paths: missing })
    }
}

/// Why an item stopped early.
enum Abort {
    Item(ItemError),
    Fatal(BatchError),
}

impl From<ItemError> for Abort {
    fn from(e: ItemError) -> Self {
        Abort::Item(e)
    }
}

async fn run_item(
    settings: &BatchSettings,
    entry: &InputEntry,
    index: usize,
    total: usize,
    observer: &SharedObserver,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<ItemResult, BatchError> {
    let started = Instant::now();
    let base = match layout::base_name(settings, entry) {
        Ok(base) => base,
        Err(error) => {
            return Ok(ItemResult {
                index,
                source: entry.source.clone(),
                base_name: layout::file_stem(&entry.source),
                destination: None,
                outcome: ItemOutcome::Failed { error },
                duration_ms: started.elapsed().as_millis() as u64,
            })
        }
    };
    let dest = layout::destination_dir(settings, &base);
    debug!(
        "[{}/{}] base name {:?}, destination {}",
        index,
        total,
        base,
        dest.display()
    );

    let converted = convert_one(settings, entry, &base, &dest, index, observer, cancel_rx).await;
    let outcome = match converted {
        Ok(outcome) => outcome,
        Err(Abort::Item(error)) => ItemOutcome::Failed { error },
        Err(Abort::Fatal(fatal)) => return Err(fatal),
    };

    Ok(ItemResult {
        index,
        source: entry.source.clone(),
        base_name: base,
        destination: Some(dest),
        outcome,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

async fn convert_one(
    settings: &BatchSettings,
    entry: &InputEntry,
    base: &str,
    dest: &std::path::Path,
    index: usize,
    observer: &SharedObserver,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<ItemOutcome, Abort> {
    // Reject a bad range before the PDF is moved anywhere.
    settings.pages.validate()?;

    layout::ensure_destination(dest).await?;

    let pdf = disposition::apply(settings.disposition, &entry.source, dest, base).await?;

    let invocation = Invocation::build(
        &settings.converter,
        &pdf,
        dest,
        &settings.pages,
        &settings.extra_env,
    )?;
    debug!("$ {}", invocation.display());
    observer.on_command(index, &invocation.display());

    let report = process::run_streaming(&invocation, cancel_rx, |line| {
        observer.on_output_line(index, line)
    })
    .await
    .map_err(|e| match e {
        LaunchError::NotFound(program) => Abort::Fatal(BatchError::ConverterNotFound { program }),
        LaunchError::Item(e) => Abort::Item(e),
    })?;

    if report.success {
        let produced_stem = layout::file_stem(&pdf);
        let finalized =
            finalize::mark_converted(dest, &produced_stem, base, &settings.output_suffix).await;
        match &finalized {
            Finalized::Renamed(_) => {}
            Finalized::NoOutputFolder(expected) => observer.on_warning(
                index,
                &format!("No output folder found at {}", expected.display()),
            ),
            Finalized::Skipped { reason, .. } => {
                observer.on_warning(index, &format!("Output folder not renamed: {reason}"))
            }
        }
        Ok(ItemOutcome::Succeeded {
            output_dir: finalized.output_dir().to_path_buf(),
        })
    } else if report.cancelled {
        Ok(ItemOutcome::Cancelled)
    } else {
        Err(ItemError::ConverterFailed { code: report.code }.into())
    }
}

//! # marker-batch
//!
//! Batch front-end for the `marker_single` PDF-to-Markdown converter.
//!
//! ## Why this crate?
//!
//! `marker_single` converts one PDF per invocation and leaves file
//! organisation to the caller. This crate runs it over an ordered list of
//! PDFs (local files or URLs), one at a time, giving each document its own
//! output folder, optionally moving, copying or linking the source PDF next
//! to the result, and streaming the converter's console output back to the
//! caller as it happens. A run can be cancelled at any point; the converter
//! currently running is terminated and no further items start.
//!
//! ## Pipeline Overview
//!
//! ```text
//! inputs (paths / URLs)
//!  │
//!  ├─ 0. Collect   download URLs, validate paths, drop duplicates
//!  │
//!  └─ per item, strictly sequential:
//!       ├─ 1. Layout       base name + destination folder
//!       ├─ 2. Disposition  move / copy / symlink / backlink / none
//!       ├─ 3. Command      resolve marker_single, build arguments
//!       ├─ 4. Process      spawn, stream merged stdout+stderr, cancel
//!       └─ 5. Finalize     rename output folder to <name>_converted
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use marker_batch::{BatchRunner, BatchSettings, InputEntry, NoopObserver, PdfDisposition};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = BatchSettings::builder()
//!         .input(InputEntry::new("paper.pdf"))
//!         .input(InputEntry::new("scan_0042.pdf").with_name("Invoice"))
//!         .output_root("converted")
//!         .create_subfolder(true)
//!         .disposition(PdfDisposition::Copy)
//!         .build()?;
//!
//!     let runner = BatchRunner::new();
//!     let summary = runner.run(&settings, Arc::new(NoopObserver)).await?;
//!     println!("{}", summary.summary_line());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `marker-batch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! marker-batch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod favorites;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchRunner, CancelHandle, RunState};
pub use config::{
    BatchSettings, BatchSettingsBuilder, ConverterLocation, InputEntry, PageSelection,
    PdfDisposition,
};
pub use error::{BatchError, ItemError};
pub use favorites::{FavoriteKind, Favorites};
pub use output::{BatchSummary, ItemOutcome, ItemResult};
pub use pipeline::input::{collect_inputs, default_downloads_dir, download_pdf};
pub use progress::{BatchEvent, BatchObserver, ChannelObserver, NoopObserver, SharedObserver};

//! Error types for the marker-batch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BatchError`] — **Fatal**: the batch cannot proceed at all (converter
//!   executable missing, inputs vanished, a second run while one is active).
//!   Returned as `Err(BatchError)` from [`crate::batch::BatchRunner::run`]
//!   and from the input-collection helpers.
//!
//! * [`ItemError`] — **Non-fatal**: a single input failed (destination folder
//!   could not be created, the PDF could not be moved, the converter exited
//!   non-zero) but the remaining inputs still run. Stored inside
//!   [`crate::output::ItemResult`] so callers can report partial success.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the marker-batch library.
///
/// Per-item failures use [`ItemError`] and are stored in
/// [`crate::output::ItemResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// One or more inputs disappeared between collection and the start of the run.
    #[error("{} input file(s) not found:\n{}", .paths.len(), display_paths(.paths))]
    MissingInputs { paths: Vec<PathBuf> },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The downloaded body is not a PDF.
    #[error("Downloaded file is not a valid PDF: '{url}'\nFirst bytes: {magic:?}")]
    NotAPdf { url: String, magic: Vec<u8> },

    // ── Converter errors ──────────────────────────────────────────────────
    /// The converter executable could not be located or launched.
    #[error(
        "Converter '{program}' not found.\n\
Make sure marker-pdf is installed, either in a local virtual environment:\n\
  .venv/bin/pip install marker-pdf\n\
or on your PATH, or point --converter at the marker_single executable."
    )]
    ConverterNotFound { program: PathBuf },

    // ── Run-state errors ──────────────────────────────────────────────────
    /// `run` was called while another batch is still active on the same runner.
    #[error("A batch is already running on this runner")]
    AlreadyRunning,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The favourites file exists but is not in either accepted shape.
    #[error("Favorites file '{path}' could not be parsed: {detail}")]
    FavoritesCorrupt { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// File-system error outside of any single item.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("Converter failed with exit code {c}"),
        None => "Converter was terminated by a signal".to_string(),
    }
}

/// A non-fatal error for a single batch item.
///
/// Stored alongside [`crate::output::ItemResult`] when an item fails.
/// The batch continues with the next input.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemError {
    /// The destination directory could not be created.
    #[error("Could not create folder '{path}': {detail}")]
    CreateDir { path: PathBuf, detail: String },

    /// Moving, copying or linking the source PDF failed.
    #[error("PDF {action} failed for '{path}': {detail}")]
    Disposition {
        action: String,
        path: PathBuf,
        detail: String,
    },

    /// Output base name would not stay a single folder under the output root.
    #[error("Invalid output name {name:?}: use a plain folder name without '/', '\\', '.' or '..'")]
    InvalidName { name: String },

    /// Page range rejected before the converter was launched.
    #[error("Invalid page range {start}-{end}: start page must be >= 1 and <= end page")]
    InvalidPageRange { start: u32, end: u32 },

    /// The converter could not be launched for a reason other than "not found".
    #[error("Failed to launch converter: {detail}")]
    Spawn { detail: String },

    /// Reading the converter's output or waiting on it failed.
    #[error("Lost contact with converter: {detail}")]
    Stream { detail: String },

    /// The converter ran and exited unsuccessfully.
    #[error("{}", describe_exit(.code))]
    ConverterFailed { code: Option<i32> },
}

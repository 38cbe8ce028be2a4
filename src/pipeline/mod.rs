//! Per-item stages of a batch run.
//!
//! Each submodule implements exactly one step, so each can be tested against
//! a temp directory without launching the whole batch.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ layout ──▶ disposition ──▶ command ──▶ process ──▶ finalize
//! (URL/path) (name+dir)  (move/copy/link)  (argv)    (spawn+stream) (rename)
//! ```
//!
//! 1. [`input`]       — validate local paths, download URLs before the batch
//! 2. [`layout`]      — resolve the base name and create the destination folder
//! 3. [`disposition`] — relocate, duplicate or link the source PDF
//! 4. [`command`]     — locate `marker_single` and build its arguments
//! 5. [`process`]     — run it, stream merged output, honour cancellation
//! 6. [`finalize`]    — suffix the converter's output folder on success

pub mod command;
pub mod disposition;
pub mod finalize;
pub mod input;
pub mod layout;
pub mod process;

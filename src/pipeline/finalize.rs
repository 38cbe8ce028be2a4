//! Post-conversion housekeeping: mark the converter's output folder.
//!
//! marker_single writes into `<output_dir>/<pdf stem>/`. After a successful
//! run that folder is renamed to `<base name><suffix>` so converted output is
//! distinguishable from project folders at a glance. The PDF stem and the
//! base name differ only when the source PDF was left in place under its
//! original name.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of the rename step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalized {
    /// Folder renamed; holds the new path.
    Renamed(PathBuf),
    /// The converter produced no folder under the expected name.
    NoOutputFolder(PathBuf),
    /// Rename skipped; holds the untouched folder and the reason.
    Skipped { folder: PathBuf, reason: String },
}

impl Finalized {
    /// Where the converted output ended up.
    pub fn output_dir(&self) -> &Path {
        match self {
            Finalized::Renamed(p) | Finalized::NoOutputFolder(p) => p,
            Finalized::Skipped { folder, .. } => folder,
        }
    }
}

/// Rename `<dest_dir>/<pdf_stem>` to `<dest_dir>/<base><suffix>`.
///
/// Never overwrites: an existing target leaves the output where it is.
pub async fn mark_converted(dest_dir: &Path, pdf_stem: &str, base: &str, suffix: &str) -> Finalized {
    let produced = dest_dir.join(pdf_stem);
    let renamed = dest_dir.join(format!("{base}{suffix}"));

    if !tokio::fs::metadata(&produced)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        debug!("No output folder at {}", produced.display());
        return Finalized::NoOutputFolder(produced);
    }

    if tokio::fs::symlink_metadata(&renamed).await.is_ok() {
        return Finalized::Skipped {
            folder: produced,
            reason: format!("{} already exists", renamed.display()),
        };
    }

    match tokio::fs::rename(&produced, &renamed).await {
        Ok(()) => {
            info!("Renamed output {} -> {}", produced.display(), renamed.display());
            Finalized::Renamed(renamed)
        }
        Err(e) => Finalized::Skipped {
            folder: produced,
            reason: e.to_string(),
        },
    }
}

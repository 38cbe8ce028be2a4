//! PDF disposition: move, copy or link the source PDF next to its output.
//!
//! The target is always `<destination>/<base name>.pdf`. The returned path is
//! what the converter is pointed at, so for every policy except
//! [`PdfDisposition::DoNothing`] the converter reads the file through its new
//! location and names its output folder after the base name.
//!
//! None of the policies overwrite an existing target. When source and target
//! already are the same file every policy is a no-op.

use crate::config::PdfDisposition;
use crate::error::ItemError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Apply `policy` to `source` and return the PDF path to hand to the converter.
pub async fn apply(
    policy: PdfDisposition,
    source: &Path,
    dest_dir: &Path,
    base: &str,
) -> Result<PathBuf, ItemError> {
    let fail = |path: &Path, detail: String| ItemError::Disposition {
        action: policy.verb().to_string(),
        path: path.to_path_buf(),
        detail,
    };

    if tokio::fs::metadata(source).await.is_err() {
        return Err(fail(source, "source file is missing".into()));
    }

    if policy == PdfDisposition::DoNothing {
        return Ok(source.to_path_buf());
    }

    let target = target_path(dest_dir, base);

    if same_file(source, &target).await {
        debug!("{} already at its destination", source.display());
        return Ok(target);
    }

    if tokio::fs::symlink_metadata(&target).await.is_ok() {
        return Err(fail(&target, "target already exists".into()));
    }

    match policy {
        PdfDisposition::Move => {
            move_file(source, &target)
                .await
                .map_err(|e| fail(source, e.to_string()))?;
        }
        PdfDisposition::Copy => {
            tokio::fs::copy(source, &target)
                .await
                .map_err(|e| fail(source, e.to_string()))?;
        }
        PdfDisposition::SymlinkForward => {
            let absolute = tokio::fs::canonicalize(source)
                .await
                .map_err(|e| fail(source, e.to_string()))?;
            symlink_file(&absolute, &target)
                .await
                .map_err(|e| fail(&target, e.to_string()))?;
        }
        PdfDisposition::SymlinkBacklink => {
            let absolute_target = tokio::fs::canonicalize(dest_dir)
                .await
                .map_err(|e| fail(dest_dir, e.to_string()))?
                .join(target_file_name(base));
            move_file(source, &target)
                .await
                .map_err(|e| fail(source, e.to_string()))?;
            if let Err(e) = symlink_file(&absolute_target, source).await {
                warn!(
                    "Backlink at {} failed, moving PDF back: {}",
                    source.display(),
                    e
                );
                if let Err(undo) = move_file(&target, source).await {
                    return Err(fail(
                        source,
                        format!("{e}; restoring the original also failed: {undo}"),
                    ));
                }
                return Err(fail(source, e.to_string()));
            }
        }
        // Returned early above.
        PdfDisposition::DoNothing => {}
    }

    info!(
        "PDF {}: {} -> {}",
        policy.verb(),
        source.display(),
        target.display()
    );
    Ok(target)
}

/// `<dest_dir>/<base>.pdf`
pub fn target_path(dest_dir: &Path, base: &str) -> PathBuf {
    dest_dir.join(target_file_name(base))
}

fn target_file_name(base: &str) -> String {
    format!("{base}.pdf")
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (
        tokio::fs::canonicalize(a).await,
        tokio::fs::canonicalize(b).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Rename, falling back to copy + delete across file systems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!("Cross-device move of {}, copying", from.display());
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
        other => other,
    }
}

#[cfg(unix)]
async fn symlink_file(original: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(original, link).await
}

#[cfg(windows)]
async fn symlink_file(original: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_file(original, link).await
}

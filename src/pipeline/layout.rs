//! Naming and destination-folder resolution for one batch item.

use crate::config::{self, BatchSettings, InputEntry};
use crate::error::ItemError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Final base name for an item.
///
/// Precedence: the settings' override map, then the entry's own name, then
/// the source file stem. Blank names are ignored. A name that is not a
/// single folder name (`..`, anything with a separator) is rejected so the
/// destination never leaves the output root.
pub fn base_name(settings: &BatchSettings, entry: &InputEntry) -> Result<String, ItemError> {
    let chosen = settings
        .name_overrides
        .get(&entry.source)
        .or(entry.name.as_ref())
        .map(|n| n.trim())
        .filter(|n| !n.is_empty());

    match chosen {
        Some(name) if !config::is_valid_base_name(name) => Err(ItemError::InvalidName {
            name: name.to_string(),
        }),
        Some(name) => Ok(name.to_string()),
        None => Ok(file_stem(&entry.source)),
    }
}

/// Source file name without its extension (`"document"` if there is none).
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Where an item's PDF and converter output go.
pub fn destination_dir(settings: &BatchSettings, base: &str) -> PathBuf {
    if settings.create_subfolder {
        settings.output_root.join(base)
    } else {
        settings.output_root.clone()
    }
}

/// Create the destination folder (and parents).
pub async fn ensure_destination(dir: &Path) -> Result<(), ItemError> {
    debug!("Ensuring destination {}", dir.display());
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ItemError::CreateDir {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })
}

//! Favourite directories, persisted as JSON.
//!
//! ```json
//! { "output": ["/home/me/notes"], "input": ["/home/me/Downloads"] }
//! ```
//!
//! Older files hold a bare list, which is read as output favourites with no
//! input favourites. Saving always writes the object form.

use crate::error::BatchError;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

const APP_DIR: &str = "marker-batch";
const FILE_NAME: &str = "favorites.json";

/// Which favourites list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteKind {
    Output,
    Input,
}

/// Output and input favourite directories, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorites {
    #[serde(default)]
    pub output: Vec<PathBuf>,
    #[serde(default)]
    pub input: Vec<PathBuf>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk {
    Current(Favorites),
    Legacy(Vec<PathBuf>),
}

impl From<OnDisk> for Favorites {
    fn from(disk: OnDisk) -> Self {
        match disk {
            OnDisk::Current(f) => f,
            OnDisk::Legacy(output) => Favorites {
                output,
                input: Vec::new(),
            },
        }
    }
}

impl Favorites {
    /// `<config dir>/marker-batch/favorites.json`, or `./favorites.json`
    /// when the platform has no config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join(APP_DIR).join(FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(FILE_NAME))
    }

    /// Read favourites from `path`. A missing file yields empty lists.
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No favorites file at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(BatchError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let disk: OnDisk =
            serde_json::from_str(&text).map_err(|e| BatchError::FavoritesCorrupt {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        Ok(disk.into())
    }

    /// Write favourites to `path` atomically, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), BatchError> {
        let io_err = |source: std::io::Error| BatchError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BatchError::Internal(format!("Failed to serialise favorites: {e}")))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.as_file_mut().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        info!("Saved favorites to {}", path.display());
        Ok(())
    }

    pub fn list(&self, kind: FavoriteKind) -> &[PathBuf] {
        match kind {
            FavoriteKind::Output => &self.output,
            FavoriteKind::Input => &self.input,
        }
    }

    /// Append `dir` unless already present. Returns whether it was added.
    pub fn add(&mut self, kind: FavoriteKind, dir: impl Into<PathBuf>) -> bool {
        let dir = dir.into();
        let list = self.list_mut(kind);
        if list.contains(&dir) {
            false
        } else {
            list.push(dir);
            true
        }
    }

    /// Remove `dir`. Returns whether it was present.
    pub fn remove(&mut self, kind: FavoriteKind, dir: &Path) -> bool {
        let list = self.list_mut(kind);
        let before = list.len();
        list.retain(|p| p != dir);
        list.len() != before
    }

    fn list_mut(&mut self, kind: FavoriteKind) -> &mut Vec<PathBuf> {
        match kind {
            FavoriteKind::Output => &mut self.output,
            FavoriteKind::Input => &mut self.input,
        }
    }
}

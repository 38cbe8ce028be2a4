//! Input collection: normalise user-supplied paths and URLs to local PDFs.
//!
//! The converter only reads files from disk, so URL inputs are downloaded
//! before the batch starts. Unlike a scratch temp file, a downloaded PDF is
//! kept: it lands in the user's downloads directory under the first free
//! name (`paper.pdf`, `paper_1.pdf`, `paper_2.pdf`, …) and afterwards is an
//! ordinary batch input that the disposition policy may move or link.
//!
//! The body is staged in a temp file inside the target directory and then
//! persisted without clobbering, so a half-written download never appears
//! under its final name and two concurrent downloads cannot overwrite each
//! other.

use crate::config::InputEntry;
use crate::error::BatchError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fallback name when the URL carries no usable file name.
const FALLBACK_FILE_NAME: &str = "downloaded.pdf";

/// Upper bound on `_N` suffixes tried before giving up.
const MAX_COLLISION_SUFFIX: u32 = 10_000;

static FORBIDDEN_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1F]+"#).unwrap());

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Validate that a local input exists and is readable.
pub fn resolve_local(path_str: &str) -> Result<PathBuf, BatchError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(BatchError::FileNotFound { path });
    }
    if !path.is_file() {
        debug!("Not a regular file: {}", path.display());
        return Err(BatchError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(BatchError::PermissionDenied { path });
        }
        Err(_) => return Err(BatchError::FileNotFound { path }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// Where URL inputs are saved when the caller does not say otherwise.
///
/// The platform downloads directory, then the home directory, then `.`.
pub fn default_downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve raw CLI/front-end inputs into batch entries.
///
/// URLs are downloaded into `downloads_dir`; local paths are validated.
/// Later duplicates of an already-seen path are dropped.
pub async fn collect_inputs(
    raw: &[String],
    downloads_dir: &Path,
    timeout_secs: u64,
) -> Result<Vec<InputEntry>, BatchError> {
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(raw.len());

    for input in raw {
        let path = if is_url(input) {
            download_pdf(input, downloads_dir, timeout_secs).await?
        } else {
            resolve_local(input)?
        };

        if seen.insert(path.clone()) {
            entries.push(InputEntry::new(path));
        } else {
            debug!("Skipping duplicate input {}", path.display());
        }
    }

    Ok(entries)
}

/// Download a PDF into `dir` and return where it was saved.
pub async fn download_pdf(
    url: &str,
    dir: &Path,
    timeout_secs: u64,
) -> Result<PathBuf, BatchError> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BatchError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    fetch_pdf(&client, url, dir, timeout_secs).await
}

async fn fetch_pdf(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    timeout_secs: u64,
) -> Result<PathBuf, BatchError> {
    info!("Downloading PDF from: {}", url);

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            BatchError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            BatchError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(BatchError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;

    if !bytes.starts_with(b"%PDF") {
        return Err(BatchError::NotAPdf {
            url: url.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        });
    }

    let file_name = file_name_from_url(url);
    let dir = dir.to_path_buf();
    let saved = tokio::task::spawn_blocking(move || save_unique(&dir, &file_name, &bytes))
        .await
        .map_err(|e| BatchError::Internal(format!("Download writer panicked: {e}")))??;

    info!("Downloaded to: {}", saved.display());
    Ok(saved)
}

/// Derive a safe `.pdf` file name from the last URL path segment.
pub fn file_name_from_url(url: &str) -> String {
    let segment = reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();

    let cleaned = FORBIDDEN_CHARS.replace_all(&segment, "_");
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c == '_' || c.is_whitespace());

    if cleaned.is_empty() {
        return FALLBACK_FILE_NAME.to_string();
    }

    if cleaned.to_ascii_lowercase().ends_with(".pdf") {
        cleaned.to_string()
    } else {
        format!("{cleaned}.pdf")
    }
}

/// First path in `dir` not yet taken: `name`, `stem_1.ext`, `stem_2.ext`, …
pub fn unique_path(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return Some(candidate);
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..=MAX_COLLISION_SUFFIX)
        .map(|n| dir.join(format!("{stem}_{n}{ext}")))
        .find(|p| !p.exists())
}

/// Stage `bytes` in a temp file inside `dir`, then persist it under the
/// first free name. Retries when another writer claims the name first.
fn save_unique(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, BatchError> {
    let io_err = |source: std::io::Error| BatchError::Io {
        path: dir.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    staged.write_all(bytes).map_err(io_err)?;
    staged.flush().map_err(io_err)?;

    loop {
        let target = unique_path(dir, file_name).ok_or_else(|| {
            BatchError::Internal(format!(
                "No free file name for '{file_name}' in {}",
                dir.display()
            ))
        })?;

        match staged.persist_noclobber(&target) {
            Ok(_) => return Ok(target),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!("{} appeared while saving, retrying", target.display());
                staged = e.file;
            }
            Err(e) => {
                return Err(BatchError::Io {
                    path: target,
                    source: e.error,
                })
            }
        }
    }
}

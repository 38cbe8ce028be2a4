//! Configuration types for a batch run.
//!
//! Every knob of a run lives in [`BatchSettings`], built via
//! [`BatchSettingsBuilder`]. The settings are an immutable snapshot: the
//! front-end captures them once when the user presses "convert" and hands a
//! clone to the background task, so later edits in the front-end never leak
//! into a batch that is already running.

use crate::error::{BatchError, ItemError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the converter executable installed by marker-pdf.
pub const CONVERTER_NAME: &str = "marker_single";

/// Suffix appended to the converter's output folder once conversion succeeds.
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_converted";

/// Whether `name` is usable as a single folder name under the output root.
///
/// Blank names pass: they fall back to the source file stem.
pub fn is_valid_base_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || !(name == "." || name == ".." || name.contains(['/', '\\', '\0']))
}

/// One PDF to convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEntry {
    /// Local path of the PDF (downloaded inputs point into the downloads directory).
    pub source: PathBuf,
    /// User-chosen output base name. `None` uses the source file stem.
    pub name: Option<String>,
}

impl InputEntry {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// What happens to the source PDF relative to the destination folder.
///
/// | Policy | Source file | Destination |
/// |--------|-------------|-------------|
/// | `Move` | removed | the PDF |
/// | `Copy` | untouched | a copy |
/// | `SymlinkForward` | untouched | symlink → source |
/// | `SymlinkBacklink` | replaced by symlink → destination | the PDF |
/// | `DoNothing` | untouched | nothing |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PdfDisposition {
    Move,
    Copy,
    SymlinkForward,
    /// Destructive: the original location ends up holding a link, not the file.
    SymlinkBacklink,
    #[default]
    DoNothing,
}

impl PdfDisposition {
    /// Short verb used in log lines and error messages.
    pub fn verb(self) -> &'static str {
        match self {
            PdfDisposition::Move => "move",
            PdfDisposition::Copy => "copy",
            PdfDisposition::SymlinkForward => "symlink",
            PdfDisposition::SymlinkBacklink => "backlink",
            PdfDisposition::DoNothing => "none",
        }
    }

    /// Whether the policy changes what lives at the source path.
    pub fn mutates_source(self) -> bool {
        matches!(self, PdfDisposition::Move | PdfDisposition::SymlinkBacklink)
    }
}

/// Which pages of each PDF the converter should process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Contiguous range of pages, one-based and inclusive.
    Range { start: u32, end: u32 },
}

impl PageSelection {
    /// Check the range invariants: `start >= 1` and `end >= start`.
    pub fn validate(&self) -> Result<(), ItemError> {
        match *self {
            PageSelection::All => Ok(()),
            PageSelection::Range { start, end } => {
                if start < 1 || end < start {
                    Err(ItemError::InvalidPageRange { start, end })
                } else {
                    Ok(())
                }
            }
        }
    }

    /// The converter's `--page_range` value: zero-based, inclusive.
    ///
    /// Returns `Ok(None)` for [`PageSelection::All`].
    pub fn converter_arg(&self) -> Result<Option<String>, ItemError> {
        self.validate()?;
        Ok(match *self {
            PageSelection::All => None,
            PageSelection::Range { start, end } => Some(format!("{}-{}", start - 1, end - 1)),
        })
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSelection::All => f.write_str("all"),
            PageSelection::Range { start, end } => write!(f, "{start}-{end}"),
        }
    }
}

/// Where the converter executable comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConverterLocation {
    /// Use exactly this program (absolute path or a name looked up on PATH).
    Program(PathBuf),
    /// Prefer `<root>/.venv/bin/marker_single`, fall back to PATH.
    LocalFirst { install_root: PathBuf },
}

impl Default for ConverterLocation {
    fn default() -> Self {
        let install_root = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        ConverterLocation::LocalFirst { install_root }
    }
}

/// Immutable snapshot of everything a batch run needs.
///
/// Built via [`BatchSettings::builder()`].
///
/// # Example
/// ```rust
/// use marker_batch::{BatchSettings, InputEntry, PdfDisposition};
///
/// let settings = BatchSettings::builder()
///     .input(InputEntry::new("/tmp/report.pdf"))
///     .output_root("/tmp/out")
///     .create_subfolder(true)
///     .disposition(PdfDisposition::Copy)
///     .build()
///     .unwrap();
/// assert_eq!(settings.inputs.len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Ordered inputs. Duplicate source paths are dropped by the builder.
    pub inputs: Vec<InputEntry>,

    /// Base-name overrides keyed by source path. Wins over [`InputEntry::name`].
    pub name_overrides: BTreeMap<PathBuf, String>,

    /// Root under which destination folders are created.
    pub output_root: PathBuf,

    /// Create `<output_root>/<base name>/` per item instead of writing into the root.
    pub create_subfolder: bool,

    /// Source PDF treatment. Default: [`PdfDisposition::DoNothing`].
    pub disposition: PdfDisposition,

    /// Page selection passed to every invocation. Default: all pages.
    pub pages: PageSelection,

    /// Converter executable resolution policy.
    pub converter: ConverterLocation,

    /// Appended to the converter's output folder name on success. Default: `_converted`.
    pub output_suffix: String,

    /// Extra environment variables for the converter process.
    pub extra_env: Vec<(String, String)>,
}

impl BatchSettings {
    /// Create a new builder for `BatchSettings`.
    pub fn builder() -> BatchSettingsBuilder {
        BatchSettingsBuilder {
            settings: BatchSettings {
                inputs: Vec::new(),
                name_overrides: BTreeMap::new(),
                output_root: PathBuf::new(),
                create_subfolder: false,
                disposition: PdfDisposition::default(),
                pages: PageSelection::default(),
                converter: ConverterLocation::default(),
                output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
                extra_env: vec![("PYTHONUNBUFFERED".to_string(), "1".to_string())],
            },
        }
    }
}

/// Builder for [`BatchSettings`].
#[derive(Debug)]
pub struct BatchSettingsBuilder {
    settings: BatchSettings,
}

impl BatchSettingsBuilder {
    pub fn input(mut self, entry: InputEntry) -> Self {
        self.settings.inputs.push(entry);
        self
    }

    pub fn inputs(mut self, entries: impl IntoIterator<Item = InputEntry>) -> Self {
        self.settings.inputs.extend(entries);
        self
    }

    pub fn name_override(mut self, source: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        self.settings
            .name_overrides
            .insert(source.into(), name.into());
        self
    }

    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.output_root = dir.into();
        self
    }

    pub fn create_subfolder(mut self, v: bool) -> Self {
        self.settings.create_subfolder = v;
        self
    }

    pub fn disposition(mut self, policy: PdfDisposition) -> Self {
        self.settings.disposition = policy;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.settings.pages = selection;
        self
    }

    pub fn converter(mut self, location: ConverterLocation) -> Self {
        self.settings.converter = location;
        self
    }

    pub fn output_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.settings.output_suffix = suffix.into();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.extra_env.push((key.into(), value.into()));
        self
    }

    /// Build the settings, validating constraints.
    ///
    /// When no output root was given, the parent directory of the first
    /// input is used.
    pub fn build(mut self) -> Result<BatchSettings, BatchError> {
        let s = &mut self.settings;

        let mut seen = HashSet::new();
        s.inputs.retain(|entry| seen.insert(entry.source.clone()));

        if s.inputs.is_empty() {
            return Err(BatchError::InvalidConfig(
                "At least one input PDF is required".into(),
            ));
        }

        if s.output_root.as_os_str().is_empty() {
            s.output_root = s.inputs[0]
                .source
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
        }

        if s.output_suffix.is_empty() || s.output_suffix.contains(['/', '\\']) {
            return Err(BatchError::InvalidConfig(format!(
                "Output suffix must be non-empty and contain no path separators, got {:?}",
                s.output_suffix
            )));
        }

        let names = s
            .name_overrides
            .values()
            .chain(s.inputs.iter().filter_map(|entry| entry.name.as_ref()));
        for name in names {
            if !is_valid_base_name(name) {
                return Err(BatchError::InvalidConfig(
                    ItemError::InvalidName { name: name.clone() }.to_string(),
                ));
            }
        }

        s.pages
            .validate()
            .map_err(|e| BatchError::InvalidConfig(e.to_string()))?;

        Ok(self.settings)
    }
}

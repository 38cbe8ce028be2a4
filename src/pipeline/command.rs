//! Converter invocation: locate the executable and build its arguments.
//!
//! marker-pdf is usually installed into a virtual environment next to the
//! front-end, so the local `.venv` is checked first and the bare program
//! name (resolved through `PATH` by the OS) is the fallback.

use crate::config::{ConverterLocation, PageSelection, CONVERTER_NAME};
use crate::error::ItemError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A fully-resolved converter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Build the call for one PDF.
    ///
    /// Fails only on an invalid page range, before anything is launched.
    pub fn build(
        location: &ConverterLocation,
        pdf: &Path,
        output_dir: &Path,
        pages: &PageSelection,
        env: &[(String, String)],
    ) -> Result<Self, ItemError> {
        let page_range = pages.converter_arg()?;

        let mut args: Vec<OsString> = vec![
            pdf.as_os_str().to_owned(),
            "--output_dir".into(),
            output_dir.as_os_str().to_owned(),
        ];
        if let Some(range) = page_range {
            args.push("--page_range".into());
            args.push(range.into());
        }

        Ok(Self {
            program: resolve_program(location),
            args,
            env: env.to_vec(),
        })
    }

    /// Human-readable command line for the log (`$ marker_single a.pdf …`).
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| quote(&part.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// A `tokio` command ready to spawn.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Apply the local-install-first, `PATH`-fallback policy.
pub fn resolve_program(location: &ConverterLocation) -> PathBuf {
    match location {
        ConverterLocation::Program(program) => program.clone(),
        ConverterLocation::LocalFirst { install_root } => {
            let local = venv_converter(install_root);
            if local.is_file() {
                debug!("Using local converter {}", local.display());
                local
            } else {
                debug!(
                    "No converter at {}, falling back to PATH",
                    local.display()
                );
                PathBuf::from(converter_file_name())
            }
        }
    }
}

/// `<root>/.venv/bin/marker_single` (or `.venv\Scripts\marker_single.exe`).
pub fn venv_converter(install_root: &Path) -> PathBuf {
    let bin_dir = if cfg!(windows) { "Scripts" } else { "bin" };
    install_root
        .join(".venv")
        .join(bin_dir)
        .join(converter_file_name())
}

fn converter_file_name() -> String {
    if cfg!(windows) {
        format!("{CONVERTER_NAME}.exe")
    } else {
        CONVERTER_NAME.to_string()
    }
}

fn quote(part: &str) -> String {
    if !part.is_empty() && !part.contains([' ', '\t', '"', '\'']) {
        part.to_string()
    } else {
        format!("\"{}\"", part.replace('"', "\\\""))
    }
}

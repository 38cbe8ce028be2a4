//! CLI binary for marker-batch.
//!
//! Maps flags onto `BatchSettings`, runs the batch on a background task and
//! renders its events from the main loop. Ctrl+C cancels the batch.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use marker_batch::{
    collect_inputs, default_downloads_dir, BatchEvent, BatchRunner, BatchSettings, BatchSummary,
    ChannelObserver, ConverterLocation, FavoriteKind, Favorites, PageSelection, PdfDisposition,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit status when the run was interrupted with Ctrl+C.
const EXIT_INTERRUPTED: u8 = 130;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert two PDFs, output folders next to the first one
  marker-batch convert paper.pdf slides.pdf

  # One folder per document under ~/notes, PDF moved into it
  marker-batch convert *.pdf -o ~/notes --subfolder --disposition move

  # Pages 3 to 10 only, custom name for a scanned file
  marker-batch convert scan_0042.pdf --pages 3-10 --name scan_0042.pdf=Invoice

  # Download and convert
  marker-batch convert https://arxiv.org/pdf/1706.03762 -o papers

  # Machine-readable summary
  marker-batch convert --json a.pdf b.pdf > summary.json

  # Favourite folders
  marker-batch favorites add ~/notes
  marker-batch favorites list --input

DISPOSITION POLICIES:
  none      leave the PDF where it is (default)
  move      move the PDF into the destination folder
  copy      copy the PDF into the destination folder
  symlink   link from the destination folder to the PDF
  backlink  move the PDF, leave a link at the old location

CONVERTER LOOKUP:
  --converter wins. Otherwise <install-root>/.venv/bin/marker_single is used
  when present, then marker_single on PATH. Install with:
    python -m venv .venv && .venv/bin/pip install marker-pdf

EXIT STATUS:
  0    every file converted
  1    at least one file failed, or the batch could not run
  130  cancelled with Ctrl+C
"#;

/// Batch front-end for the marker_single PDF-to-Markdown converter.
#[derive(Parser, Debug)]
#[command(
    name = "marker-batch",
    version,
    about = "Convert batches of PDFs to Markdown with marker_single",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MARKER_BATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MARKER_BATCH_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert PDF files and URLs, one after another.
    Convert(ConvertArgs),
    /// Manage favourite output and input folders.
    Favorites(FavoritesArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Local PDF paths or HTTP/HTTPS URLs, converted in this order.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output root. Defaults to the folder of the first input.
    #[arg(short, long, env = "MARKER_BATCH_OUTPUT")]
    output: Option<PathBuf>,

    /// Create one sub-folder per document under the output root.
    #[arg(long, env = "MARKER_BATCH_SUBFOLDER")]
    subfolder: bool,

    /// What to do with each source PDF.
    #[arg(long, env = "MARKER_BATCH_DISPOSITION", value_enum, default_value = "none")]
    disposition: DispositionArg,

    /// Page selection: all, or a one-based inclusive range such as 3-15.
    #[arg(long, env = "MARKER_BATCH_PAGES", default_value = "all")]
    pages: String,

    /// Output name for one input, as SOURCE=NAME. Repeatable.
    #[arg(long = "name", value_name = "SOURCE=NAME", value_parser = parse_name)]
    names: Vec<(String, String)>,

    /// Path to the marker_single executable.
    #[arg(long, env = "MARKER_BATCH_CONVERTER")]
    converter: Option<PathBuf>,

    /// Folder whose .venv is searched for marker_single. Defaults to the
    /// folder of this executable.
    #[arg(long, env = "MARKER_BATCH_INSTALL_ROOT")]
    install_root: Option<PathBuf>,

    /// Suffix appended to each output folder after a successful conversion.
    #[arg(long, env = "MARKER_BATCH_SUFFIX", default_value = marker_batch::config::DEFAULT_OUTPUT_SUFFIX)]
    suffix: String,

    /// Where URL inputs are saved. Defaults to the Downloads folder.
    #[arg(long, env = "MARKER_BATCH_DOWNLOADS_DIR")]
    downloads_dir: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "MARKER_BATCH_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the run summary as JSON on stdout.
    #[arg(long, env = "MARKER_BATCH_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "MARKER_BATCH_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DispositionArg {
    Move,
    Copy,
    Symlink,
    Backlink,
    #[value(name = "none")]
    Nothing,
}

impl From<DispositionArg> for PdfDisposition {
    fn from(v: DispositionArg) -> Self {
        match v {
            DispositionArg::Move => PdfDisposition::Move,
            DispositionArg::Copy => PdfDisposition::Copy,
            DispositionArg::Symlink => PdfDisposition::SymlinkForward,
            DispositionArg::Backlink => PdfDisposition::SymlinkBacklink,
            DispositionArg::Nothing => PdfDisposition::DoNothing,
        }
    }
}

#[derive(Args, Debug)]
struct FavoritesArgs {
    #[command(subcommand)]
    action: FavoritesAction,

    /// Favourites file. Defaults to <config dir>/marker-batch/favorites.json.
    #[arg(long, global = true, env = "MARKER_BATCH_FAVORITES")]
    file: Option<PathBuf>,

    /// Use the input-folder list instead of the output-folder list.
    #[arg(long, global = true)]
    input: bool,
}

#[derive(Subcommand, Debug)]
enum FavoritesAction {
    /// Print the list, one folder per line.
    List,
    /// Add a folder (no-op when already present).
    Add { dir: PathBuf },
    /// Remove a folder.
    Remove { dir: PathBuf },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the user-facing feedback; library INFO logs
    // would only tear it.
    let show_progress = match &cli.command {
        Command::Convert(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Favorites(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Convert(ref args) => convert(args, cli.quiet, show_progress).await,
        Command::Favorites(ref args) => favorites(args, cli.quiet),
    }
}

// ── convert ──────────────────────────────────────────────────────────────────

async fn convert(args: &ConvertArgs, quiet: bool, show_progress: bool) -> Result<ExitCode> {
    let settings = build_settings(args).await?;

    let runner = BatchRunner::new();
    let cancel = runner.cancel_handle();
    let (observer, mut events) = ChannelObserver::channel();

    let task = tokio::spawn({
        let runner = runner.clone();
        let settings = settings.clone();
        async move { runner.run(&settings, observer).await }
    });

    let mut console = Console::new(quiet, show_progress);
    let mut interrupted = false;
    let mut listen_for_signal = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => console.handle(event),
                None => break,
            },
            signal = tokio::signal::ctrl_c(), if listen_for_signal => {
                if let Err(e) = signal {
                    tracing::warn!("Ctrl+C handler unavailable: {}", e);
                    listen_for_signal = false;
                    continue;
                }
                if interrupted {
                    eprintln!("\nInterrupted twice, exiting.");
                    return Ok(ExitCode::from(EXIT_INTERRUPTED));
                }
                interrupted = true;
                console.note(&yellow("Cancelling… waiting for the converter to exit"));
                cancel.cancel();
            }
        }
    }

    let outcome = task.await.context("Batch task panicked")?;

    let summary = match outcome {
        Ok(summary) => summary,
        // Already shown through the Fatal event.
        Err(_) => return Ok(ExitCode::FAILURE),
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    }

    Ok(ExitCode::from(exit_status(&summary)))
}

fn exit_status(summary: &BatchSummary) -> u8 {
    if summary.cancelled {
        EXIT_INTERRUPTED
    } else if summary.all_succeeded() {
        0
    } else {
        1
    }
}

/// Map CLI args to `BatchSettings`, downloading URL inputs on the way.
async fn build_settings(args: &ConvertArgs) -> Result<BatchSettings> {
    let names: HashMap<&str, &str> = args
        .names
        .iter()
        .map(|(src, name)| (src.as_str(), name.as_str()))
        .collect();

    let downloads_dir = args
        .downloads_dir
        .clone()
        .unwrap_or_else(default_downloads_dir);

    let mut builder = BatchSettings::builder();
    for raw in &args.inputs {
        let entries = collect_inputs(std::slice::from_ref(raw), &downloads_dir, args.download_timeout)
            .await
            .with_context(|| format!("Failed to prepare input '{raw}'"))?;
        for entry in entries {
            let named = names
                .get(raw.as_str())
                .copied()
                .or_else(|| names.get(entry.source.to_string_lossy().as_ref()).copied());
            builder = builder.input(match named {
                Some(name) => entry.with_name(name),
                None => entry,
            });
        }
    }

    let converter = match (&args.converter, &args.install_root) {
        (Some(program), _) => ConverterLocation::Program(program.clone()),
        (None, Some(root)) => ConverterLocation::LocalFirst {
            install_root: root.clone(),
        },
        (None, None) => ConverterLocation::default(),
    };

    if let Some(ref out) = args.output {
        builder = builder.output_root(out.clone());
    }

    builder
        .create_subfolder(args.subfolder)
        .disposition(args.disposition.into())
        .pages(parse_pages(&args.pages)?)
        .converter(converter)
        .output_suffix(args.suffix.clone())
        .build()
        .context("Invalid configuration")
}

/// Parse `--pages` into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    let (start, end) = s
        .split_once('-')
        .with_context(|| format!("Invalid page selection '{s}': expected 'all' or START-END"))?;
    let start: u32 = start
        .trim()
        .parse()
        .context("Invalid start page in range")?;
    let end: u32 = end.trim().parse().context("Invalid end page in range")?;

    if start < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
    }
    if start > end {
        anyhow::bail!(
            "Invalid page range '{}-{}': start must be <= end",
            start,
            end
        );
    }

    Ok(PageSelection::Range { start, end })
}

/// Parse `SOURCE=NAME`. Splits on the last `=` so URLs with query strings work.
fn parse_name(s: &str) -> Result<(String, String), String> {
    let (src, name) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected SOURCE=NAME, got '{s}'"))?;
    let name = name.trim();
    if src.is_empty() || name.is_empty() {
        return Err(format!("expected SOURCE=NAME, got '{s}'"));
    }
    if !marker_batch::config::is_valid_base_name(name) {
        return Err(format!(
            "NAME must be a plain folder name without '/', '\\', '.' or '..', got '{name}'"
        ));
    }
    Ok((src.to_string(), name.to_string()))
}

// ── Event rendering ──────────────────────────────────────────────────────────

/// Renders `BatchEvent`s on the terminal. Lives on the main task only.
struct Console {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl Console {
    fn new(quiet: bool, show_progress: bool) -> Self {
        let bar = show_progress.then(|| {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            bar.set_prefix("Preparing");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Self { bar, quiet }
    }

    fn activate_bar(&self, total: usize) {
        let Some(bar) = &self.bar else { return };
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_length(total as u64);
        bar.set_style(style);
        bar.set_prefix("Converting");
    }

    /// One log line above the bar (or plain stderr without one).
    fn note(&self, line: &str) {
        if self.quiet {
            return;
        }
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn handle(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::BatchStarted { total } => {
                self.activate_bar(total);
                self.note(&format!(
                    "{} {}",
                    cyan("◆"),
                    bold(&format!(
                        "Starting conversion of {total} file{}…",
                        if total == 1 { "" } else { "s" }
                    ))
                ));
            }
            BatchEvent::ItemStarted {
                index,
                total,
                source,
            } => {
                let name = display_name(&source);
                self.note(&bold(&format!("[{index}/{total}] Converting: {name}")));
                if let Some(bar) = &self.bar {
                    bar.set_message(name);
                }
            }
            BatchEvent::Command { command_line, .. } => {
                self.note(&dim(&format!("$ {command_line}")));
            }
            BatchEvent::Line { line, .. } => {
                self.note(&format!("  {line}"));
            }
            BatchEvent::ItemSucceeded { output_dir, .. } => {
                self.note(&format!(
                    "  {} {}",
                    green("✓"),
                    dim(&output_dir.display().to_string())
                ));
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                }
            }
            BatchEvent::ItemFailed { error, .. } => {
                self.note(&format!("  {} {}", red("✗"), red(&error)));
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                }
            }
            BatchEvent::Warning { message, .. } => {
                self.note(&format!("  {} {}", yellow("⚠"), message));
            }
            BatchEvent::Cancelled { completed, total } => {
                self.finish();
                if !self.quiet {
                    eprintln!(
                        "{} Conversion cancelled after {completed}/{total} files",
                        yellow("⚠")
                    );
                }
            }
            BatchEvent::Fatal { error } => {
                self.finish();
                eprintln!("{} {}", red("✘"), error);
            }
            BatchEvent::BatchCompleted(summary) => {
                self.finish();
                if !self.quiet {
                    let marker = if summary.failed == 0 {
                        green("✔")
                    } else if summary.succeeded == 0 {
                        red("✘")
                    } else {
                        cyan("⚠")
                    };
                    eprintln!(
                        "{} {}  {}",
                        marker,
                        bold(&summary.summary_line()),
                        dim(&format!("{:.1}s", summary.total_duration_ms as f64 / 1000.0))
                    );
                }
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── favorites ────────────────────────────────────────────────────────────────

fn favorites(args: &FavoritesArgs, quiet: bool) -> Result<ExitCode> {
    let path = args.file.clone().unwrap_or_else(Favorites::default_path);
    let kind = if args.input {
        FavoriteKind::Input
    } else {
        FavoriteKind::Output
    };
    let mut favs = Favorites::load(&path)
        .with_context(|| format!("Failed to read favorites from {}", path.display()))?;

    match &args.action {
        FavoritesAction::List => {
            for dir in favs.list(kind) {
                println!("{}", dir.display());
            }
        }
        FavoritesAction::Add { dir } => {
            let dir = std::path::absolute(dir)
                .with_context(|| format!("Failed to resolve {}", dir.display()))?;
            if favs.add(kind, dir.clone()) {
                favs.save(&path).context("Failed to save favorites")?;
                if !quiet {
                    eprintln!("{} Added {}", green("✓"), dir.display());
                }
            } else if !quiet {
                eprintln!("{} Already a favorite", dim("·"));
            }
        }
        FavoritesAction::Remove { dir } => {
            let absolute = std::path::absolute(dir).unwrap_or_else(|_| dir.clone());
            let removed = favs.remove(kind, dir) || favs.remove(kind, &absolute);
            if removed {
                favs.save(&path).context("Failed to save favorites")?;
                if !quiet {
                    eprintln!("{} Removed {}", green("✓"), dir.display());
                }
            } else {
                if !quiet {
                    eprintln!("{} Not a favorite: {}", yellow("⚠"), dir.display());
                }
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_parse() {
        assert_eq!(parse_pages("all").unwrap(), PageSelection::All);
        assert_eq!(parse_pages(" ALL ").unwrap(), PageSelection::All);
        assert_eq!(
            parse_pages("3-15").unwrap(),
            PageSelection::Range { start: 3, end: 15 }
        );
        assert!(parse_pages("0-3").is_err());
        assert!(parse_pages("5-2").is_err());
        assert!(parse_pages("7").is_err());
    }

    #[test]
    fn name_splits_on_last_equals() {
        assert_eq!(
            parse_name("https://x.org/get?id=7=Report").unwrap(),
            ("https://x.org/get?id=7".to_string(), "Report".to_string())
        );
        assert!(parse_name("no-equals").is_err());
        assert!(parse_name("a.pdf=").is_err());
    }

    #[test]
    fn name_must_be_a_single_folder() {
        assert!(parse_name("a.pdf=..").is_err());
        assert!(parse_name("a.pdf=.").is_err());
        assert!(parse_name("a.pdf=../up").is_err());
        assert!(parse_name("a.pdf=sub/dir").is_err());
        assert!(parse_name("a.pdf=sub\\dir").is_err());
        assert_eq!(
            parse_name("a.pdf=Report v1.2").unwrap().1,
            "Report v1.2".to_string()
        );
    }

    #[test]
    fn cli_parses_convert() {
        let cli = Cli::try_parse_from([
            "marker-batch",
            "convert",
            "a.pdf",
            "b.pdf",
            "--disposition",
            "backlink",
            "--subfolder",
        ])
        .unwrap();
        match cli.command {
            Command::Convert(args) => {
                assert_eq!(args.inputs, vec!["a.pdf", "b.pdf"]);
                assert!(args.subfolder);
                assert_eq!(
                    PdfDisposition::from(args.disposition),
                    PdfDisposition::SymlinkBacklink
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exit_status_follows_summary() {
        let summary = BatchSummary {
            total: 2,
            cancelled: true,
            ..BatchSummary::default()
        };
        assert_eq!(exit_status(&summary), EXIT_INTERRUPTED);

        let clean = BatchSummary {
            total: 1,
            succeeded: 1,
            ..BatchSummary::default()
        };
        assert_eq!(exit_status(&clean), 0);
    }
}

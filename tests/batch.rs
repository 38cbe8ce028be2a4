//! End-to-end batch runs against a fake `marker_single` shell script.

#![cfg(unix)]

use marker_batch::{
    BatchError, BatchObserver, BatchRunner, BatchSettings, BatchSummary, CancelHandle,
    ConverterLocation, InputEntry, ItemError, ItemOutcome, PageSelection, PdfDisposition,
    RunState,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Mimics marker_single: writes `<output_dir>/<stem>/<stem>.md`, prints a few
/// lines, fails for stems containing "bad", and blocks when FAKE_SLEEP is set.
const FAKE_CONVERTER: &str = r##"#!/bin/sh
pdf="$1"
shift
out=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --output_dir) out="$2"; shift 2 ;;
    --page_range) echo "range $2"; shift 2 ;;
    *) shift ;;
  esac
done
stem=$(basename "$pdf" .pdf)
echo "unbuffered=$PYTHONUNBUFFERED"
if [ -n "$FAKE_SLEEP" ]; then
  echo "started $stem"
  exec sleep "$FAKE_SLEEP"
fi
case "$stem" in
  *bad*) echo "cannot read $stem" 1>&2; exit 2 ;;
esac
mkdir -p "$out/$stem"
echo "# $stem" > "$out/$stem/$stem.md"
echo "done $stem"
"##;

fn write_converter(path: &Path) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, FAKE_CONVERTER).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
    path.to_path_buf()
}

struct Fixture {
    _root: TempDir,
    input: PathBuf,
    output: PathBuf,
    converter: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let root = TempDir::new().unwrap();
        let input = root.path().join("in");
        let output = root.path().join("out");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(&output).unwrap();
        let converter = write_converter(&root.path().join("bin/marker_single"));
        Self {
            _root: root,
            input,
            output,
            converter,
        }
    }

    fn pdf(&self, stem: &str) -> PathBuf {
        let path = self.input.join(format!("{stem}.pdf"));
        std::fs::write(&path, b"%PDF-1.4 fake").unwrap();
        path
    }

    fn settings(&self, stems: &[&str]) -> marker_batch::BatchSettingsBuilder {
        BatchSettings::builder()
            .inputs(stems.iter().map(|s| InputEntry::new(self.pdf(s))))
            .output_root(&self.output)
            .converter(ConverterLocation::Program(self.converter.clone()))
    }
}

/// Records callbacks as short strings; optionally cancels on a matching line.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    cancel_on: Option<(String, CancelHandle)>,
}

impl Recorder {
    fn cancelling(needle: &str, handle: CancelHandle) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel_on: Some((needle.to_string(), handle)),
        }
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

impl BatchObserver for Recorder {
    fn on_batch_start(&self, total: usize) {
        self.push(format!("batch:{total}"));
    }
    fn on_item_start(&self, index: usize, _total: usize, _source: &Path) {
        self.push(format!("start:{index}"));
    }
    fn on_command(&self, index: usize, _command_line: &str) {
        self.push(format!("cmd:{index}"));
    }
    fn on_output_line(&self, index: usize, line: &str) {
        self.push(format!("line:{index}:{line}"));
        if let Some((needle, handle)) = &self.cancel_on {
            if line.contains(needle.as_str()) {
                handle.cancel();
            }
        }
    }
    fn on_item_success(&self, index: usize, _total: usize, _output_dir: &Path) {
        self.push(format!("ok:{index}"));
    }
    fn on_item_error(&self, index: usize, _total: usize, _error: &str) {
        self.push(format!("err:{index}"));
    }
    fn on_warning(&self, index: usize, _message: &str) {
        self.push(format!("warn:{index}"));
    }
    fn on_cancelled(&self, completed: usize, total: usize) {
        self.push(format!("cancelled:{completed}/{total}"));
    }
    fn on_fatal(&self, _error: &str) {
        self.push("fatal".to_string());
    }
    fn on_batch_complete(&self, summary: &BatchSummary) {
        self.push(format!("complete:{}/{}", summary.succeeded, summary.failed));
    }
}

async fn run(settings: &BatchSettings) -> (Result<BatchSummary, BatchError>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let result = BatchRunner::new().run(settings, recorder.clone()).await;
    (result, recorder)
}

#[tokio::test]
async fn every_item_succeeds() {
    let fx = Fixture::new();
    let settings = fx.settings(&["alpha", "beta", "gamma"]).build().unwrap();

    let (result, rec) = run(&settings).await;
    let summary = result.unwrap();

    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert!(summary.all_succeeded());
    for stem in ["alpha", "beta", "gamma"] {
        let md = fx.output.join(format!("{stem}_converted/{stem}.md"));
        assert!(md.exists(), "missing {}", md.display());
    }
    assert_eq!(rec.events().first().map(String::as_str), Some("batch:3"));
    assert_eq!(rec.events().last().map(String::as_str), Some("complete:3/0"));
}

#[tokio::test]
async fn items_run_in_input_order() {
    let fx = Fixture::new();
    let settings = fx.settings(&["zeta", "alpha"]).build().unwrap();

    let (result, rec) = run(&settings).await;
    result.unwrap();

    let starts: Vec<String> = rec
        .events()
        .into_iter()
        .filter(|e| e.starts_with("start:") || e.starts_with("ok:"))
        .collect();
    assert_eq!(starts, vec!["start:1", "ok:1", "start:2", "ok:2"]);
    assert!(rec.events().contains(&"line:1:done zeta".to_string()));
}

#[tokio::test]
async fn uncreatable_destination_fails_only_that_item() {
    let fx = Fixture::new();
    // A plain file where the second item's folder should go.
    std::fs::write(fx.output.join("beta"), b"in the way").unwrap();
    let settings = fx
        .settings(&["alpha", "beta", "gamma"])
        .create_subfolder(true)
        .build()
        .unwrap();

    let (result, rec) = run(&settings).await;
    let summary = result.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert!(matches!(
        summary.items[1].outcome,
        ItemOutcome::Failed {
            error: ItemError::CreateDir { .. }
        }
    ));
    assert!(rec.events().contains(&"start:3".to_string()));
    assert!(fx.output.join("gamma/gamma_converted/gamma.md").exists());
}

#[tokio::test]
async fn converter_failure_is_per_item() {
    let fx = Fixture::new();
    let settings = fx.settings(&["good", "bad_scan", "fine"]).build().unwrap();

    let (result, rec) = run(&settings).await;
    let summary = result.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        summary.items[1].outcome,
        ItemOutcome::Failed {
            error: ItemError::ConverterFailed { code: Some(2) }
        }
    );
    assert!(rec.events().contains(&"line:2:cannot read bad_scan".to_string()));
    assert_eq!(summary.summary_line(), "Conversion complete: 2 succeeded, 1 failed");
}

#[tokio::test]
async fn cancel_during_item_stops_the_batch() {
    let fx = Fixture::new();
    let settings = fx
        .settings(&["first", "second"])
        .env("FAKE_SLEEP", "30")
        .build()
        .unwrap();

    let runner = BatchRunner::new();
    let recorder = Arc::new(Recorder::cancelling("started first", runner.cancel_handle()));
    let started = Instant::now();
    let summary = runner.run(&settings, recorder.clone()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(summary.cancelled);
    assert_eq!(summary.items.len(), 1);
    assert_eq!(summary.items[0].outcome, ItemOutcome::Cancelled);
    assert_eq!(summary.not_attempted, 1);
    assert_eq!(summary.failed, 0);

    let events = recorder.events();
    assert!(!events.contains(&"start:2".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("cancelled:1/2"));
    assert_eq!(recorder.count("complete"), 0);
    assert_eq!(runner.state(), RunState::Finished);
}

#[tokio::test]
async fn runner_is_reusable_after_cancel() {
    let fx = Fixture::new();
    let slow = fx
        .settings(&["slow"])
        .env("FAKE_SLEEP", "30")
        .build()
        .unwrap();

    let runner = BatchRunner::new();
    let recorder = Arc::new(Recorder::cancelling("started", runner.cancel_handle()));
    assert!(runner.run(&slow, recorder).await.unwrap().cancelled);

    let quick = fx.settings(&["quick"]).build().unwrap();
    let summary = runner
        .run(&quick, Arc::new(Recorder::default()))
        .await
        .unwrap();
    assert!(!summary.cancelled);
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn missing_converter_is_fatal_and_reported_once() {
    let fx = Fixture::new();
    let settings = fx
        .settings(&["one", "two"])
        .converter(ConverterLocation::Program(PathBuf::from(
            "/nonexistent/marker_single",
        )))
        .build()
        .unwrap();

    let (result, rec) = run(&settings).await;

    assert!(matches!(result, Err(BatchError::ConverterNotFound { .. })));
    assert_eq!(rec.count("fatal"), 1);
    assert!(!rec.events().contains(&"start:2".to_string()));
}

#[tokio::test]
async fn invalid_page_range_fails_each_item_without_launching() {
    let fx = Fixture::new();
    let mut settings = fx
        .settings(&["one", "two"])
        .converter(ConverterLocation::Program(PathBuf::from(
            "/nonexistent/marker_single",
        )))
        .build()
        .unwrap();
    settings.pages = PageSelection::Range { start: 0, end: 2 };

    let (result, rec) = run(&settings).await;
    let summary = result.unwrap();

    assert_eq!(summary.failed, 2);
    assert_eq!(rec.count("cmd:"), 0);
    for item in &summary.items {
        assert_eq!(
            item.outcome,
            ItemOutcome::Failed {
                error: ItemError::InvalidPageRange { start: 0, end: 2 }
            }
        );
    }
}

#[tokio::test]
async fn page_range_reaches_the_converter_zero_based() {
    let fx = Fixture::new();
    let settings = fx
        .settings(&["doc"])
        .pages(PageSelection::Range { start: 2, end: 4 })
        .build()
        .unwrap();

    let (result, rec) = run(&settings).await;
    result.unwrap();
    assert!(rec.events().contains(&"line:1:range 1-3".to_string()));
}

#[tokio::test]
async fn converter_runs_unbuffered() {
    let fx = Fixture::new();
    let settings = fx.settings(&["doc"]).build().unwrap();

    let (_, rec) = run(&settings).await;
    assert!(rec.events().contains(&"line:1:unbuffered=1".to_string()));
}

#[tokio::test]
async fn move_places_pdf_beside_output() {
    let fx = Fixture::new();
    let settings = fx
        .settings(&["report"])
        .create_subfolder(true)
        .disposition(PdfDisposition::Move)
        .build()
        .unwrap();
    let source = settings.inputs[0].source.clone();

    let (result, _) = run(&settings).await;
    assert!(result.unwrap().all_succeeded());

    assert!(!source.exists());
    assert!(fx.output.join("report/report.pdf").is_file());
    assert!(fx.output.join("report/report_converted/report.md").exists());
}

#[tokio::test]
async fn backlink_leaves_link_at_source() {
    let fx = Fixture::new();
    let settings = fx
        .settings(&["paper"])
        .create_subfolder(true)
        .disposition(PdfDisposition::SymlinkBacklink)
        .build()
        .unwrap();
    let source = settings.inputs[0].source.clone();

    let (result, _) = run(&settings).await;
    assert!(result.unwrap().all_succeeded());

    let moved = fx.output.join("paper/paper.pdf");
    assert!(std::fs::symlink_metadata(&moved).unwrap().is_file());
    assert!(std::fs::symlink_metadata(&source)
        .unwrap()
        .file_type()
        .is_symlink());
    assert_eq!(std::fs::read_link(&source).unwrap(), moved.canonicalize().unwrap());
}

#[tokio::test]
async fn custom_name_renames_output_when_pdf_stays() {
    let fx = Fixture::new();
    let settings = BatchSettings::builder()
        .input(InputEntry::new(fx.pdf("scan_0042")).with_name("Invoice"))
        .output_root(&fx.output)
        .converter(ConverterLocation::Program(fx.converter.clone()))
        .build()
        .unwrap();

    let (result, _) = run(&settings).await;
    let summary = result.unwrap();

    let expected = fx.output.join("Invoice_converted");
    assert!(expected.join("scan_0042.md").exists());
    assert_eq!(
        summary.items[0].outcome,
        ItemOutcome::Succeeded {
            output_dir: expected
        }
    );
}

#[tokio::test]
async fn dot_dot_name_fails_the_item_inside_the_output_root() {
    let fx = Fixture::new();
    let out = fx.output.join("nested");
    let source = fx.pdf("doc");
    let mut settings = fx
        .settings(&["ok"])
        .output_root(&out)
        .create_subfolder(true)
        .disposition(PdfDisposition::Move)
        .build()
        .unwrap();
    settings.inputs.insert(0, InputEntry::new(&source).with_name(".."));

    let (result, rec) = run(&settings).await;
    let summary = result.unwrap();

    assert_eq!(
        summary.items[0].outcome,
        ItemOutcome::Failed {
            error: ItemError::InvalidName {
                name: "..".to_string()
            }
        }
    );
    assert_eq!(summary.items[0].destination, None);
    assert!(source.exists(), "the PDF must not be moved");
    assert!(!fx.output.join("doc.pdf").exists());
    assert!(!fx.output.join("doc_converted").exists());
    assert_eq!(rec.count("cmd:1"), 0);

    assert_eq!(summary.succeeded, 1);
    assert!(out.join("ok/ok_converted/ok.md").exists());
}

#[tokio::test]
async fn existing_rename_target_is_a_warning_not_a_failure() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.output.join("doc_converted")).unwrap();
    let settings = fx.settings(&["doc"]).build().unwrap();

    let (result, rec) = run(&settings).await;
    let summary = result.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(rec.count("warn:1"), 1);
    assert!(fx.output.join("doc/doc.md").exists());
}

#[tokio::test]
async fn custom_suffix_is_applied() {
    let fx = Fixture::new();
    let settings = fx.settings(&["doc"]).output_suffix(".md-out").build().unwrap();

    let (result, _) = run(&settings).await;
    result.unwrap();
    assert!(fx.output.join("doc.md-out/doc.md").exists());
}

#[tokio::test]
async fn local_install_is_used_when_present() {
    let fx = Fixture::new();
    let install_root = fx.output.parent().unwrap().join("app");
    write_converter(&install_root.join(".venv/bin/marker_single"));

    let settings = fx
        .settings(&["doc"])
        .converter(ConverterLocation::LocalFirst { install_root })
        .build()
        .unwrap();

    let (result, _) = run(&settings).await;
    assert_eq!(result.unwrap().succeeded, 1);
}

#[tokio::test]
async fn second_run_while_active_is_refused() {
    let fx = Fixture::new();
    let settings = fx
        .settings(&["slow"])
        .env("FAKE_SLEEP", "30")
        .build()
        .unwrap();

    let runner = BatchRunner::new();
    let task = tokio::spawn({
        let runner = runner.clone();
        let settings = settings.clone();
        async move { runner.run(&settings, Arc::new(Recorder::default())).await }
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    while runner.state() != RunState::Running {
        assert!(Instant::now() < deadline, "runner never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let second = runner.run(&settings, Arc::new(Recorder::default())).await;
    assert!(matches!(second, Err(BatchError::AlreadyRunning)));

    runner.cancel_handle().cancel();
    let first = task.await.unwrap().unwrap();
    assert!(first.cancelled);
}

//! Converter process: spawn, stream merged output lines, honour cancellation.
//!
//! stdout and stderr are read concurrently and merged into one line stream,
//! matching what a terminal would show. Bytes are decoded lossily so a stray
//! non-UTF-8 progress bar never stops the stream.
//!
//! Cancellation is cooperative. The flag is checked after every forwarded
//! line, and the read loop also wakes on the flag itself so a converter that
//! prints nothing is still stopped promptly. Once cancelled, forwarding
//! stops, the child is asked to terminate, and its exit is still awaited
//! before returning so no process outlives its item.

use crate::error::ItemError;
use crate::pipeline::command::Invocation;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_stream::wrappers::SplitStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// How the converter ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessReport {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    pub success: bool,
    /// Cancellation fired while the process was running.
    pub cancelled: bool,
    /// Lines forwarded to the observer.
    pub lines: usize,
}

/// Why the converter could not be run at all.
#[derive(Debug)]
pub enum LaunchError {
    /// Executable missing: fatal for the whole batch.
    NotFound(PathBuf),
    /// Anything else: fatal for this item only.
    Item(ItemError),
}

/// Run `invocation` to completion, forwarding each output line to `on_line`.
pub async fn run_streaming(
    invocation: &Invocation,
    cancel: &mut watch::Receiver<bool>,
    mut on_line: impl FnMut(&str),
) -> Result<ProcessReport, LaunchError> {
    let mut cmd = invocation.to_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            LaunchError::NotFound(invocation.program.clone())
        } else {
            LaunchError::Item(ItemError::Spawn {
                detail: e.to_string(),
            })
        }
    })?;
    debug!("Spawned converter pid {:?}", child.id());

    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

    let mut lines = SplitStream::new(BufReader::new(stdout).split(b'\n'))
        .merge(SplitStream::new(BufReader::new(stderr).split(b'\n')));

    let mut forwarded = 0usize;
    let mut cancelled = *cancel.borrow();

    while !cancelled {
        // The flag is only read once the select has dropped its futures.
        let next = tokio::select! {
            next = lines.next() => Some(next),
            Ok(()) = async { cancel.wait_for(|c| *c).await.map(|_| ()) } => None,
        };
        match next {
            Some(Some(Ok(raw))) => {
                on_line(&decode_line(&raw));
                forwarded += 1;
                cancelled = *cancel.borrow();
            }
            Some(Some(Err(e))) => {
                warn!("Reading converter output failed: {}", e);
                break;
            }
            Some(None) => break,
            None => cancelled = true,
        }
    }

    if cancelled {
        debug!("Cancellation requested, terminating converter");
        if let Err(e) = child.start_kill() {
            // Already exited between the last line and the kill.
            debug!("Terminate request not delivered: {}", e);
        }
    }
    drop(lines);

    let status = child.wait().await.map_err(|e| {
        LaunchError::Item(ItemError::Stream {
            detail: e.to_string(),
        })
    })?;

    Ok(ProcessReport {
        code: status.code(),
        success: status.success(),
        cancelled,
        lines: forwarded,
    })
}

fn missing_pipe(name: &str) -> LaunchError {
    LaunchError::Item(ItemError::Stream {
        detail: format!("{name} pipe missing"),
    })
}

fn decode_line(raw: &[u8]) -> String {
    let trimmed = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(trimmed).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_carriage_return() {
        assert_eq!(decode_line(b"page 3/10\r"), "page 3/10");
        assert_eq!(decode_line(b"plain"), "plain");
    }

    #[test]
    fn decode_is_lossy() {
        assert_eq!(decode_line(&[b'o', b'k', 0xff]), "ok\u{FFFD}");
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::ffi::OsString;
        use std::time::{Duration, Instant};

        fn sh(script: &str) -> Invocation {
            Invocation {
                program: PathBuf::from("/bin/sh"),
                args: vec![OsString::from("-c"), OsString::from(script)],
                env: vec![],
            }
        }

        #[tokio::test]
        async fn merges_stdout_and_stderr() {
            let (_tx, mut rx) = watch::channel(false);
            let mut seen = Vec::new();
            let report = run_streaming(&sh("echo out; echo err 1>&2"), &mut rx, |l| {
                seen.push(l.to_string())
            })
            .await
            .unwrap();

            assert!(report.success);
            assert_eq!(report.lines, 2);
            seen.sort();
            assert_eq!(seen, vec!["err", "out"]);
        }

        #[tokio::test]
        async fn reports_exit_code() {
            let (_tx, mut rx) = watch::channel(false);
            let report = run_streaming(&sh("exit 3"), &mut rx, |_| {}).await.unwrap();
            assert!(!report.success);
            assert_eq!(report.code, Some(3));
            assert!(!report.cancelled);
        }

        #[tokio::test]
        async fn missing_program_is_not_found() {
            let (_tx, mut rx) = watch::channel(false);
            let inv = Invocation {
                program: PathBuf::from("/definitely/not/marker_single"),
                args: vec![],
                env: vec![],
            };
            let err = run_streaming(&inv, &mut rx, |_| {}).await.unwrap_err();
            assert!(matches!(err, LaunchError::NotFound(_)));
        }

        #[tokio::test]
        async fn cancel_terminates_silent_process() {
            let (tx, mut rx) = watch::channel(false);
            let started = Instant::now();
            let canceller = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                tx.send_replace(true);
                tx
            });

            let report = run_streaming(&sh("sleep 30"), &mut rx, |_| {}).await.unwrap();
            let _tx = canceller.await.unwrap();

            assert!(report.cancelled);
            assert!(!report.success);
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn cancel_stops_forwarding_lines() {
            let (tx, mut rx) = watch::channel(false);
            let mut count = 0;
            let report = run_streaming(
                &sh("i=0; while [ $i -lt 1000 ]; do echo line $i; i=$((i+1)); sleep 0.01; done"),
                &mut rx,
                |_| {
                    count += 1;
                    if count == 3 {
                        tx.send_replace(true);
                    }
                },
            )
            .await
            .unwrap();

            assert!(report.cancelled);
            assert_eq!(report.lines, 3);
        }
    }
}

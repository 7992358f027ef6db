//! Streaming scheduler-latency source.
//!
//! Supervises the long-lived `sched_latency -c` child process and folds its
//! CSV stream into a per-category snapshot without ever blocking the
//! sampling tick: a background task moves lines into an unbounded channel,
//! and [`SchedLatencySource::poll`] drains whatever has already arrived.

pub mod parse;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::source::{is_executable, Reading, Value};

use self::parse::{parse_line, LatencyRecord};

/// Grace period between SIGTERM and SIGKILL on stop.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Runs the BPF `sched_latency` tool as a child process and exposes its most
/// recent per-category latency statistics.
///
/// Categories that produced no new line since the last poll keep their last
/// known values: a category that emits less often than the sampling interval
/// must not flap between data and empty cells.
pub struct SchedLatencySource {
    bin: PathBuf,
    child: Option<Child>,
    lines: Option<mpsc::UnboundedReceiver<String>>,
    reader: Option<JoinHandle<()>>,
    snapshot: Reading,
}

impl SchedLatencySource {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            child: None,
            lines: None,
            reader: None,
            snapshot: Reading::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        "BPF sched_latency"
    }

    pub fn available(&self) -> bool {
        is_executable(&self.bin)
    }

    /// Launch the child with the sampling interval and an optional per-PID
    /// fairness output file.
    ///
    /// The first stdout line is the CSV header and is consumed here so that
    /// `poll` only ever sees data lines. Launch failure leaves the source
    /// inert for the rest of the run; it is logged, not fatal.
    pub fn start(&mut self, interval: Duration, fairness_file: Option<&Path>) {
        if !self.available() {
            return;
        }

        let mut cmd = Command::new(&self.bin);
        cmd.arg("-c")
            .arg("-i")
            .arg(interval.as_secs().max(1).to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(path) = fairness_file {
            cmd.arg("-f").arg(path);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(bin = %self.bin.display(), error = %e, "failed to start sched_latency");
                return;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            warn!("sched_latency spawned without a stdout pipe");
            return;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();

            // Skip the CSV header.
            match lines.next_line().await {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => return,
            }

            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    return;
                }
            }
        });

        self.child = Some(child);
        self.lines = Some(rx);
        self.reader = Some(reader);
    }

    /// Drain every line that has already arrived and fold it into the
    /// snapshot. Returns immediately when no more output is ready; never
    /// waits for the child.
    pub fn poll(&mut self) -> Reading {
        if let Some(rx) = self.lines.as_mut() {
            while let Ok(line) = rx.try_recv() {
                match parse_line(&line) {
                    Ok(record) => fold(&mut self.snapshot, &record),
                    Err(e) => debug!(error = %e, line, "discarding sched_latency line"),
                }
            }
        }
        self.snapshot.clone()
    }

    /// Request graceful termination, escalating to SIGKILL after the grace
    /// period. Safe to call when the child never started.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Some(raw_pid) = child.id() {
            let _ = kill(Pid::from_raw(raw_pid as i32), Signal::SIGTERM);
        }

        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "sched_latency exited"),
            Ok(Err(e)) => warn!(error = %e, "waiting for sched_latency"),
            Err(_) => {
                warn!("sched_latency ignored SIGTERM, killing");
                let _ = child.kill().await;
            }
        }

        if let Some(reader) = self.reader.take() {
            // The pipe is closed now, so the reader task ends on its own.
            let _ = tokio::time::timeout(Duration::from_secs(1), reader).await;
        }
        self.lines = None;
    }
}

/// Replace one category's columns in the snapshot, plus the shared
/// context-switch counters when the line carried them.
fn fold(snapshot: &mut Reading, record: &LatencyRecord) {
    let values = [
        record.count,
        record.avg_ns,
        record.p50_ns,
        record.p95_ns,
        record.p99_ns,
    ];
    for (column, value) in record.category.columns().into_iter().zip(values) {
        snapshot.insert(column, Value::U64(value));
    }

    if let Some(csw) = record.csw {
        snapshot.insert("total_csw_per_sec", Value::U64(csw.total));
        snapshot.insert("voluntary_csw_per_sec", Value::U64(csw.voluntary));
        snapshot.insert("involuntary_csw_per_sec", Value::U64(csw.involuntary));
    }
}

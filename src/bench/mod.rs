//! One-shot throughput benchmarks.
//!
//! Each benchmark runs exactly once before the sampling loop starts, with a
//! bounded wall-clock timeout, and extracts a single numeric result from the
//! child's stdout. Timeouts, spawn failures, and missing result patterns all
//! produce an empty [`Reading`]; benchmarks are never retried.

pub mod fairness;

use std::ffi::{OsStr, OsString};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::source::{find_on_path, Reading, Value};

pub use fairness::FairnessSource;

/// hackbench output: "Time: 1.234".
static HACKBENCH_RESULT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Time:\s+([\d.]+)").expect("valid regex"));

/// sysbench output: "events per second:  1234.56".
static SYSBENCH_RESULT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"events per second:\s+([\d.]+)").expect("valid regex"));

/// Run `command` with `args`, returning captured stdout, or `None` on spawn
/// failure or timeout. A timed-out child is killed when the future is
/// dropped (`kill_on_drop`).
async fn run_with_timeout(command: &OsStr, args: &[OsString], timeout: Duration) -> Option<String> {
    let output = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output).await {
        Ok(Ok(out)) => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
        Ok(Err(e)) => {
            debug!(command = %command.to_string_lossy(), error = %e, "benchmark failed to run");
            None
        }
        Err(_) => {
            debug!(command = %command.to_string_lossy(), "benchmark timed out");
            None
        }
    }
}

/// Extract the first capture group of `pattern` from `stdout` as a float.
fn extract_result(pattern: &Regex, stdout: &str) -> Option<f64> {
    pattern
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Runs `hackbench -l 1000` once and captures the total completion time.
/// Lower is better; the polarity is consumed by the reporting layer.
pub struct HackbenchSource {
    command: OsString,
}

impl HackbenchSource {
    pub fn new() -> Self {
        Self::with_command("hackbench")
    }

    /// Use an alternate command name (used by tests).
    pub fn with_command(command: impl Into<OsString>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        "hackbench"
    }

    pub fn available(&self) -> bool {
        find_on_path(&self.command).is_some()
    }

    pub async fn run_once(&self) -> Reading {
        let mut result = Reading::new();

        let args = [OsString::from("-l"), OsString::from("1000")];
        let Some(stdout) =
            run_with_timeout(&self.command, &args, Duration::from_secs(120)).await
        else {
            return result;
        };

        if let Some(secs) = extract_result(&HACKBENCH_RESULT, &stdout) {
            result.insert("hackbench_time_sec", Value::F64(secs));
        }
        result
    }
}

impl Default for HackbenchSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `sysbench cpu run` once and captures the events/sec throughput.
/// Higher is better.
pub struct SysbenchSource {
    command: OsString,
}

impl SysbenchSource {
    pub fn new() -> Self {
        Self::with_command("sysbench")
    }

    /// Use an alternate command name (used by tests).
    pub fn with_command(command: impl Into<OsString>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        "sysbench"
    }

    pub fn available(&self) -> bool {
        find_on_path(&self.command).is_some()
    }

    /// `duration` bounds the benchmark itself; the wall-clock timeout adds a
    /// 30 second margin for startup and teardown.
    pub async fn run_once(&self, duration: Duration) -> Reading {
        let mut result = Reading::new();

        let secs = duration.as_secs().max(1);
        let args = [
            OsString::from("cpu"),
            OsString::from(format!("--time={secs}")),
            OsString::from("run"),
        ];
        let timeout = Duration::from_secs(secs + 30);
        let Some(stdout) = run_with_timeout(&self.command, &args, timeout).await else {
            return result;
        };

        if let Some(events) = extract_result(&SYSBENCH_RESULT, &stdout) {
            result.insert("sysbench_events_per_sec", Value::F64(events));
        }
        result
    }
}

impl Default for SysbenchSource {
    fn default() -> Self {
        Self::new()
    }
}

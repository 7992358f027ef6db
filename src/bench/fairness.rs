//! Fairness harness source and Jain's fairness index.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::source::{is_executable, round_dp, Reading, Value};

/// How long each harness worker runs.
const HARNESS_DURATION: Duration = Duration::from_secs(5);

/// Margin added to the harness duration for the wall-clock timeout.
const TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

/// Cap on the number of harness workers regardless of CPU count.
const MAX_WORKERS: usize = 16;

/// Runs the fairness harness once and condenses its per-worker runtimes into
/// Jain's fairness index.
///
/// The harness prints a `pid,elapsed_ns` header followed by one line per
/// worker; malformed lines are skipped the same way other subprocess output
/// is tolerated.
pub struct FairnessSource {
    bin: PathBuf,
}

impl FairnessSource {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn name(&self) -> &'static str {
        "fairness_harness"
    }

    pub fn available(&self) -> bool {
        is_executable(&self.bin)
    }

    pub async fn run_once(&self) -> Reading {
        let nprocs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(MAX_WORKERS);

        let args = [
            OsString::from("-n"),
            OsString::from(nprocs.to_string()),
            OsString::from("-t"),
            OsString::from(HARNESS_DURATION.as_secs().to_string()),
        ];
        let timeout = HARNESS_DURATION + TIMEOUT_MARGIN;
        let Some(stdout) =
            super::run_with_timeout(self.bin.as_os_str(), &args, timeout).await
        else {
            return Reading::new();
        };

        let runtimes = parse_runtimes(&stdout);
        let mut result = Reading::new();
        if runtimes.len() >= 2 {
            result.insert(
                "jain_fairness_index",
                Value::F64(round_dp(jain_index(&runtimes), 6)),
            );
        }
        result
    }
}

/// Extract per-worker elapsed nanoseconds from `pid,elapsed_ns` lines.
fn parse_runtimes(stdout: &str) -> Vec<f64> {
    stdout
        .lines()
        .filter(|line| !line.starts_with("pid"))
        .filter_map(|line| {
            let mut parts = line.split(',');
            let _pid = parts.next()?;
            parts.next()?.trim().parse::<u64>().ok()
        })
        .map(|ns| ns as f64)
        .collect()
}

/// Jain's fairness index: `(Σx)² / (n · Σx²)`, range (0, 1].
///
/// All-zero inputs score 1.0: a set of equally idle workers is not unfair.
pub fn jain_index(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = values.iter().sum();
    let sum_sq: f64 = values.iter().map(|x| x * x).sum();
    if sum_sq == 0.0 {
        return 1.0;
    }
    (sum * sum) / (n as f64 * sum_sq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jain_equal_values_is_perfect() {
        assert_eq!(jain_index(&[10.0, 10.0, 10.0, 10.0]), 1.0);
    }

    #[test]
    fn test_jain_one_hog() {
        assert_eq!(jain_index(&[100.0, 0.0]), 0.5);
    }

    #[test]
    fn test_jain_all_idle_is_perfect() {
        assert_eq!(jain_index(&[0.0, 0.0, 0.0]), 1.0);
    }

    #[test]
    fn test_jain_empty() {
        assert_eq!(jain_index(&[]), 0.0);
    }

    #[test]
    fn test_parse_runtimes_skips_header_and_garbage() {
        let stdout = "pid,elapsed_ns\n1234,5000000000\nnot-a-line\n1235,abc\n1236,4900000000\n";
        assert_eq!(parse_runtimes(stdout), vec![5_000_000_000.0, 4_900_000_000.0]);
    }

    #[test]
    fn test_parse_runtimes_empty_output() {
        assert!(parse_runtimes("").is_empty());
    }

    #[tokio::test]
    async fn test_run_once_missing_binary_is_empty() {
        let src = FairnessSource::new("/nonexistent/fairness_harness");
        assert!(!src.available());
        assert!(src.run_once().await.is_empty());
    }
}

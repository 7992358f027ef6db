use std::path::PathBuf;
use std::time::Instant;

use crate::source::{round_dp, Reading, Value};

/// Reads timeslice and run-queue wait totals from `/proc/schedstat`.
///
/// Sums the per-CPU counters across all `cpu*` lines; emits per-second rates
/// once two successive samples exist.
pub struct SchedstatSource {
    path: PathBuf,
    prev: Option<(u64, u64)>,
    prev_time: Option<Instant>,
}

impl SchedstatSource {
    pub fn new() -> Self {
        Self::with_path("/proc/schedstat")
    }

    /// Read from an alternate schedstat file (used by tests).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            prev: None,
            prev_time: None,
        }
    }

    pub fn name(&self) -> &'static str {
        "/proc/schedstat"
    }

    pub fn available(&self) -> bool {
        self.path.exists()
    }

    pub fn read(&mut self) -> Reading {
        let mut result = Reading::new();

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return result,
        };

        let now = Instant::now();
        let mut total_slices: u64 = 0;
        let mut total_wait: u64 = 0;

        for line in contents.lines() {
            if !line.starts_with("cpu") {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 9 {
                continue;
            }
            // Field 8 = timeslices run, field 7 = time spent waiting to run (ns).
            let (Ok(slices), Ok(wait)) = (parts[8].parse::<u64>(), parts[7].parse::<u64>()) else {
                continue;
            };
            total_slices += slices;
            total_wait += wait;
        }

        if let (Some((prev_slices, prev_wait)), Some(prev_time)) = (self.prev, self.prev_time) {
            let dt = now.duration_since(prev_time).as_secs_f64();
            if dt > 0.0 {
                let slice_rate = total_slices.saturating_sub(prev_slices) as f64 / dt;
                let wait_rate = total_wait.saturating_sub(prev_wait) as f64 / dt;
                result.insert("timeslices_per_sec", Value::F64(round_dp(slice_rate, 1)));
                result.insert("wait_ns_per_sec", Value::F64(round_dp(wait_rate, 0)));
            }
        }

        self.prev = Some((total_slices, total_wait));
        self.prev_time = Some(now);
        result
    }
}

impl Default for SchedstatSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_schedstat(dir: &tempfile::TempDir, wait: u64, slices: u64) -> PathBuf {
        let path = dir.path().join("schedstat");
        let mut f = std::fs::File::create(&path).expect("create schedstat fixture");
        writeln!(f, "version 15").expect("write");
        writeln!(f, "timestamp 4294892447").expect("write");
        writeln!(f, "cpu0 0 0 0 0 0 0 {wait} 0 {slices}").expect("write");
        path
    }

    #[test]
    fn test_first_read_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_schedstat(&dir, 1000, 50);

        let mut src = SchedstatSource::with_path(&path);
        assert!(src.read().is_empty());
    }

    #[test]
    fn test_second_read_emits_rates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_schedstat(&dir, 1000, 50);

        let mut src = SchedstatSource::with_path(&path);
        src.read();

        write_schedstat(&dir, 3000, 150);
        let reading = src.read();

        assert!(reading.contains_key("timeslices_per_sec"));
        assert!(reading.contains_key("wait_ns_per_sec"));
    }

    #[test]
    fn test_short_cpu_lines_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schedstat");
        std::fs::write(&path, "cpu0 1 2 3\n").expect("write fixture");

        let mut src = SchedstatSource::with_path(&path);
        src.read();
        let reading = src.read();

        // Baseline is (0, 0) both times; rates are emitted but zero.
        assert_eq!(reading.get("timeslices_per_sec"), Some(&Value::F64(0.0)));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let mut src = SchedstatSource::with_path("/nonexistent/proc/schedstat");
        assert!(!src.available());
        assert!(src.read().is_empty());
    }
}

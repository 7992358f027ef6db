//! Append-only CSV sink with a fixed superset column schema.
//!
//! The column set and order are the contract with the external reporting
//! layer: every row has exactly these columns, absent metrics render as
//! empty cells, and extra keys supplied by a source are dropped. Zero is a
//! measured value and never collapses to an empty cell.

pub mod meta;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::source::{Reading, Value};

pub use meta::RunMeta;

/// Fixed output schema, in column order.
pub const COLUMNS: [&str; 35] = [
    "timestamp",
    "elapsed_s",
    "scheduler",
    // /proc/stat
    "cpu_util_pct",
    "ctx_switches_per_sec",
    "nr_running",
    // /proc/schedstat
    "timeslices_per_sec",
    "wait_ns_per_sec",
    // RAPL power
    "power_watts",
    // BPF latency (sched_delay)
    "sched_delay_count",
    "sched_delay_avg_ns",
    "sched_delay_p50_ns",
    "sched_delay_p95_ns",
    "sched_delay_p99_ns",
    // BPF latency (runqueue)
    "runqueue_count",
    "runqueue_avg_ns",
    "runqueue_p50_ns",
    "runqueue_p95_ns",
    "runqueue_p99_ns",
    // BPF latency (wakeup)
    "wakeup_count",
    "wakeup_avg_ns",
    "wakeup_p50_ns",
    "wakeup_p95_ns",
    "wakeup_p99_ns",
    // BPF latency (preemption)
    "preemption_count",
    "preemption_avg_ns",
    "preemption_p50_ns",
    "preemption_p95_ns",
    "preemption_p99_ns",
    // BPF context switch counters
    "total_csw_per_sec",
    "voluntary_csw_per_sec",
    "involuntary_csw_per_sec",
    // Throughput
    "hackbench_time_sec",
    "sysbench_events_per_sec",
    // Fairness
    "jain_fairness_index",
];

/// Streaming CSV writer for sample rows.
pub struct CsvSink {
    writer: BufWriter<File>,
}

impl CsvSink {
    /// Create the output file and write the header line. Failure here is
    /// fatal to the run.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("creating CSV output {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "{}", COLUMNS.join(",")).context("writing CSV header")?;
        writer.flush().context("flushing CSV header")?;

        Ok(Self { writer })
    }

    /// Append one row and flush it to disk so a killed run still leaves a
    /// complete file behind.
    pub fn append(&mut self, row: &Reading) -> Result<()> {
        let mut line = String::new();
        for (i, column) in COLUMNS.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            if let Some(value) = row.get(column) {
                push_cell(&mut line, value);
            }
        }

        writeln!(self.writer, "{line}").context("writing CSV row")?;
        self.writer.flush().context("flushing CSV row")?;
        Ok(())
    }
}

/// Serialize one cell, quoting free-text values that would break the format.
fn push_cell(line: &mut String, value: &Value) {
    match value {
        Value::Text(s) if s.contains(',') || s.contains('"') => {
            line.push('"');
            line.push_str(&s.replace('"', "\"\""));
            line.push('"');
        }
        other => line.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .expect("read sink output")
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_header_matches_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        CsvSink::create(&path).expect("create sink");

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].split(',').count(), COLUMNS.len());
        assert!(lines[0].starts_with("timestamp,elapsed_s,scheduler,cpu_util_pct"));
        assert!(lines[0].ends_with("jain_fairness_index"));
    }

    #[test]
    fn test_absent_metrics_render_empty_and_zero_stays_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::create(&path).expect("create sink");

        let mut row = Reading::new();
        row.insert("timestamp", Value::Text("2026-08-30T12:00:00".into()));
        row.insert("elapsed_s", Value::F64(1.0));
        row.insert("scheduler", Value::Text("eevdf".into()));
        row.insert("cpu_util_pct", Value::F64(0.0));
        sink.append(&row).expect("append");

        let lines = read_lines(&path);
        let cells: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(cells.len(), COLUMNS.len());
        assert_eq!(cells[0], "2026-08-30T12:00:00");
        assert_eq!(cells[1], "1");
        assert_eq!(cells[2], "eevdf");
        // Zero is a measurement, not absence.
        assert_eq!(cells[3], "0");
        // Everything else was not measured this tick.
        assert!(cells[4..].iter().all(|c| c.is_empty()));
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::create(&path).expect("create sink");

        let mut row = Reading::new();
        row.insert("scheduler", Value::Text("eevdf".into()));
        row.insert("not_a_real_column", Value::U64(7));
        sink.append(&row).expect("append");

        let lines = read_lines(&path);
        assert!(!lines[1].contains('7'));
        assert_eq!(lines[1].split(',').count(), COLUMNS.len());
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        assert!(CsvSink::create(Path::new("/nonexistent/dir/out.csv")).is_err());
    }

    #[test]
    fn test_text_cells_with_commas_are_quoted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::create(&path).expect("create sink");

        let mut row = Reading::new();
        row.insert("scheduler", Value::Text("weird,label".into()));
        sink.append(&row).expect("append");

        let lines = read_lines(&path);
        assert!(lines[1].contains("\"weird,label\""));
    }
}

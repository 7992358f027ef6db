use std::path::PathBuf;
use std::time::Instant;

use crate::source::{round_dp, Reading, Value};

/// Reads CPU utilization, context switch rate, and run queue length from
/// `/proc/stat`.
///
/// Utilization and context switches are delta-based and need two successive
/// samples; `nr_running` is instantaneous.
pub struct ProcStatSource {
    path: PathBuf,
    prev_cpu: Option<(u64, u64)>,
    prev_ctxt: Option<u64>,
    prev_time: Option<Instant>,
}

impl ProcStatSource {
    pub fn new() -> Self {
        Self::with_path("/proc/stat")
    }

    /// Read from an alternate stat file (used by tests).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            prev_cpu: None,
            prev_ctxt: None,
            prev_time: None,
        }
    }

    pub fn name(&self) -> &'static str {
        "/proc/stat"
    }

    pub fn available(&self) -> bool {
        self.path.exists()
    }

    /// Sample the stat file and emit whatever rates are derivable.
    ///
    /// The raw sample always becomes the new baseline, even when no rate was
    /// emitted, so one failed computation does not desynchronize later deltas.
    pub fn read(&mut self) -> Reading {
        let mut result = Reading::new();

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return result,
        };

        let now = Instant::now();

        for line in contents.lines() {
            if let Some(rest) = line.strip_prefix("cpu ") {
                let fields: Vec<u64> = rest
                    .split_whitespace()
                    .filter_map(|tok| tok.parse().ok())
                    .collect();
                if fields.is_empty() {
                    continue;
                }

                // user, nice, system, idle, iowait, irq, softirq, steal.
                let total: u64 = if fields.len() >= 8 {
                    fields[..8].iter().sum()
                } else {
                    fields.iter().sum()
                };
                let idle = fields.get(3).copied().unwrap_or(0);

                if let Some((prev_total, prev_idle)) = self.prev_cpu {
                    let d_total = total.saturating_sub(prev_total);
                    let d_idle = idle.saturating_sub(prev_idle);
                    if d_total > 0 {
                        let util = 100.0 * (1.0 - d_idle as f64 / d_total as f64);
                        result.insert("cpu_util_pct", Value::F64(round_dp(util, 2)));
                    }
                }
                self.prev_cpu = Some((total, idle));
            } else if let Some(rest) = line.strip_prefix("ctxt ") {
                let Ok(ctxt) = rest.trim().parse::<u64>() else {
                    continue;
                };

                if let (Some(prev_ctxt), Some(prev_time)) = (self.prev_ctxt, self.prev_time) {
                    let dt = now.duration_since(prev_time).as_secs_f64();
                    if dt > 0.0 {
                        let rate = ctxt.saturating_sub(prev_ctxt) as f64 / dt;
                        result.insert("ctx_switches_per_sec", Value::F64(round_dp(rate, 1)));
                    }
                }
                self.prev_ctxt = Some(ctxt);
            } else if let Some(rest) = line.strip_prefix("procs_running ") {
                if let Ok(running) = rest.trim().parse::<u64>() {
                    result.insert("nr_running", Value::U64(running));
                }
            }
        }

        self.prev_time = Some(now);
        result
    }
}

impl Default for ProcStatSource {
    fn default() -> Self {
        Self::new()
    }
}

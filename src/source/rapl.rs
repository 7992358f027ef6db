use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::source::{round_dp, Reading, Value};

/// RAPL energy counters are 32-bit microjoule values that wrap.
const ENERGY_WRAP_UJ: i64 = 1 << 32;

/// Reads package power draw from Intel RAPL sysfs energy counters.
///
/// Sums `energy_uj` across all top-level `intel-rapl:N` domains (sub-domains
/// like `intel-rapl:0:0` are excluded to avoid double counting) and converts
/// the microjoule delta into watts.
pub struct RaplSource {
    paths: Vec<PathBuf>,
    prev_uj: Option<u64>,
    prev_time: Option<Instant>,
}

impl RaplSource {
    pub fn new() -> Self {
        Self::with_paths(discover(Path::new("/sys/class/powercap")))
    }

    /// Build from explicit `energy_uj` paths (used by tests).
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            prev_uj: None,
            prev_time: None,
        }
    }

    pub fn name(&self) -> &'static str {
        "RAPL energy"
    }

    pub fn available(&self) -> bool {
        !self.paths.is_empty()
    }

    pub fn read(&mut self) -> Reading {
        let mut result = Reading::new();
        if self.paths.is_empty() {
            return result;
        }

        let now = Instant::now();
        let mut total_uj: u64 = 0;
        for path in &self.paths {
            let Ok(raw) = std::fs::read_to_string(path) else {
                // One unreadable domain drops the whole tick; the baseline
                // is left untouched so the next delta stays consistent.
                return result;
            };
            let Ok(uj) = raw.trim().parse::<u64>() else {
                return result;
            };
            total_uj += uj;
        }

        if let (Some(prev_uj), Some(prev_time)) = (self.prev_uj, self.prev_time) {
            let dt = now.duration_since(prev_time).as_secs_f64();
            if dt > 0.0 {
                let mut d_uj = total_uj as i64 - prev_uj as i64;
                if d_uj < 0 {
                    // Counter wrapped.
                    d_uj += ENERGY_WRAP_UJ;
                }
                let watts = d_uj as f64 / (dt * 1e6);
                result.insert("power_watts", Value::F64(round_dp(watts, 2)));
            }
        }

        self.prev_uj = Some(total_uj);
        self.prev_time = Some(now);
        result
    }
}

impl Default for RaplSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Enumerate top-level RAPL package domains under `base`.
fn discover(base: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(base) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| {
            name.strip_prefix("intel-rapl:")
                .is_some_and(|rest| !rest.contains(':'))
        })
        .collect();
    names.sort();

    names
        .into_iter()
        .map(|name| base.join(name).join("energy_uj"))
        .filter(|p| p.exists())
        .collect()
}

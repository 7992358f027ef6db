use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for a collection run.
///
/// Loadable from a YAML file; every field has a default so the CLI can also
/// build a config from flags alone.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Free-text label of the scheduler variant under test.
    #[serde(default = "default_scheduler")]
    pub scheduler: String,

    /// Path to a sched_ext scheduler binary to launch for the run. When
    /// unset, the currently installed scheduler is measured as-is.
    #[serde(default)]
    pub sched_bin: Option<PathBuf>,

    /// Collection duration. Zero means run until a signal arrives.
    #[serde(default = "default_duration", with = "humantime_serde")]
    pub duration: Duration,

    /// Sampling interval. Default: 1s.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Output directory for the CSV and metadata files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Path to the BPF sched_latency binary.
    #[serde(default = "default_sched_latency_bin")]
    pub sched_latency_bin: PathBuf,

    /// Path to the fairness harness binary.
    #[serde(default = "default_fairness_bin")]
    pub fairness_bin: PathBuf,

    /// How long to let a freshly launched scheduler attach before
    /// measurement begins. Default: 2s.
    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,
}

impl Config {
    /// Load and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.is_empty() {
            bail!("scheduler label is required");
        }

        if self.interval.is_zero() {
            bail!("interval must be positive");
        }

        if !self.duration.is_zero() && self.duration < self.interval {
            bail!("duration must be at least one interval");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: default_scheduler(),
            sched_bin: None,
            duration: default_duration(),
            interval: default_interval(),
            output_dir: default_output_dir(),
            sched_latency_bin: default_sched_latency_bin(),
            fairness_bin: default_fairness_bin(),
            settle_delay: default_settle_delay(),
        }
    }
}

// --- Default value functions ---

fn default_scheduler() -> String {
    "default".to_string()
}

fn default_duration() -> Duration {
    Duration::from_secs(300)
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_sched_latency_bin() -> PathBuf {
    PathBuf::from("build/sched_latency")
}

fn default_fairness_bin() -> PathBuf {
    PathBuf::from("workloads/build/fairness_harness")
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(2)
}

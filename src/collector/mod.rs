//! Collection orchestrator.
//!
//! Drives the fixed-interval sampling loop: starts the scheduler under test
//! and the streaming latency source, primes the delta-based counter sources,
//! runs the one-shot benchmarks, then merges one reading per source into one
//! CSV row per tick. Any individual source failing contributes an empty
//! reading; only sink creation and a requested scheduler failing to launch
//! abort the run.
//!
//! Shutdown is cooperative: a cancellation token is checked at tick
//! boundaries only, and the draining path (stop latency child, close sink,
//! stop scheduler) runs on every way out of the measured section.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bench::{FairnessSource, HackbenchSource, SysbenchSource};
use crate::config::Config;
use crate::latency::SchedLatencySource;
use crate::sched::SchedulerProcess;
use crate::sink::{CsvSink, RunMeta};
use crate::source::{round_dp, ProcStatSource, RaplSource, Reading, SchedstatSource, Value};

/// Progress is logged every this many elapsed seconds.
const PROGRESS_EVERY_SECS: u64 = 10;

/// Upper bound on the sysbench measurement window.
const SYSBENCH_MAX_SECS: u64 = 10;

/// The full, fixed set of metric sources for one run.
///
/// The set is closed and known at compile time; each source owns its own
/// previous-sample state and nothing is shared across them.
pub struct SourceSet {
    pub proc_stat: ProcStatSource,
    pub schedstat: SchedstatSource,
    pub rapl: RaplSource,
    pub latency: SchedLatencySource,
    pub hackbench: HackbenchSource,
    pub sysbench: SysbenchSource,
    pub fairness: FairnessSource,
}

impl SourceSet {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            proc_stat: ProcStatSource::new(),
            schedstat: SchedstatSource::new(),
            rapl: RaplSource::new(),
            latency: SchedLatencySource::new(&cfg.sched_latency_bin),
            hackbench: HackbenchSource::new(),
            sysbench: SysbenchSource::new(),
            fairness: FairnessSource::new(&cfg.fairness_bin),
        }
    }

    /// Availability of every source, keyed by its metadata name.
    fn availability(&self) -> BTreeMap<String, bool> {
        let mut map = BTreeMap::new();
        map.insert("/proc/stat".to_string(), self.proc_stat.available());
        map.insert("/proc/schedstat".to_string(), self.schedstat.available());
        map.insert("RAPL".to_string(), self.rapl.available());
        map.insert("sched_latency".to_string(), self.latency.available());
        map.insert("hackbench".to_string(), self.hackbench.available());
        map.insert("sysbench".to_string(), self.sysbench.available());
        map.insert("fairness_harness".to_string(), self.fairness.available());
        map
    }
}

/// Output files produced by one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub csv: PathBuf,
    pub meta: PathBuf,
    /// Per-PID side file written by the latency child, when fairness data
    /// was requested.
    pub fairness: PathBuf,
}

/// Orchestrates one collection run end to end.
pub struct Collector {
    cfg: Config,
    sources: SourceSet,
    cancel: CancellationToken,
}

impl Collector {
    pub fn new(cfg: Config, sources: SourceSet, cancel: CancellationToken) -> Self {
        Self {
            cfg,
            sources,
            cancel,
        }
    }

    /// Run the full collection lifecycle and return the output paths.
    pub async fn run(&mut self) -> Result<RunPaths> {
        std::fs::create_dir_all(&self.cfg.output_dir).with_context(|| {
            format!("creating output directory {}", self.cfg.output_dir.display())
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let base = format!("{}_{stamp}", self.cfg.scheduler);
        let paths = RunPaths {
            csv: self.cfg.output_dir.join(format!("{base}.csv")),
            meta: self.cfg.output_dir.join(format!("{base}.meta.json")),
            fairness: self.cfg.output_dir.join(format!("{base}_fairness.csv")),
        };

        // Launch the scheduler under test before anything is measured and
        // give it time to attach. A failure here aborts the run: the caller
        // explicitly asked for this scheduler.
        let scheduler = match &self.cfg.sched_bin {
            Some(bin) => {
                let proc = SchedulerProcess::launch(bin)?;
                tokio::time::sleep(self.cfg.settle_delay).await;
                Some(proc)
            }
            None => None,
        };

        let fairness_file = self
            .sources
            .fairness
            .available()
            .then(|| paths.fairness.clone());
        self.sources
            .latency
            .start(self.cfg.interval, fairness_file.as_deref());

        let result = self.run_measured(&paths).await;

        // Draining runs unconditionally: normal exit, duration expiry,
        // signal, and error paths all come through here.
        self.sources.latency.stop().await;
        if let Some(proc) = scheduler {
            proc.stop().await;
        }

        result?;

        info!(
            csv = %paths.csv.display(),
            meta = %paths.meta.display(),
            "collection complete",
        );

        Ok(paths)
    }

    /// Everything between source startup and draining.
    async fn run_measured(&mut self, paths: &RunPaths) -> Result<()> {
        // Priming: establish baselines for the delta sources; the readings
        // themselves are discarded.
        self.sources.proc_stat.read();
        self.sources.schedstat.read();
        self.sources.rapl.read();

        let meta = self.build_meta();
        meta.write(&paths.meta)?;
        info!(path = %paths.meta.display(), "wrote run metadata");

        let mut sink = CsvSink::create(&paths.csv)?;
        info!(
            path = %paths.csv.display(),
            duration_s = self.cfg.duration.as_secs(),
            interval_s = self.cfg.interval.as_secs(),
            "collecting",
        );

        // The run clock starts here: the configured duration bounds the
        // whole measured window, one-shot benchmarks included, so a slow
        // benchmark eats into the sampling time rather than extending it.
        let start = Instant::now();

        // One-shot benchmarks run synchronously before the loop; their
        // results are merged into every subsequent row so each row carries
        // throughput and fairness context alongside the time series.
        let cancel = self.cancel.clone();
        let oneshot = tokio::select! {
            _ = cancel.cancelled() => Reading::new(),
            results = self.run_oneshots() => results,
        };

        self.sample_loop(start, &mut sink, &oneshot).await
    }

    fn build_meta(&self) -> RunMeta {
        RunMeta {
            scheduler: self.cfg.scheduler.clone(),
            start_time: Local::now().format("%Y-%m-%dT%H:%M:%S%z").to_string(),
            duration: self.cfg.duration.as_secs(),
            interval: self.cfg.interval.as_secs(),
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string()),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            sources: self.sources.availability(),
        }
    }

    async fn run_oneshots(&mut self) -> Reading {
        let mut results = Reading::new();

        if self.sources.hackbench.available() {
            info!("running hackbench");
            results.extend(self.sources.hackbench.run_once().await);
        }

        if self.sources.sysbench.available() {
            info!("running sysbench");
            let mut budget = SYSBENCH_MAX_SECS;
            if !self.cfg.duration.is_zero() {
                budget = budget.min(self.cfg.duration.as_secs().max(1));
            }
            results.extend(
                self.sources
                    .sysbench
                    .run_once(std::time::Duration::from_secs(budget))
                    .await,
            );
        }

        if self.sources.fairness.available() {
            info!("running fairness harness");
            results.extend(self.sources.fairness.run_once().await);
        }

        results
    }

    /// The fixed-interval tick loop. The only suspension point per tick is
    /// the interval sleep; cancellation is observed between ticks, never
    /// mid-read.
    async fn sample_loop(
        &mut self,
        start: Instant,
        sink: &mut CsvSink,
        oneshot: &Reading,
    ) -> Result<()> {
        let cancel = self.cancel.clone();
        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested, stopping collection");
                    break;
                }
                _ = ticker.tick() => {
                    let elapsed = start.elapsed().as_secs_f64();

                    let mut row = Reading::new();
                    row.insert(
                        "timestamp",
                        Value::Text(Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()),
                    );
                    row.insert("elapsed_s", Value::F64(round_dp(elapsed, 1)));
                    row.insert("scheduler", Value::Text(self.cfg.scheduler.clone()));

                    row.extend(self.sources.proc_stat.read());
                    row.extend(self.sources.schedstat.read());
                    row.extend(self.sources.rapl.read());
                    row.extend(self.sources.latency.poll());
                    row.extend(oneshot.iter().map(|(k, v)| (*k, v.clone())));

                    sink.append(&row)?;

                    let whole_secs = elapsed as u64;
                    if whole_secs % PROGRESS_EVERY_SECS == 0 {
                        info!(
                            elapsed_s = whole_secs,
                            cpu_util_pct = %cell(&row, "cpu_util_pct"),
                            csw_per_sec = %cell(&row, "ctx_switches_per_sec"),
                            "progress",
                        );
                    }

                    if !self.cfg.duration.is_zero()
                        && elapsed >= self.cfg.duration.as_secs_f64()
                    {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Render a row cell for progress logging; "n/a" when absent.
fn cell(row: &Reading, column: &str) -> String {
    row.get(column)
        .map(|v| v.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

/// Debugfs symbol list used to check enqueue hook availability.
const FILTER_FUNCTIONS: &str = "/sys/kernel/debug/tracing/available_filter_functions";

/// Report each metric source's availability to stdout and check for the
/// scheduler enqueue hooks the BPF tool attaches to.
pub fn probe(cfg: &Config) {
    let sources = SourceSet::from_config(cfg);

    println!("Metric source availability:");
    println!("{}", "-".repeat(50));

    let checks: [(&str, bool); 7] = [
        (sources.proc_stat.name(), sources.proc_stat.available()),
        (sources.schedstat.name(), sources.schedstat.available()),
        (sources.rapl.name(), sources.rapl.available()),
        (sources.latency.name(), sources.latency.available()),
        (sources.hackbench.name(), sources.hackbench.available()),
        (sources.sysbench.name(), sources.sysbench.available()),
        (sources.fairness.name(), sources.fairness.available()),
    ];
    for (name, ok) in checks {
        let status = if ok { "OK" } else { "NOT FOUND" };
        println!("  {name:<30} {status}");
    }

    match std::fs::read_to_string(FILTER_FUNCTIONS) {
        Ok(funcs) => {
            for (symbol, label) in [
                ("enqueue_task_fair", "enqueue_task_fair (CFS/EEVDF)"),
                ("scx_ops_enqueue_task", "scx_ops_enqueue (sched_ext)"),
            ] {
                let status = if funcs.contains(symbol) {
                    "OK"
                } else {
                    "NOT AVAILABLE"
                };
                println!("  {label:<30} {status}");
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("  {:<30} UNKNOWN (no debugfs)", "enqueue hooks");
        }
        Err(_) => {
            println!("  {:<30} UNKNOWN (cannot read)", "enqueue hooks");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable_sources() -> SourceSet {
        SourceSet {
            proc_stat: ProcStatSource::with_path("/nonexistent/proc/stat"),
            schedstat: SchedstatSource::with_path("/nonexistent/proc/schedstat"),
            rapl: RaplSource::with_paths(Vec::new()),
            latency: SchedLatencySource::new("/nonexistent/sched_latency"),
            hackbench: HackbenchSource::with_command("schedprobe-no-such-benchmark"),
            sysbench: SysbenchSource::with_command("schedprobe-no-such-benchmark"),
            fairness: FairnessSource::new("/nonexistent/fairness_harness"),
        }
    }

    #[test]
    fn test_availability_map_covers_all_sources() {
        let sources = unavailable_sources();
        let map = sources.availability();

        assert_eq!(map.len(), 7);
        assert!(map.values().all(|available| !available));
        assert!(map.contains_key("/proc/stat"));
        assert!(map.contains_key("fairness_harness"));
    }

    #[tokio::test]
    async fn test_oneshots_skip_unavailable_benchmarks() {
        let mut collector = Collector::new(
            Config::default(),
            unavailable_sources(),
            CancellationToken::new(),
        );
        let results = collector.run_oneshots().await;
        assert!(results.is_empty());
    }

    #[test]
    fn test_cell_formatting() {
        let mut row = Reading::new();
        row.insert("cpu_util_pct", Value::F64(42.5));

        assert_eq!(cell(&row, "cpu_util_pct"), "42.5");
        assert_eq!(cell(&row, "power_watts"), "n/a");
    }
}

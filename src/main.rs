use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use schedprobe::collector::{self, Collector, SourceSet};
use schedprobe::config::Config;

/// Scheduler benchmark telemetry collector.
///
/// Polls multiple metric sources each interval while a scheduler under test
/// runs, and writes a unified CSV stream plus a run-metadata record. All
/// metric sources degrade gracefully if unavailable.
#[derive(Parser)]
#[command(name = "schedprobe", about, version)]
struct Cli {
    /// Path to a YAML configuration file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Check metric source availability and exit.
    #[arg(long)]
    probe: bool,

    /// Scheduler name label (e.g. default, eevdf, s3+).
    #[arg(long)]
    scheduler: Option<String>,

    /// Path to a sched_ext scheduler binary to run for the experiment.
    #[arg(long)]
    sched_bin: Option<PathBuf>,

    /// Collection duration in seconds (0 = run until signalled).
    #[arg(long)]
    duration: Option<u64>,

    /// Sampling interval in seconds.
    #[arg(long)]
    interval: Option<u64>,

    /// Output directory.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Path to the BPF sched_latency binary.
    #[arg(long)]
    sched_latency_bin: Option<PathBuf>,

    /// Path to the fairness_harness binary.
    #[arg(long)]
    fairness_bin: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Merge file-based config (if any) with command-line overrides.
    fn into_config(self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(scheduler) = self.scheduler {
            cfg.scheduler = scheduler;
        }
        if let Some(sched_bin) = self.sched_bin {
            cfg.sched_bin = Some(sched_bin);
        }
        if let Some(duration) = self.duration {
            cfg.duration = Duration::from_secs(duration);
        }
        if let Some(interval) = self.interval {
            cfg.interval = Duration::from_secs(interval);
        }
        if let Some(output) = self.output {
            cfg.output_dir = output;
        }
        if let Some(bin) = self.sched_latency_bin {
            cfg.sched_latency_bin = bin;
        }
        if let Some(bin) = self.fairness_bin {
            cfg.fairness_bin = bin;
        }

        cfg.validate()?;

        Ok(cfg)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    let probe_only = cli.probe;
    let cfg = cli.into_config()?;

    // Single control loop, no worker threads: all source state is owned by
    // one task, so a current-thread runtime is all this needs.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async {
        if probe_only {
            collector::probe(&cfg);
            return Ok(());
        }
        run(cfg).await
    })
}

async fn run(cfg: Config) -> Result<()> {
    // Signals cancel the token; the sampling loop observes it at tick
    // boundaries and drains cleanly.
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    tracing::info!("received SIGINT, shutting down");
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, shutting down");
                }
            }

            cancel.cancel();
        });
    }

    let sources = SourceSet::from_config(&cfg);
    let mut collector = Collector::new(cfg, sources, cancel);
    collector.run().await?;

    Ok(())
}

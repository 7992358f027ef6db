//! Supervision of the scheduler under test.
//!
//! The experiment subprocess (a sched_ext scheduler binary) is launched with
//! no arguments before measurement starts and must keep running for the
//! whole collection window. Its own output is discarded; the kernel-side
//! effects are what the sources measure.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Grace period between SIGTERM and SIGKILL on stop.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Handle to the running scheduler-under-test child process.
pub struct SchedulerProcess {
    child: Child,
}

impl SchedulerProcess {
    /// Launch the scheduler binary. Failure here is fatal to the run: the
    /// caller explicitly asked for this scheduler to be measured.
    pub fn launch(bin: &Path) -> Result<Self> {
        info!(bin = %bin.display(), "starting scheduler");

        let child = Command::new(bin)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("starting scheduler {}", bin.display()))?;

        Ok(Self { child })
    }

    /// Raw PID of the child, if it has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Terminate gracefully, escalating to SIGKILL after the grace period.
    pub async fn stop(mut self) {
        info!("stopping scheduler");

        if let Some(raw_pid) = self.child.id() {
            let _ = kill(Pid::from_raw(raw_pid as i32), Signal::SIGTERM);
        }

        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "scheduler exited"),
            Ok(Err(e)) => warn!(error = %e, "waiting for scheduler"),
            Err(_) => {
                warn!("scheduler ignored SIGTERM, killing");
                let _ = self.child.kill().await;
            }
        }
    }
}

//! Run metadata record.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// One-shot document describing a collection run, written before the first
/// sample row and immutable afterwards. The reporting layer uses it to label
/// and filter result sets.
#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    /// Free-text label of the experiment variant (e.g. "eevdf", "default").
    pub scheduler: String,
    /// ISO-8601 wall-clock start time.
    pub start_time: String,
    /// Requested collection duration in seconds (0 = run until signalled).
    pub duration: u64,
    /// Requested sampling interval in seconds.
    pub interval: u64,
    /// Host the run executed on.
    pub hostname: String,
    /// Logical CPU count.
    pub cpu_count: usize,
    /// Source name -> whether it was available at startup.
    pub sources: BTreeMap<String, bool>,
}

impl RunMeta {
    /// Write the metadata document as pretty-printed JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating metadata file {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("serializing run metadata")?;
        Ok(())
    }
}

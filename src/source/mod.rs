//! Delta-based counter sources.
//!
//! Each source reads a monotonically increasing kernel counter file and
//! converts it into a per-interval rate by differencing against its own
//! previous sample. A source with no baseline yet, or whose file is missing
//! or transiently unreadable, contributes an empty [`Reading`] rather than
//! an error. Unavailability is a normal state reported once in run metadata.

pub mod procstat;
pub mod rapl;
pub mod schedstat;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub use procstat::ProcStatSource;
pub use rapl::RaplSource;
pub use schedstat::SchedstatSource;

/// One source's contribution to a sample row: column name -> value.
///
/// Absent metrics are absent keys. Zero is a measured value and is never
/// used to stand in for "unavailable".
pub type Reading = HashMap<&'static str, Value>;

/// A single cell value in the output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    U64(u64),
    F64(f64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::U64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
        }
    }
}

/// Round to `dp` decimal places. Sources round at the point of measurement
/// so the sink can serialize values verbatim.
pub(crate) fn round_dp(x: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (x * factor).round() / factor
}

/// Whether `path` is an existing regular file with any execute bit set.
pub(crate) fn is_executable(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Resolve `command` against $PATH, returning the first executable hit.
pub(crate) fn find_on_path(command: &OsStr) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
}

//! Line parsing for the `sched_latency -c` CSV stream.
//!
//! One data line carries a latency category plus count/avg/percentile stats,
//! optionally followed by three context-switch counters shared across all
//! categories. Partial or corrupt lines are a normal occurrence (the child
//! writes on its own cadence and can be killed mid-line); callers discard
//! parse errors instead of propagating them.

use thiserror::Error;

/// Minimum comma-separated fields for a valid data line.
const MIN_FIELDS: usize = 9;

/// Fields at which the optional context-switch counters begin.
const CSW_FIELDS: usize = 12;

/// Errors produced while decoding one stream line.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LineError {
    #[error("line has {0} fields, expected at least {MIN_FIELDS}")]
    TooShort(usize),

    #[error("unknown latency category: {0}")]
    UnknownCategory(String),

    #[error("field {field} is not numeric: {value:?}")]
    BadNumber {
        field: &'static str,
        value: String,
    },
}

/// The four latency categories emitted by the BPF tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    SchedDelay,
    Runqueue,
    Wakeup,
    Preemption,
}

impl Category {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "sched_delay" => Some(Self::SchedDelay),
            "runqueue" => Some(Self::Runqueue),
            "wakeup" => Some(Self::Wakeup),
            "preemption" => Some(Self::Preemption),
            _ => None,
        }
    }

    /// Output columns for this category, ordered count/avg/p50/p95/p99.
    pub fn columns(self) -> [&'static str; 5] {
        match self {
            Self::SchedDelay => [
                "sched_delay_count",
                "sched_delay_avg_ns",
                "sched_delay_p50_ns",
                "sched_delay_p95_ns",
                "sched_delay_p99_ns",
            ],
            Self::Runqueue => [
                "runqueue_count",
                "runqueue_avg_ns",
                "runqueue_p50_ns",
                "runqueue_p95_ns",
                "runqueue_p99_ns",
            ],
            Self::Wakeup => [
                "wakeup_count",
                "wakeup_avg_ns",
                "wakeup_p50_ns",
                "wakeup_p95_ns",
                "wakeup_p99_ns",
            ],
            Self::Preemption => [
                "preemption_count",
                "preemption_avg_ns",
                "preemption_p50_ns",
                "preemption_p95_ns",
                "preemption_p99_ns",
            ],
        }
    }
}

/// Context-switch rates shared across categories (trailing optional fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CswRates {
    pub total: u64,
    pub voluntary: u64,
    pub involuntary: u64,
}

/// One decoded data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyRecord {
    pub category: Category,
    pub count: u64,
    pub avg_ns: u64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub csw: Option<CswRates>,
}

/// Parse one line of the form
/// `timestamp,type,count,avg_ns,min_ns,max_ns,p50_ns,p95_ns,p99_ns[,total_csw,voluntary_csw,involuntary_csw]`.
pub fn parse_line(line: &str) -> Result<LatencyRecord, LineError> {
    let parts: Vec<&str> = line.trim().split(',').collect();
    if parts.len() < MIN_FIELDS {
        return Err(LineError::TooShort(parts.len()));
    }

    let category = Category::from_label(parts[1])
        .ok_or_else(|| LineError::UnknownCategory(parts[1].to_string()))?;

    let count = parse_field(parts[2], "count")?;
    let avg_ns = parse_field(parts[3], "avg_ns")?;
    let p50_ns = parse_field(parts[6], "p50_ns")?;
    let p95_ns = parse_field(parts[7], "p95_ns")?;
    let p99_ns = parse_field(parts[8], "p99_ns")?;

    // Context-switch counters ride along on every category row; an empty or
    // malformed trailer drops only the trailer, never the latency stats.
    let csw = if parts.len() >= CSW_FIELDS {
        match (
            parts[9].parse::<u64>(),
            parts[10].parse::<u64>(),
            parts[11].parse::<u64>(),
        ) {
            (Ok(total), Ok(voluntary), Ok(involuntary)) => Some(CswRates {
                total,
                voluntary,
                involuntary,
            }),
            _ => None,
        }
    } else {
        None
    };

    Ok(LatencyRecord {
        category,
        count,
        avg_ns,
        p50_ns,
        p95_ns,
        p99_ns,
        csw,
    })
}

fn parse_field(value: &str, field: &'static str) -> Result<u64, LineError> {
    value.parse().map_err(|_| LineError::BadNumber {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let rec = parse_line("1700000000,sched_delay,42,1500,10,90000,1200,4000,9000,5100,3100,2000")
            .expect("valid line");
        assert_eq!(rec.category, Category::SchedDelay);
        assert_eq!(rec.count, 42);
        assert_eq!(rec.avg_ns, 1500);
        assert_eq!(rec.p50_ns, 1200);
        assert_eq!(rec.p95_ns, 4000);
        assert_eq!(rec.p99_ns, 9000);
        assert_eq!(
            rec.csw,
            Some(CswRates {
                total: 5100,
                voluntary: 3100,
                involuntary: 2000,
            })
        );
    }

    #[test]
    fn test_parse_line_without_csw_trailer() {
        let rec = parse_line("1700000000,wakeup,5,2000,1,9999,1500,2500,3500").expect("valid line");
        assert_eq!(rec.category, Category::Wakeup);
        assert_eq!(rec.csw, None);
    }

    #[test]
    fn test_empty_csw_fields_drop_only_the_trailer() {
        let rec = parse_line("1700000000,runqueue,5,2000,1,9999,1500,2500,3500,,,")
            .expect("valid line");
        assert_eq!(rec.category, Category::Runqueue);
        assert_eq!(rec.csw, None);
    }

    #[test]
    fn test_too_few_fields() {
        assert_eq!(
            parse_line("1700000000,wakeup,5"),
            Err(LineError::TooShort(3))
        );
    }

    #[test]
    fn test_non_numeric_required_field() {
        let err = parse_line("1700000000,wakeup,abc,2000,1,9999,1500,2500,3500")
            .expect_err("count is not numeric");
        assert!(matches!(err, LineError::BadNumber { field: "count", .. }));
    }

    #[test]
    fn test_unknown_category() {
        let err = parse_line("1700000000,mystery,5,2000,1,9999,1500,2500,3500")
            .expect_err("unknown category");
        assert_eq!(err, LineError::UnknownCategory("mystery".to_string()));
    }

    #[test]
    fn test_empty_line() {
        assert!(parse_line("").is_err());
    }
}

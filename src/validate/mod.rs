/// Record-level structural checks and the whole-series audit
use serde_json::Value;
use thiserror::Error;

use crate::types::{Granularity, Observation};

/// Fields a raw record must carry to be structurally valid
pub const REQUIRED_FIELDS: [&str; 7] = [
    "time",
    "open",
    "high",
    "low",
    "close",
    "volumefrom",
    "volumeto",
];

/// Structural violation in a single raw record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Structural check: the record must carry every required field with a
/// decodable value. Violations drop the record, they never abort a walk.
pub fn parse_observation(raw: &Value) -> Result<Observation, SchemaViolation> {
    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|field| raw.get(**field).is_none())
        .map(|field| field.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(SchemaViolation::MissingFields(missing));
    }

    serde_json::from_value(raw.clone()).map_err(|e| SchemaViolation::Malformed(e.to_string()))
}

/// One advisory finding from the series audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFinding {
    /// Actual sample count differs from the window's expected cardinality
    CountMismatch { expected: usize, actual: usize },
    /// Timestamps not strictly increasing at this position
    NonIncreasingStep { index: usize, prev: i64, next: i64 },
    /// Two records identical across every field
    DuplicateRecord { index: usize, time: i64 },
    /// Record timestamp outside the requested window
    OutOfRange { time: i64 },
}

impl std::fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditFinding::CountMismatch { expected, actual } => {
                write!(f, "expected {} samples, got {}", expected, actual)
            }
            AuditFinding::NonIncreasingStep { index, prev, next } => {
                write!(
                    f,
                    "non-increasing timestamp at index {}: {} -> {}",
                    index, prev, next
                )
            }
            AuditFinding::DuplicateRecord { index, time } => {
                write!(f, "duplicate record at index {} (time {})", index, time)
            }
            AuditFinding::OutOfRange { time } => {
                write!(f, "record timestamp {} outside requested window", time)
            }
        }
    }
}

/// Result of the advisory series audit: findings are warnings for the
/// operator, they never block normalization.
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Audit the assembled series (sorted ascending by time) against the
/// requested window. Upstream gaps are common, so none of this is fatal.
pub fn audit_series(
    series: &[Observation],
    granularity: Granularity,
    start_boundary: i64,
    end_boundary: i64,
) -> AuditReport {
    let mut findings = Vec::new();

    // Both boundaries are inclusive, hence the +1
    let expected = if end_boundary >= start_boundary {
        ((end_boundary - start_boundary) / granularity.period_secs()) as usize + 1
    } else {
        0
    };
    if expected != series.len() {
        findings.push(AuditFinding::CountMismatch {
            expected,
            actual: series.len(),
        });
    }

    for (i, pair) in series.windows(2).enumerate() {
        if pair[1].time <= pair[0].time {
            findings.push(AuditFinding::NonIncreasingStep {
                index: i + 1,
                prev: pair[0].time,
                next: pair[1].time,
            });
        }
    }

    // Identical records share a timestamp, so after the ascending sort every
    // duplicate lives inside one same-time run; compare within each run so a
    // distinct record in between cannot hide a repeat.
    let mut i = 0;
    while i < series.len() {
        let mut j = i + 1;
        while j < series.len() && series[j].time == series[i].time {
            j += 1;
        }
        for a in i..j {
            for b in (a + 1)..j {
                if series[a] == series[b] {
                    findings.push(AuditFinding::DuplicateRecord {
                        index: b,
                        time: series[b].time,
                    });
                }
            }
        }
        i = j;
    }

    for obs in series {
        if obs.time < start_boundary || obs.time > end_boundary {
            findings.push(AuditFinding::OutOfRange { time: obs.time });
        }
    }

    AuditReport { findings }
}

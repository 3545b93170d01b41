//! Result aggregation: reduce a batch report to one overall status.

use crate::types::{BatchReport, TargetState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lines kept from the end of captured output.
pub const TAIL_LINES: usize = 20;
/// Bytes kept from the end of captured output.
pub const TAIL_BYTES: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Success,
    Failed,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("Success"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

/// Bounded summary of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub target: String,
    pub state: TargetState,
    /// Tail of captured standard output
    pub output_tail: String,
    /// Tail of captured standard error; only kept for non-Success targets
    pub error_tail: Option<String>,
}

/// Outcome of one dispatch across every target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub command_id: String,
    pub overall: OverallStatus,
    /// In request order
    pub targets: Vec<TargetSummary>,
    /// Number of targets per state label
    pub counts: BTreeMap<String, usize>,
    pub timed_out: bool,
    pub interrupted: bool,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.overall == OverallStatus::Success
    }

    /// Targets that did not succeed
    pub fn failures(&self) -> impl Iterator<Item = &TargetSummary> {
        self.targets.iter().filter(|t| !t.state.is_success())
    }
}

/// Reduce a report to a summary.
///
/// Success iff there is at least one target and every target is Success.
/// Targets left non-terminal by an interrupted wait count as not successful.
pub fn aggregate(report: &BatchReport) -> BatchSummary {
    let success = !report.targets.is_empty() && report.targets.iter().all(|t| t.state.is_success());

    let targets = report
        .targets
        .iter()
        .map(|t| TargetSummary {
            target: t.target.clone(),
            state: t.state,
            output_tail: tail(&t.stdout, TAIL_LINES, TAIL_BYTES),
            error_tail: (!t.state.is_success() && !t.stderr.trim().is_empty())
                .then(|| tail(&t.stderr, TAIL_LINES, TAIL_BYTES)),
        })
        .collect();

    BatchSummary {
        command_id: report.command_id.clone(),
        overall: if success {
            OverallStatus::Success
        } else {
            OverallStatus::Failed
        },
        targets,
        counts: report
            .counts()
            .into_iter()
            .map(|(label, n)| (label.to_string(), n))
            .collect(),
        timed_out: report.timed_out,
        interrupted: report.interrupted,
    }
}

/// Last `max_lines` lines of `text`, cut further to at most `max_bytes`
/// bytes on a character boundary.
pub fn tail(text: &str, max_lines: usize, max_bytes: usize) -> String {
    let text = text.trim_end();
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    let joined = lines[start..].join("\n");

    if joined.len() <= max_bytes {
        return joined;
    }
    let mut cut = joined.len() - max_bytes;
    while !joined.is_char_boundary(cut) {
        cut += 1;
    }
    joined[cut..].to_string()
}

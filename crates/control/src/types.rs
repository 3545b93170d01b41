//! Core types for compliance remediation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a compliance control
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Outcome of running one control unit
///
/// Produced exactly once per unit per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemediationOutcome {
    /// Detection found nothing to fix; nothing was touched
    AlreadyCompliant,
    /// Fix applied and confirmed
    Remediated,
    /// Detection, fix, or confirmation failed (fix rolled back if it ran)
    Failed,
    /// Dry run: detection found drift, nothing was touched
    WouldRemediate,
}

impl RemediationOutcome {
    /// Check if the outcome represents a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Check if the outcome represents a change on the host
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Remediated)
    }
}

impl fmt::Display for RemediationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AlreadyCompliant => "already compliant",
            Self::Remediated => "remediated",
            Self::Failed => "failed",
            Self::WouldRemediate => "would remediate",
        };
        write!(f, "{s}")
    }
}

/// Phases of the control unit state machine, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Detect,
    Backup,
    Apply,
    Verify,
    Rollback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Detect => "detect",
            Self::Backup => "backup",
            Self::Apply => "apply",
            Self::Verify => "verify",
            Self::Rollback => "rollback",
        };
        write!(f, "{s}")
    }
}

/// Log severity understood by both the phase log and the remote entry point
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Wire name (`DEBUG`, `INFO`, `WARN`, `ERROR`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Equivalent level of the `log` facade
    pub fn to_log_level(self) -> log::Level {
        match self {
            Self::Debug => log::Level::Debug,
            Self::Info => log::Level::Info,
            Self::Warn => log::Level::Warn,
            Self::Error => log::Level::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            other => Err(format!(
                "invalid log level '{other}' (expected DEBUG, INFO, WARN or ERROR)"
            )),
        }
    }
}

/// Lowest and highest valid group numbers
pub const MIN_GROUP: u8 = 1;
pub const MAX_GROUP: u8 = 6;

/// Selects which control groups take part in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupSelector {
    /// A single group (1..=6)
    Group(u8),
    /// Every group
    All,
}

impl GroupSelector {
    /// Build a selector for a single group, rejecting numbers outside 1..=6
    pub fn group(n: u8) -> Result<Self, String> {
        if (MIN_GROUP..=MAX_GROUP).contains(&n) {
            Ok(Self::Group(n))
        } else {
            Err(format!(
                "invalid group '{n}' (expected {MIN_GROUP}..{MAX_GROUP} or 'all')"
            ))
        }
    }

    /// Check whether a control in `group` is selected
    pub fn matches(&self, group: u8) -> bool {
        match self {
            Self::Group(n) => *n == group,
            Self::All => true,
        }
    }
}

impl fmt::Display for GroupSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(n) => write!(f, "{n}"),
            Self::All => f.write_str("all"),
        }
    }
}

impl FromStr for GroupSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let n: u8 = s.parse().map_err(|_| {
            format!("invalid group '{s}' (expected {MIN_GROUP}..{MAX_GROUP} or 'all')")
        })?;
        Self::group(n)
    }
}

//! Core types for fleet dispatch.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use control::{GroupSelector, LogLevel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Default name of the remote entry point.
pub const DEFAULT_ENTRY_POINT: &str = "Remedy-RunControls";

/// Default batch timeout (one hour).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Where each target fetches the rule catalog from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSource {
    /// Bucket holding the catalog
    pub bucket: String,
    /// Key prefix inside the bucket
    pub key_prefix: String,
}

/// Options that apply to every target in one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOptions {
    /// Detection only on every target
    pub dry_run: bool,
    /// Log level forwarded to the targets
    pub log_level: LogLevel,
    /// Advisory batch timeout for the local wait
    pub timeout: Duration,
    /// Catalog source
    pub artifact: ArtifactSource,
    /// Name of the remote entry point to invoke
    pub entry_point: String,
}

impl DispatchOptions {
    /// Options with defaults for everything but the artifact source.
    pub fn new(artifact: ArtifactSource) -> Self {
        Self {
            dry_run: false,
            log_level: LogLevel::Info,
            timeout: DEFAULT_TIMEOUT,
            artifact,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        }
    }
}

/// A validated request to remediate one group on a set of targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    group: GroupSelector,
    targets: Vec<String>,
    options: DispatchOptions,
}

impl DispatchRequest {
    /// Validate and build a request.
    ///
    /// Targets are trimmed and deduplicated, keeping first-seen order.
    pub fn new<I, S>(
        group: GroupSelector,
        targets: I,
        options: DispatchOptions,
    ) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let GroupSelector::Group(n) = group {
            GroupSelector::group(n).map_err(ValidationError::InvalidGroup)?;
        }
        if options.timeout.is_zero() {
            return Err(ValidationError::NonPositiveTimeout);
        }
        if options.artifact.bucket.trim().is_empty() {
            return Err(ValidationError::MissingArtifactSource);
        }

        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for target in targets {
            let target = target.as_ref().trim();
            if target.is_empty() || target.chars().any(char::is_whitespace) {
                return Err(ValidationError::InvalidTarget(target.to_string()));
            }
            if seen.insert(target.to_string()) {
                unique.push(target.to_string());
            }
        }
        if unique.is_empty() {
            return Err(ValidationError::EmptyTargets);
        }

        Ok(Self {
            group,
            targets: unique,
            options,
        })
    }

    pub fn group(&self) -> GroupSelector {
        self.group
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Parameters for the remote entry point.
    pub fn parameters(&self) -> CommandParameters {
        CommandParameters {
            group: self.group,
            bucket: self.options.artifact.bucket.clone(),
            key_prefix: self.options.artifact.key_prefix.clone(),
            dry_run: self.options.dry_run,
            log_level: self.options.log_level,
        }
    }
}

/// Split a comma-separated target list, dropping empty entries.
pub fn parse_target_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a group selector, reporting failures as validation errors.
pub fn parse_group(s: &str) -> Result<GroupSelector, ValidationError> {
    s.parse().map_err(ValidationError::InvalidGroup)
}

/// Parse a log level, reporting failures as validation errors.
pub fn parse_log_level(s: &str) -> Result<LogLevel, ValidationError> {
    s.parse().map_err(ValidationError::InvalidLogLevel)
}

/// Parameters understood by the remote entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandParameters {
    pub group: GroupSelector,
    pub bucket: String,
    pub key_prefix: String,
    pub dry_run: bool,
    pub log_level: LogLevel,
}

impl CommandParameters {
    /// Parameter map in the `{Name: [value]}` shape the entry point expects.
    pub fn to_map(&self) -> BTreeMap<&'static str, Vec<String>> {
        BTreeMap::from([
            ("Group", vec![self.group.to_string()]),
            ("S3Bucket", vec![self.bucket.clone()]),
            ("S3KeyPrefix", vec![self.key_prefix.clone()]),
            ("DryRun", vec![self.dry_run.to_string()]),
            ("LogLevel", vec![self.log_level.as_str().to_string()]),
        ])
    }
}

/// Who decided a target timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutSource {
    /// The target reported `TimedOut` itself
    Remote,
    /// The local wait gave up; remote work may still be running
    Wait,
}

/// State of one target within one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetState {
    Pending,
    /// Includes delayed/throttled sub-states
    InProgress,
    Success,
    Failed,
    Cancelled,
    TimedOut(TimeoutSource),
}

impl TargetState {
    /// Terminal states never transition again within a dispatch.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Short label for tables and counts
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::TimedOut(_) => "TimedOut",
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut(TimeoutSource::Wait) => f.write_str("TimedOut (wait expired)"),
            other => f.write_str(other.label()),
        }
    }
}

/// One status observation returned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Invocation {
    pub state: Option<TargetState>,
    /// Captured standard output so far
    pub stdout: String,
    /// Captured standard error so far
    pub stderr: String,
}

impl Invocation {
    pub fn new(state: TargetState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }
}

/// Status of one target, monotone toward a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub target: String,
    pub state: TargetState,
    pub stdout: String,
    pub stderr: String,
    /// Every state this target has been in, in order
    pub history: Vec<TargetState>,
}

impl TargetStatus {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            state: TargetState::Pending,
            stdout: String::new(),
            stderr: String::new(),
            history: vec![TargetState::Pending],
        }
    }

    /// Move to `next` unless already terminal.
    ///
    /// Returns whether the state changed.
    pub fn advance(&mut self, next: TargetState) -> bool {
        if self.state.is_terminal() {
            if next != self.state {
                log::debug!(
                    "{}: ignoring {} after terminal {}",
                    self.target,
                    next,
                    self.state
                );
            }
            return false;
        }
        if next == self.state {
            return false;
        }
        self.state = next;
        self.history.push(next);
        true
    }

    /// Fold one observation into this status.
    pub fn observe(&mut self, invocation: Invocation) {
        if self.state.is_terminal() {
            return;
        }
        if !invocation.stdout.is_empty() {
            self.stdout = invocation.stdout;
        }
        if !invocation.stderr.is_empty() {
            self.stderr = invocation.stderr;
        }
        if let Some(state) = invocation.state {
            self.advance(state);
        }
    }
}

/// Correlation handle returned by a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchHandle {
    /// Remote correlation id
    pub command_id: String,
    pub entry_point: String,
    pub targets: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    /// Prerequisite warnings raised while dispatching
    pub warnings: Vec<String>,
}

/// Per-target outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub command_id: String,
    /// In request order
    pub targets: Vec<TargetStatus>,
    /// Poll rounds completed
    pub rounds: u32,
    /// The wait hit its timeout with targets still running
    pub timed_out: bool,
    /// The wait was interrupted; non-terminal targets are left as observed
    pub interrupted: bool,
}

impl BatchReport {
    pub fn new(command_id: impl Into<String>, targets: &[String]) -> Self {
        Self {
            command_id: command_id.into(),
            targets: targets.iter().map(TargetStatus::new).collect(),
            rounds: 0,
            timed_out: false,
            interrupted: false,
        }
    }

    pub fn get(&self, target: &str) -> Option<&TargetStatus> {
        self.targets.iter().find(|t| t.target == target)
    }

    pub fn get_mut(&mut self, target: &str) -> Option<&mut TargetStatus> {
        self.targets.iter_mut().find(|t| t.target == target)
    }

    pub fn all_terminal(&self) -> bool {
        self.targets.iter().all(|t| t.state.is_terminal())
    }

    /// Targets not yet in a terminal state
    pub fn pending(&self) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| !t.state.is_terminal())
            .map(|t| t.target.as_str())
            .collect()
    }

    /// Number of targets per state label
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for t in &self.targets {
            *counts.entry(t.state.label()).or_insert(0) += 1;
        }
        counts
    }
}

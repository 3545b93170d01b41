//! Backend abstraction for the remote execution boundary.
//!
//! The [`Transport`] trait is the only way this crate talks to targets. It
//! builds requests and interprets responses; actually running code on a host
//! is the backend's business. Two implementations ship with the crate:
//! - [`ssm::SsmBackend`] drives the `aws` command line
//! - [`mock::MockTransport`] serves scripted responses for tests

pub mod mock;
pub mod ssm;

use crate::error::Result;
use crate::types::{CommandParameters, Invocation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One fan-out request covering every target of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Named remote entry point
    pub entry_point: String,
    /// Targets, deduplicated, in request order
    pub targets: Vec<String>,
    pub parameters: CommandParameters,
    /// Remote-side execution timeout hint
    pub timeout: Duration,
    /// Free-form label attached to the command
    pub comment: String,
}

/// Transport trait for the remote execution boundary.
///
/// Implementations must be callable from several threads at once: a poll
/// round probes targets in parallel.
pub trait Transport: Send + Sync {
    /// Whether the named entry point exists on the remote side.
    fn entry_point_exists(&self, name: &str) -> Result<bool>;

    /// Probe that credentials are usable.
    fn check_credentials(&self) -> Result<()>;

    /// Submit one request for every target; returns the correlation id.
    fn send(&self, request: &SendRequest) -> Result<String>;

    /// Current status and captured output of one target.
    fn invocation(&self, command_id: &str, target: &str) -> Result<Invocation>;
}

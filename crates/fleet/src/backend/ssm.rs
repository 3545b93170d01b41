//! AWS Systems Manager backend using the `aws` command line.

use crate::backend::{SendRequest, Transport};
use crate::error::{Error, Result};
use crate::types::{Invocation, TargetState, TimeoutSource};
use std::process::{Command, Output};

/// Bounds `send-command` accepts for `--timeout-seconds`.
const MIN_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 2_592_000;

/// Backend that executes real `aws ssm` commands.
#[derive(Debug, Clone)]
pub struct SsmBackend {
    /// Path to the aws executable
    aws_path: String,
    profile: Option<String>,
    region: Option<String>,
}

impl SsmBackend {
    pub fn new() -> Self {
        Self {
            aws_path: std::env::var("REMEDY_AWS_CLI").unwrap_or_else(|_| "aws".to_string()),
            profile: None,
            region: None,
        }
    }

    /// Use a named credentials profile.
    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    /// Pin the region instead of taking the CLI default.
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Run an aws command and return output.
    fn run_aws(&self, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new(&self.aws_path);
        cmd.args(args).args(["--output", "json"]);
        if let Some(profile) = &self.profile {
            cmd.args(["--profile", profile.as_str()]);
        }
        if let Some(region) = &self.region {
            cmd.args(["--region", region.as_str()]);
        }

        log::debug!("running {} {}", self.aws_path, args.join(" "));
        cmd.output().map_err(|e| Error::Transport {
            message: format!("failed to execute {}: {}", self.aws_path, e),
            detail: String::new(),
        })
    }

    /// Run an aws command and check for success.
    fn run_aws_checked(&self, args: &[&str], what: &str) -> Result<serde_json::Value> {
        let output = self.run_aws(args)?;
        if !output.status.success() {
            return Err(Error::Transport {
                message: format!("{what} failed"),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

impl Default for SsmBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SsmBackend {
    fn entry_point_exists(&self, name: &str) -> Result<bool> {
        let output = self.run_aws(&["ssm", "describe-document", "--name", name])?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("InvalidDocument") {
            return Ok(false);
        }
        Err(Error::Transport {
            message: format!("describe-document {name} failed"),
            detail: stderr.trim().to_string(),
        })
    }

    fn check_credentials(&self) -> Result<()> {
        let identity =
            self.run_aws_checked(&["sts", "get-caller-identity"], "get-caller-identity")?;
        if let Some(arn) = identity["Arn"].as_str() {
            log::debug!("using credentials for {arn}");
        }
        Ok(())
    }

    fn send(&self, request: &SendRequest) -> Result<String> {
        let parameters = serde_json::to_string(&request.parameters.to_map())?;
        let timeout = request
            .timeout
            .as_secs()
            .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
            .to_string();

        let mut args = vec![
            "ssm",
            "send-command",
            "--document-name",
            request.entry_point.as_str(),
            "--parameters",
            parameters.as_str(),
            "--timeout-seconds",
            timeout.as_str(),
            "--comment",
            request.comment.as_str(),
            "--instance-ids",
        ];
        args.extend(request.targets.iter().map(String::as_str));

        let response = self.run_aws_checked(&args, "send-command")?;
        response["Command"]["CommandId"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| Error::Response("send-command returned no CommandId".into()))
    }

    fn invocation(&self, command_id: &str, target: &str) -> Result<Invocation> {
        let output = self.run_aws(&[
            "ssm",
            "get-command-invocation",
            "--command-id",
            command_id,
            "--instance-id",
            target,
        ])?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Not registered yet right after send-command
            if stderr.contains("InvocationDoesNotExist") {
                return Ok(Invocation::new(TargetState::Pending));
            }
            return Err(Error::Transport {
                message: format!("get-command-invocation for {target} failed"),
                detail: stderr.trim().to_string(),
            });
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        Ok(parse_invocation(&json))
    }
}

/// Map a remote status string to a target state.
///
/// Returns `None` for statuses this crate does not know about.
pub fn map_status(status: &str) -> Option<TargetState> {
    let state = match status {
        "Pending" => TargetState::Pending,
        "InProgress" | "Delayed" | "Cancelling" => TargetState::InProgress,
        "Success" => TargetState::Success,
        "Failed" | "Undeliverable" | "Terminated" | "InvalidPlatform" | "AccessDenied" => {
            TargetState::Failed
        }
        "Cancelled" => TargetState::Cancelled,
        "TimedOut" => TargetState::TimedOut(TimeoutSource::Remote),
        _ => return None,
    };
    Some(state)
}

/// Parse a `get-command-invocation` response.
fn parse_invocation(json: &serde_json::Value) -> Invocation {
    // StatusDetails is finer grained (Undeliverable, Delayed, ...)
    let status = json["StatusDetails"]
        .as_str()
        .filter(|s| map_status(s).is_some())
        .or_else(|| json["Status"].as_str())
        .unwrap_or_default();

    let state = map_status(status);
    if state.is_none() {
        log::warn!("unrecognized invocation status '{status}'");
    }

    Invocation {
        state,
        stdout: json["StandardOutputContent"].as_str().unwrap_or_default().to_string(),
        stderr: json["StandardErrorContent"].as_str().unwrap_or_default().to_string(),
    }
}

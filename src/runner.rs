use anyhow::{Context, Result};
use std::process::{Command, Output, Stdio};

/// Run a shell snippet with `sh -c` and capture output
pub fn shell(script: &str) -> Result<Output> {
    log::debug!("sh -c {script:?}");
    Command::new("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: sh -c {script:?}"))
}

/// Run a shell snippet and report whether it exited 0
pub fn shell_succeeds(script: &str) -> Result<bool> {
    let output = shell(script)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            log::debug!("{}", stderr.trim());
        }
    }
    Ok(output.status.success())
}

/// Run a shell snippet, failing with its stderr if it exits non-zero
pub fn shell_checked(script: &str) -> Result<String> {
    let output = shell(script)?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        match output.status.code() {
            Some(code) => anyhow::bail!("Command exited with {}: {}", code, stderr.trim()),
            None => anyhow::bail!("Command killed by signal: {}", stderr.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_succeeds() {
        assert!(shell_succeeds("true").unwrap());
        assert!(!shell_succeeds("exit 3").unwrap());
    }

    #[test]
    fn test_shell_checked() {
        assert_eq!(shell_checked("echo hello").unwrap(), "hello");
        let err = shell_checked("echo boom >&2; exit 2").unwrap_err();
        assert_eq!(err.to_string(), "Command exited with 2: boom");
    }
}

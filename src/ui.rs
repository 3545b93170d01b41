use colored::{ColoredString, Colorize};
use control::RemediationOutcome;
use fleet::{OverallStatus, TargetState};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Colored label for a control outcome
pub fn outcome(outcome: Option<RemediationOutcome>) -> ColoredString {
    match outcome {
        Some(RemediationOutcome::AlreadyCompliant) => "compliant".green(),
        Some(RemediationOutcome::Remediated) => "remediated".cyan().bold(),
        Some(RemediationOutcome::WouldRemediate) => "would remediate".yellow(),
        Some(RemediationOutcome::Failed) => "FAILED".red().bold(),
        None => "not attempted".dimmed(),
    }
}

/// Colored label for a target state
pub fn target_state(state: TargetState) -> ColoredString {
    let label = state.to_string();
    match state {
        TargetState::Success => label.green(),
        TargetState::Pending | TargetState::InProgress => label.dimmed(),
        TargetState::TimedOut(_) => label.yellow(),
        TargetState::Failed | TargetState::Cancelled => label.red(),
    }
}

/// Colored label for an overall batch status
pub fn overall(status: OverallStatus) -> ColoredString {
    match status {
        OverallStatus::Success => status.to_string().green().bold(),
        OverallStatus::Failed => status.to_string().red().bold(),
    }
}

// ============================================================================
// Size Formatting
// ============================================================================

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024 * 100), "100.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024 * 2), "2.0 GB");
    }

    #[test]
    fn test_labels_carry_text() {
        colored::control::set_override(false);
        assert_eq!(outcome(None).to_string(), "not attempted");
        assert_eq!(outcome(Some(RemediationOutcome::Failed)).to_string(), "FAILED");
        assert_eq!(
            target_state(TargetState::TimedOut(fleet::TimeoutSource::Wait)).to_string(),
            "TimedOut (wait expired)"
        );
        assert_eq!(overall(OverallStatus::Success).to_string(), "Success");
    }
}

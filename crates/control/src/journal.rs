//! Append-only phase log
//!
//! Every phase transition of every control unit produces one line:
//!
//! ```text
//! [2026-01-31T09:15:02Z] [INFO] [4.1.1] detect: drift found
//! ```
//!
//! Lines are written in call order to a single sink and mirrored to the
//! `log` facade so they also show up in diagnostic output.

use crate::types::LogLevel;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
enum Sink {
    File { path: PathBuf, file: Mutex<File> },
    Memory(Mutex<Vec<String>>),
    Disabled,
}

/// Cloneable handle to the phase log sink
#[derive(Debug, Clone)]
pub struct PhaseLog {
    sink: Arc<Sink>,
}

impl PhaseLog {
    /// Open (or create) a log file for appending
    ///
    /// Parent directories are created if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;

        Ok(Self {
            sink: Arc::new(Sink::File {
                path,
                file: Mutex::new(file),
            }),
        })
    }

    /// In-memory sink, mostly for tests
    pub fn memory() -> Self {
        Self {
            sink: Arc::new(Sink::Memory(Mutex::new(Vec::new()))),
        }
    }

    /// Sink that drops every line
    pub fn disabled() -> Self {
        Self {
            sink: Arc::new(Sink::Disabled),
        }
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        match self.sink.as_ref() {
            Sink::File { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Append one entry stamped with the current time
    pub fn write(&self, level: LogLevel, control_id: &str, message: &str) {
        self.write_at(Utc::now(), level, control_id, message);
    }

    /// Append one entry with an explicit timestamp
    pub fn write_at(&self, at: DateTime<Utc>, level: LogLevel, control_id: &str, message: &str) {
        let line = format_line(at, level, control_id, message);
        log::log!(level.to_log_level(), "[{control_id}] {message}");

        match self.sink.as_ref() {
            Sink::File { path, file } => {
                let mut file = match file.lock() {
                    Ok(f) => f,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Err(e) = writeln!(file, "{line}") {
                    log::warn!("Failed to append to {}: {}", path.display(), e);
                }
            }
            Sink::Memory(lines) => {
                let mut lines = match lines.lock() {
                    Ok(l) => l,
                    Err(poisoned) => poisoned.into_inner(),
                };
                lines.push(line);
            }
            Sink::Disabled => {}
        }
    }

    /// Lines captured so far (memory sink only; empty otherwise)
    pub fn lines(&self) -> Vec<String> {
        match self.sink.as_ref() {
            Sink::Memory(lines) => match lines.lock() {
                Ok(l) => l.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            },
            _ => Vec::new(),
        }
    }
}

/// Render a log line in the fixed phase-log format
pub fn format_line(at: DateTime<Utc>, level: LogLevel, control_id: &str, message: &str) -> String {
    format!(
        "[{}] [{}] [{}] {}",
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        level,
        control_id,
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_format_line() {
        let at = Utc.with_ymd_and_hms(2026, 1, 31, 9, 15, 2).unwrap();
        assert_eq!(
            format_line(at, LogLevel::Warn, "1.1.1.1", "backup: nothing to snapshot"),
            "[2026-01-31T09:15:02Z] [WARN] [1.1.1.1] backup: nothing to snapshot"
        );
    }

    #[test]
    fn test_file_sink_appends_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("remedy.log");

        let log = PhaseLog::open(&path).unwrap();
        log.write(LogLevel::Info, "a", "first");
        log.write(LogLevel::Error, "b", "second");

        // Reopening appends instead of truncating
        let again = PhaseLog::open(&path).unwrap();
        again.write(LogLevel::Info, "c", "third");

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("[INFO] [a] first"));
        assert!(lines[1].ends_with("[ERROR] [b] second"));
        assert!(lines[2].ends_with("[INFO] [c] third"));
    }

    #[test]
    fn test_memory_and_disabled_sinks() {
        let mem = PhaseLog::memory();
        mem.clone().write(LogLevel::Debug, "x", "hello");
        assert_eq!(mem.lines().len(), 1);

        let off = PhaseLog::disabled();
        off.write(LogLevel::Error, "x", "dropped");
        assert!(off.lines().is_empty());
        assert!(off.path().is_none());
    }
}

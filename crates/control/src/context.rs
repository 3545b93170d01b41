//! Execution context passed to every control operation
//!
//! Nothing in this crate reads process-wide state: dry-run, the log sink,
//! the backup root and the interruption flag all travel in this value.

use crate::backup::BackupStore;
use crate::interrupt::Interrupt;
use crate::journal::PhaseLog;
use crate::types::LogLevel;
use std::path::{Path, PathBuf};

/// Explicit per-run settings
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Detection only; no backup, no mutation, no verification
    pub dry_run: bool,
    /// Minimum level written to the phase log
    pub log_level: LogLevel,
    log: PhaseLog,
    backups: BackupStore,
    interrupt: Interrupt,
}

impl ExecutionContext {
    /// Create a context with a fresh interruption flag
    pub fn new(dry_run: bool, log_level: LogLevel, log: PhaseLog, backup_root: PathBuf) -> Self {
        Self {
            dry_run,
            log_level,
            log,
            backups: BackupStore::new(backup_root),
            interrupt: Interrupt::new(),
        }
    }

    /// Share an existing interruption flag
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn backup_root(&self) -> &Path {
        self.backups.root()
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn phase_log(&self) -> &PhaseLog {
        &self.log
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_set()
    }

    /// Write a phase-log entry if `level` passes the context's threshold
    pub fn log(&self, level: LogLevel, control_id: &str, message: &str) {
        if level >= self.log_level {
            self.log.write(level, control_id, message);
        }
    }

    pub fn debug(&self, control_id: &str, message: &str) {
        self.log(LogLevel::Debug, control_id, message);
    }

    pub fn info(&self, control_id: &str, message: &str) {
        self.log(LogLevel::Info, control_id, message);
    }

    pub fn warn(&self, control_id: &str, message: &str) {
        self.log(LogLevel::Warn, control_id, message);
    }

    pub fn error(&self, control_id: &str, message: &str) {
        self.log(LogLevel::Error, control_id, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_threshold() {
        let log = PhaseLog::memory();
        let ctx = ExecutionContext::new(false, LogLevel::Warn, log.clone(), "/tmp/b".into());

        ctx.debug("1.1", "hidden");
        ctx.info("1.1", "hidden");
        ctx.warn("1.1", "shown");
        ctx.error("1.1", "shown");

        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[WARN] [1.1] shown"));
    }

    #[test]
    fn test_shared_interrupt() {
        let flag = Interrupt::new();
        let ctx = ExecutionContext::new(true, LogLevel::Info, PhaseLog::disabled(), "/b".into())
            .with_interrupt(flag.clone());
        assert!(!ctx.is_interrupted());
        flag.trigger();
        assert!(ctx.is_interrupted());
        assert_eq!(ctx.backup_root(), Path::new("/b"));
    }
}

//! Remediation runner - drives controls through detect/backup/apply/verify
//!
//! The runner owns the control contract:
//! 1. `detect` decides whether anything happens at all
//! 2. every declared resource is snapshotted before `apply`
//! 3. `verify` always follows a successful `apply`
//! 4. rollback runs iff `apply` or `verify` fails (or the run is interrupted
//!    after mutation started)
//!
//! Errors from control behaviors never escape: they become
//! [`RemediationOutcome::Failed`]. The only error a caller sees is
//! [`Interrupted`].

use crate::backup::BackupRecord;
use crate::context::ExecutionContext;
use crate::types::{Phase, RemediationOutcome};
use crate::unit::{Control, ControlId, Resource};
use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

/// The run was interrupted from outside
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("control {control_id} interrupted during {phase}")]
pub struct Interrupted {
    /// Control that was running
    pub control_id: String,
    /// Phase in progress when the interruption was noticed
    pub phase: Phase,
    /// Whether a rollback ran before returning
    pub rolled_back: bool,
}

/// What to do with the rest of a group after one control fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Record the failure and keep going
    #[default]
    Continue,
    /// Stop at the first failure; remaining controls are not attempted
    FailFast,
}

#[derive(Debug)]
enum Snapshot {
    Saved(BackupRecord),
    /// Resource did not exist before `apply`
    Absent,
}

/// Run one control to its outcome
pub fn run(
    control: &dyn Control,
    ctx: &ExecutionContext,
) -> Result<RemediationOutcome, Interrupted> {
    let id = control.id().as_str();

    if ctx.is_interrupted() {
        return Err(interrupted(id, Phase::Detect, false));
    }

    ctx.debug(id, &format!("detect: {}", control.title()));
    let needs_fix = match control.detect(ctx) {
        Ok(needs_fix) => needs_fix,
        Err(e) => {
            if ctx.is_interrupted() {
                ctx.warn(id, "detect: interrupted");
                return Err(interrupted(id, Phase::Detect, false));
            }
            ctx.error(id, &format!("detect failed: {e:#}"));
            return Ok(RemediationOutcome::Failed);
        }
    };

    if ctx.is_interrupted() {
        ctx.warn(id, "detect: interrupted");
        return Err(interrupted(id, Phase::Detect, false));
    }

    if !needs_fix {
        ctx.info(id, "detect: compliant, nothing to do");
        return Ok(RemediationOutcome::AlreadyCompliant);
    }

    if ctx.dry_run {
        ctx.info(id, "detect: drift found (dry run, no changes made)");
        return Ok(RemediationOutcome::WouldRemediate);
    }
    ctx.info(id, "detect: drift found");

    if ctx.is_interrupted() {
        return Err(interrupted(id, Phase::Backup, false));
    }

    let snapshots = match snapshot(control, ctx) {
        Ok(snapshots) => snapshots,
        Err(message) => {
            if ctx.is_interrupted() {
                ctx.warn(id, "backup: interrupted");
                return Err(interrupted(id, Phase::Backup, false));
            }
            ctx.error(id, &format!("backup failed, fix not applied: {message}"));
            return Ok(RemediationOutcome::Failed);
        }
    };

    if ctx.is_interrupted() {
        return Err(interrupted(id, Phase::Backup, false));
    }

    ctx.info(id, "apply: applying fix");
    if let Err(e) = control.apply(ctx) {
        if ctx.is_interrupted() {
            ctx.warn(id, "apply: interrupted");
            rollback(control, ctx, &snapshots);
            return Err(interrupted(id, Phase::Apply, true));
        }
        ctx.error(id, &format!("apply failed: {e:#}"));
        rollback(control, ctx, &snapshots);
        return Ok(RemediationOutcome::Failed);
    }

    if ctx.is_interrupted() {
        ctx.warn(id, "apply: interrupted after fix, rolling back");
        rollback(control, ctx, &snapshots);
        return Err(interrupted(id, Phase::Apply, true));
    }

    ctx.debug(id, "verify: checking fix");
    let verified = control.verify(ctx);

    // A confirmed fix has nothing left to undo; the caller sees the flag
    if ctx.is_interrupted() && !matches!(verified, Ok(true)) {
        ctx.warn(id, "verify: interrupted");
        rollback(control, ctx, &snapshots);
        return Err(interrupted(id, Phase::Verify, true));
    }

    match verified {
        Ok(true) => {
            ctx.info(id, "verify: compliant, remediated");
            Ok(RemediationOutcome::Remediated)
        }
        Ok(false) => {
            ctx.error(id, "verify: still non-compliant after apply");
            rollback(control, ctx, &snapshots);
            Ok(RemediationOutcome::Failed)
        }
        Err(e) => {
            ctx.error(id, &format!("verify failed: {e:#}"));
            rollback(control, ctx, &snapshots);
            Ok(RemediationOutcome::Failed)
        }
    }
}

/// Phase a control had reached when it returned `outcome`
fn settled_phase(outcome: RemediationOutcome) -> Phase {
    match outcome {
        RemediationOutcome::Remediated => Phase::Verify,
        RemediationOutcome::Failed => Phase::Rollback,
        RemediationOutcome::AlreadyCompliant | RemediationOutcome::WouldRemediate => Phase::Detect,
    }
}

fn interrupted(id: &str, phase: Phase, rolled_back: bool) -> Interrupted {
    Interrupted {
        control_id: id.to_string(),
        phase,
        rolled_back,
    }
}

/// Snapshot every declared resource, in declaration order
fn snapshot<'a>(
    control: &'a dyn Control,
    ctx: &ExecutionContext,
) -> Result<Vec<(&'a Resource, Snapshot)>, String> {
    let id = control.id().as_str();
    let resources = control.resources();

    if resources.is_empty() {
        ctx.debug(id, "backup: no resources declared");
    }

    let mut taken = Vec::with_capacity(resources.len());
    for resource in resources {
        match ctx.backups().create(&resource.name, &resource.path) {
            Ok(Some(record)) => {
                ctx.info(
                    id,
                    &format!("backup: {} saved to {}", resource.name, record.location.display()),
                );
                taken.push((resource, Snapshot::Saved(record)));
            }
            Ok(None) => {
                ctx.debug(
                    id,
                    &format!("backup: {} does not exist yet, nothing to save", resource.name),
                );
                taken.push((resource, Snapshot::Absent));
            }
            Err(e) => return Err(format!("{}: {e}", resource.name)),
        }
    }
    Ok(taken)
}

/// Put every snapshotted resource back, newest mutation first
///
/// Failures are logged and never abort the remaining restores.
fn rollback(control: &dyn Control, ctx: &ExecutionContext, snapshots: &[(&Resource, Snapshot)]) {
    let id = control.id().as_str();
    ctx.info(id, &format!("rollback: restoring {} resource(s)", snapshots.len()));

    for (resource, snapshot) in snapshots.iter().rev() {
        match snapshot {
            Snapshot::Saved(record) => {
                match ctx.backups().restore(&record.logical_name, &resource.path) {
                    Ok(Some(from)) => ctx.info(
                        id,
                        &format!("rollback: restored {} from {}", resource.name, from.display()),
                    ),
                    Ok(None) => ctx.warn(
                        id,
                        &format!("rollback: nothing restored for {}", resource.name),
                    ),
                    Err(e) => ctx.warn(
                        id,
                        &format!("rollback: failed to restore {}: {e}", resource.name),
                    ),
                }
            }
            Snapshot::Absent => {
                if !resource.path.exists() {
                    continue;
                }
                match fs::remove_file(&resource.path) {
                    Ok(()) => ctx.info(
                        id,
                        &format!("rollback: removed {} created by apply", resource.name),
                    ),
                    Err(e) => ctx.warn(
                        id,
                        &format!("rollback: failed to remove {}: {e}", resource.name),
                    ),
                }
            }
        }
    }
}

/// Outcome of one control within a group run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    pub id: ControlId,
    pub title: String,
    /// `None` when the control was never attempted
    pub outcome: Option<RemediationOutcome>,
}

/// Outcomes of a group run, in execution order
#[derive(Debug, Clone, Default)]
pub struct GroupReport {
    pub units: Vec<UnitReport>,
    /// Set when the run stopped because of an interruption
    pub interrupted: Option<Interrupted>,
}

impl GroupReport {
    /// Number of controls that ended with `outcome`
    pub fn count(&self, outcome: RemediationOutcome) -> usize {
        self.units.iter().filter(|u| u.outcome == Some(outcome)).count()
    }

    pub fn failed(&self) -> usize {
        self.count(RemediationOutcome::Failed)
    }

    pub fn not_attempted(&self) -> usize {
        self.units.iter().filter(|u| u.outcome.is_none()).count()
    }

    /// No failures and no interruption
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.interrupted.is_none()
    }
}

/// Run controls sequentially in ascending id order
///
/// Duplicate ids run once. Under [`FailurePolicy::FailFast`] the first failed
/// control stops the run; the rest are reported as not attempted. An
/// interruption always stops the run.
pub fn run_all(
    controls: &[&dyn Control],
    ctx: &ExecutionContext,
    policy: FailurePolicy,
) -> GroupReport {
    let mut ordered: Vec<&dyn Control> = controls.to_vec();
    ordered.sort_by(|a, b| a.id().cmp(b.id()));
    ordered.dedup_by(|a, b| a.id() == b.id());

    let mut report = GroupReport::default();
    let mut stopped = false;

    for control in ordered {
        let mut unit = UnitReport {
            id: control.id().clone(),
            title: control.title().to_string(),
            outcome: None,
        };

        if !stopped {
            match run(control, ctx) {
                Ok(outcome) => {
                    unit.outcome = Some(outcome);
                    if ctx.is_interrupted() {
                        // Signal landed while the control was finishing
                        let e = interrupted(control.id().as_str(), settled_phase(outcome), false);
                        log::warn!("{e}");
                        report.interrupted = Some(e);
                        stopped = true;
                    } else if outcome.is_failure() && policy == FailurePolicy::FailFast {
                        ctx.warn(
                            control.id().as_str(),
                            "fail-fast: skipping remaining controls",
                        );
                        stopped = true;
                    }
                }
                Err(e) => {
                    log::warn!("{e}");
                    report.interrupted = Some(e);
                    stopped = true;
                }
            }
        }

        report.units.push(unit);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::PhaseLog;
    use crate::types::LogLevel;
    use crate::unit::ControlUnit;
    use anyhow::bail;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const DESIRED: &str = "install cramfs /bin/true\n";

    struct Fixture {
        _dir: TempDir,
        live: PathBuf,
        backups: PathBuf,
        log: PhaseLog,
    }

    impl Fixture {
        fn new(initial: Option<&str>) -> Self {
            let dir = TempDir::new().unwrap();
            let live = dir.path().join("cramfs.conf");
            if let Some(content) = initial {
                fs::write(&live, content).unwrap();
            }
            Self {
                backups: dir.path().join("backups"),
                live,
                log: PhaseLog::memory(),
                _dir: dir,
            }
        }

        fn ctx(&self, dry_run: bool) -> ExecutionContext {
            ExecutionContext::new(dry_run, LogLevel::Debug, self.log.clone(), self.backups.clone())
        }

        fn backup_count(&self) -> usize {
            fs::read_dir(&self.backups).map(|d| d.count()).unwrap_or(0)
        }

        fn has_line(&self, needle: &str) -> bool {
            self.log.lines().iter().any(|l| l.contains(needle))
        }
    }

    fn read(path: &Path) -> Option<String> {
        fs::read_to_string(path).ok()
    }

    /// File-content control; `apply_writes` is what the fix writes
    fn file_control(live: &Path, apply_writes: &'static str, apply_fails: bool) -> ControlUnit {
        let (d, a, v) = (live.to_path_buf(), live.to_path_buf(), live.to_path_buf());
        ControlUnit::builder("1.1.1.1", "Ensure cramfs is disabled")
            .group(1)
            .resource(crate::unit::Resource::new("cramfs.conf", live))
            .detect(move |_| Ok(read(&d).as_deref() != Some(DESIRED)))
            .apply(move |_| {
                fs::write(&a, apply_writes)?;
                if apply_fails {
                    bail!("modprobe exited with status 1");
                }
                Ok(())
            })
            .verify(move |_| Ok(read(&v).as_deref() == Some(DESIRED)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_remediates_then_idempotent() {
        let fx = Fixture::new(Some("# empty\n"));
        let control = file_control(&fx.live, DESIRED, false);

        assert_eq!(run(&control, &fx.ctx(false)), Ok(RemediationOutcome::Remediated));
        assert_eq!(read(&fx.live).as_deref(), Some(DESIRED));
        assert_eq!(fx.backup_count(), 1);

        assert_eq!(
            run(&control, &fx.ctx(false)),
            Ok(RemediationOutcome::AlreadyCompliant)
        );
        assert_eq!(fx.backup_count(), 1);
    }

    #[test]
    fn test_already_compliant_touches_nothing() {
        let fx = Fixture::new(Some(DESIRED));
        let applied = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&applied);
        let control = ControlUnit::builder("2.2.1", "noop")
            .group(2)
            .resource(crate::unit::Resource::new("cramfs.conf", &fx.live))
            .detect(|_| Ok(false))
            .apply(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .verify(|_| Ok(true))
            .build()
            .unwrap();

        assert_eq!(
            run(&control, &fx.ctx(false)),
            Ok(RemediationOutcome::AlreadyCompliant)
        );
        assert_eq!(applied.load(Ordering::SeqCst), 0);
        assert_eq!(fx.backup_count(), 0);
    }

    #[test]
    fn test_backup_taken_before_apply() {
        let fx = Fixture::new(Some("original\n"));
        let backups = fx.backups.clone();
        let seen_backup = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&seen_backup);
        let live = fx.live.clone();

        let control = ControlUnit::builder("3.1", "backup first")
            .group(3)
            .resource(crate::unit::Resource::new("cramfs.conf", &fx.live))
            .detect(|_| Ok(true))
            .apply(move |_| {
                seen.store(fs::read_dir(&backups)?.count(), Ordering::SeqCst);
                fs::write(&live, DESIRED)?;
                Ok(())
            })
            .verify(|_| Ok(true))
            .build()
            .unwrap();

        assert_eq!(run(&control, &fx.ctx(false)), Ok(RemediationOutcome::Remediated));
        assert_eq!(seen_backup.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_apply_failure_rolls_back() {
        let fx = Fixture::new(Some("original\n"));
        let control = file_control(&fx.live, "half-written", true);

        assert_eq!(run(&control, &fx.ctx(false)), Ok(RemediationOutcome::Failed));
        assert_eq!(read(&fx.live).as_deref(), Some("original\n"));
        assert!(fx.has_line("[ERROR] [1.1.1.1] apply failed: modprobe exited with status 1"));
        assert!(fx.has_line("[INFO] [1.1.1.1] rollback: restored cramfs.conf"));
    }

    #[test]
    fn test_verify_failure_rolls_back() {
        let fx = Fixture::new(Some("original\n"));
        let control = file_control(&fx.live, "not what verify wants\n", false);

        assert_eq!(run(&control, &fx.ctx(false)), Ok(RemediationOutcome::Failed));
        assert_eq!(read(&fx.live).as_deref(), Some("original\n"));
        assert!(fx.has_line("verify: still non-compliant after apply"));
    }

    #[test]
    fn test_rollback_removes_created_resource() {
        let fx = Fixture::new(None);
        let control = file_control(&fx.live, "created by apply", false);

        assert_eq!(run(&control, &fx.ctx(false)), Ok(RemediationOutcome::Failed));
        assert!(!fx.live.exists());
        assert_eq!(fx.backup_count(), 0);
    }

    #[test]
    fn test_dry_run_is_noop() {
        let fx = Fixture::new(Some("original\n"));
        let control = file_control(&fx.live, "half-written", true);

        assert_eq!(
            run(&control, &fx.ctx(true)),
            Ok(RemediationOutcome::WouldRemediate)
        );
        assert_eq!(read(&fx.live).as_deref(), Some("original\n"));
        assert_eq!(fx.backup_count(), 0);
    }

    #[test]
    fn test_detect_error_is_failed_without_rollback() {
        let fx = Fixture::new(Some("original\n"));
        let control = ControlUnit::builder("5.2.3", "broken detect")
            .group(5)
            .detect(|_| bail!("sshd -T: command not found"))
            .apply(|_| Ok(()))
            .verify(|_| Ok(true))
            .build()
            .unwrap();

        assert_eq!(run(&control, &fx.ctx(false)), Ok(RemediationOutcome::Failed));
        assert!(fx.has_line("detect failed: sshd -T: command not found"));
        assert!(!fx.has_line("rollback"));
    }

    #[test]
    fn test_interrupt_during_apply_rolls_back() {
        let fx = Fixture::new(Some("original\n"));
        let ctx = fx.ctx(false);
        let flag = ctx.interrupt().clone();
        let live = fx.live.clone();

        let control = ControlUnit::builder("4.1.1", "interrupted")
            .group(4)
            .resource(crate::unit::Resource::new("cramfs.conf", &fx.live))
            .detect(|_| Ok(true))
            .apply(move |_| {
                fs::write(&live, "partial")?;
                flag.trigger();
                bail!("killed by signal")
            })
            .verify(|_| Ok(true))
            .build()
            .unwrap();

        let err = run(&control, &ctx).unwrap_err();
        assert_eq!(err.phase, Phase::Apply);
        assert!(err.rolled_back);
        assert_eq!(read(&fx.live).as_deref(), Some("original\n"));
    }

    fn stub(id: &str, outcome_fails: bool) -> ControlUnit {
        ControlUnit::builder(id, format!("stub {id}"))
            .group(4)
            .detect(|_| Ok(true))
            .apply(move |_| {
                if outcome_fails {
                    bail!("boom");
                }
                Ok(())
            })
            .verify(|_| Ok(true))
            .build()
            .unwrap()
    }

    #[test]
    fn test_run_all_orders_by_id_and_continues() {
        let fx = Fixture::new(None);
        let a = stub("4.1.10", false);
        let b = stub("4.1.2", true);
        let c = stub("4.1.1", false);
        let controls: Vec<&dyn Control> = vec![&a, &b, &c];

        let report = run_all(&controls, &fx.ctx(false), FailurePolicy::Continue);
        let order: Vec<_> = report.units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(order, ["4.1.1", "4.1.2", "4.1.10"]);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.count(RemediationOutcome::Remediated), 2);
        assert!(!report.is_success());
    }

    #[test]
    fn test_run_all_fail_fast() {
        let fx = Fixture::new(None);
        let a = stub("4.1.1", true);
        let b = stub("4.1.2", false);
        let controls: Vec<&dyn Control> = vec![&b, &a];

        let report = run_all(&controls, &fx.ctx(false), FailurePolicy::FailFast);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.not_attempted(), 1);
        assert_eq!(report.units[1].outcome, None);
    }

    #[test]
    fn test_interrupt_during_failed_verify_rolls_back() {
        let fx = Fixture::new(Some("original\n"));
        let ctx = fx.ctx(false);
        let flag = ctx.interrupt().clone();
        let live = fx.live.clone();

        // SIGINT kills the verify child, which then just looks non-compliant
        let control = ControlUnit::builder("4.1.1", "interrupted verify")
            .group(4)
            .resource(crate::unit::Resource::new("cramfs.conf", &fx.live))
            .detect(|_| Ok(true))
            .apply(move |_| {
                fs::write(&live, DESIRED)?;
                Ok(())
            })
            .verify(move |_| {
                flag.trigger();
                Ok(false)
            })
            .build()
            .unwrap();

        let err = run(&control, &ctx).unwrap_err();
        assert_eq!(err.phase, Phase::Verify);
        assert!(err.rolled_back);
        assert_eq!(read(&fx.live).as_deref(), Some("original\n"));
    }

    #[test]
    fn test_interrupt_during_compliant_detect() {
        let fx = Fixture::new(None);
        let ctx = fx.ctx(false);
        let flag = ctx.interrupt().clone();
        let control = ControlUnit::builder("2.2.1", "compliant")
            .group(2)
            .detect(move |_| {
                flag.trigger();
                Ok(false)
            })
            .apply(|_| Ok(()))
            .verify(|_| Ok(true))
            .build()
            .unwrap();

        let err = run(&control, &ctx).unwrap_err();
        assert_eq!(err.phase, Phase::Detect);
        assert!(!err.rolled_back);
    }

    #[test]
    fn test_run_all_records_interrupt_in_last_control() {
        let fx = Fixture::new(None);
        let ctx = fx.ctx(false);
        let flag = ctx.interrupt().clone();
        let first = stub("4.1.1", false);
        let last = ControlUnit::builder("4.1.2", "last")
            .group(4)
            .detect(|_| Ok(true))
            .apply(|_| Ok(()))
            .verify(move |_| {
                flag.trigger();
                Ok(true)
            })
            .build()
            .unwrap();
        let controls: Vec<&dyn Control> = vec![&first, &last];

        let report = run_all(&controls, &ctx, FailurePolicy::Continue);
        assert_eq!(report.units[1].outcome, Some(RemediationOutcome::Remediated));
        let interrupted = report.interrupted.clone().unwrap();
        assert_eq!(interrupted.control_id, "4.1.2");
        assert_eq!(interrupted.phase, Phase::Verify);
        assert!(!report.is_success());
    }

    #[test]
    fn test_run_all_stops_on_interrupt() {
        let fx = Fixture::new(None);
        let ctx = fx.ctx(false);
        ctx.interrupt().trigger();
        let a = stub("1.1", false);
        let controls: Vec<&dyn Control> = vec![&a];

        let report = run_all(&controls, &ctx, FailurePolicy::Continue);
        assert!(report.interrupted.is_some());
        assert_eq!(report.not_attempted(), 1);
    }
}

//! `remedy run` - run a group of controls on this host

use anyhow::{Context as _, Result, anyhow};
use colored::Colorize;
use control::{
    Control, ControlUnit, ExecutionContext, FailurePolicy, GroupReport, GroupSelector, Interrupt,
    LogLevel, PhaseLog, RemediationOutcome,
};

use super::{Status, load_selection};
use crate::Context;
use crate::cli::RunArgs;
use crate::{paths, selection, ui};

pub fn run(ctx: &Context, args: RunArgs, interrupt: Interrupt) -> Result<Status> {
    let group: GroupSelector = args.group.parse().map_err(|e: String| anyhow!(e))?;
    let log_level: LogLevel = args.log_level.parse().map_err(|e: String| anyhow!(e))?;

    let (catalog, rules) = load_selection(&args.selection)?;
    let selected = selection::select(&catalog, group, rules.as_ref())?;
    let units = selected
        .iter()
        .map(|spec| spec.to_unit())
        .collect::<Result<Vec<ControlUnit>>>()?;

    let log_path = paths::resolve(args.log_file.as_deref(), paths::log_file)?;
    let backup_root = paths::resolve(args.backup_dir.as_deref(), paths::backup_dir)?;
    let log = PhaseLog::open(&log_path)
        .with_context(|| format!("Could not open phase log {}", log_path.display()))?;

    let exec = ExecutionContext::new(args.dry_run, log_level, log, backup_root)
        .with_interrupt(interrupt);
    let policy = if args.fail_fast {
        FailurePolicy::FailFast
    } else {
        FailurePolicy::Continue
    };

    if !ctx.quiet {
        ui::header(&format!("Remediating group {group}"));
        ui::kv("Controls", &units.len().to_string());
        ui::kv("Phase log", &log_path.display().to_string());
        ui::kv("Backups", &exec.backup_root().display().to_string());
        if args.dry_run {
            ui::warn("Dry run - detection only, no changes will be made");
        }
        println!();
    }

    if units.is_empty() {
        ui::warn("No controls selected");
        return Ok(Status::Success);
    }

    let controls: Vec<&dyn Control> = units.iter().map(|u| u as &dyn Control).collect();
    let report = control::run_all(&controls, &exec, policy);

    print_report(&report);
    Ok(status_of(&report))
}

fn print_report(report: &GroupReport) {
    for unit in &report.units {
        println!(
            "  {:<12} {:<16} {}",
            unit.id.to_string(),
            ui::outcome(unit.outcome).to_string(),
            unit.title.dimmed()
        );
    }

    println!();
    let summary = [
        ("remediated", report.count(RemediationOutcome::Remediated)),
        ("compliant", report.count(RemediationOutcome::AlreadyCompliant)),
        ("would remediate", report.count(RemediationOutcome::WouldRemediate)),
        ("failed", report.failed()),
        ("not attempted", report.not_attempted()),
    ]
    .iter()
    .filter(|(_, n)| *n > 0)
    .map(|(label, n)| format!("{n} {label}"))
    .collect::<Vec<_>>()
    .join(", ");
    ui::kv("Summary", &summary);

    if let Some(interrupted) = &report.interrupted {
        let note = if interrupted.rolled_back {
            " (rolled back)"
        } else {
            ""
        };
        ui::error(&format!("Interrupted: {interrupted}{note}"));
    } else if report.failed() > 0 {
        ui::error(&format!("{} control(s) failed", report.failed()));
    } else {
        ui::success("Run complete");
    }
}

fn status_of(report: &GroupReport) -> Status {
    if report.interrupted.is_some() {
        Status::Interrupted
    } else if report.failed() > 0 {
        Status::Failed
    } else {
        Status::Success
    }
}

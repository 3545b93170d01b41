//! `remedy dispatch` - fan a group out to remote targets

use anyhow::{Result, anyhow};
use colored::Colorize;
use control::Interrupt;
use fleet::backend::ssm::SsmBackend;
use fleet::types::{parse_group, parse_log_level, parse_target_list};
use fleet::{
    ArtifactSource, BatchSummary, Clock, CompletionWatcher, DispatchOptions, DispatchRequest,
    Dispatcher, FixedIntervalPoller, SystemClock, Transport, aggregate,
};
use std::time::Duration;

use super::Status;
use crate::Context;
use crate::cli::DispatchArgs;
use crate::progress::WaitSpinner;
use crate::ui;

/// How to wait once the batch is dispatched
pub struct WaitOptions {
    pub interval: Duration,
}

/// Output settings for `dispatch_and_wait`
#[derive(Clone, Copy)]
pub struct Output {
    pub json: bool,
}

pub fn run(ctx: &Context, args: DispatchArgs, interrupt: Interrupt) -> Result<Status> {
    let request = build_request(&args)?;
    let wait = args.wait.then(|| WaitOptions {
        interval: Duration::from_secs(args.interval),
    });

    let backend = SsmBackend::new()
        .with_profile(args.profile)
        .with_region(args.region);
    let output = Output { json: args.json };
    dispatch_and_wait(ctx, &backend, &SystemClock::new(), &request, wait, output, interrupt)
}

/// Validate every input before anything remote is touched
fn build_request(args: &DispatchArgs) -> Result<DispatchRequest> {
    let group = parse_group(&args.group)?;
    let log_level = parse_log_level(&args.log_level)?;

    let mut options = DispatchOptions::new(ArtifactSource {
        bucket: args.bucket.clone(),
        key_prefix: args.prefix.clone(),
    });
    options.dry_run = args.dry_run;
    options.log_level = log_level;
    // Negative timeouts collapse to zero and fail validation
    options.timeout = Duration::from_secs(u64::try_from(args.timeout).unwrap_or(0));
    options.entry_point = args.document.clone();

    Ok(DispatchRequest::new(
        group,
        parse_target_list(&args.targets),
        options,
    )?)
}

pub fn dispatch_and_wait(
    ctx: &Context,
    transport: &dyn Transport,
    clock: &dyn Clock,
    request: &DispatchRequest,
    wait: Option<WaitOptions>,
    output: Output,
    interrupt: Interrupt,
) -> Result<Status> {
    let handle = Dispatcher::new(transport).submit(request).map_err(|e| match e.detail() {
        Some(detail) => anyhow!("{e}\n{detail}"),
        None => anyhow!(e),
    })?;

    if output.json && wait.is_none() {
        println!("{}", serde_json::to_string_pretty(&handle)?);
    } else if !output.json {
        for warning in &handle.warnings {
            ui::warn(warning);
        }
        ui::success(&format!(
            "Dispatched group {} to {} target(s)",
            request.group(),
            handle.targets.len()
        ));
        ui::kv("Command", &handle.command_id);
        ui::kv("Entry point", &handle.entry_point);
    }

    let Some(wait) = wait else {
        return Ok(Status::Success);
    };

    let timeout = request.options().timeout;
    let spinner = WaitSpinner::new(handle.targets.len(), ctx.quiet || output.json);
    let report = FixedIntervalPoller::new(transport, clock)
        .with_interval(wait.interval)
        .with_interrupt(interrupt)
        .with_progress(&spinner)
        .wait(&handle, &handle.targets, timeout);
    spinner.finish();

    let summary = aggregate(&report);
    if output.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(ctx, &summary);
    }

    Ok(if summary.interrupted {
        Status::Interrupted
    } else if summary.is_success() {
        Status::Success
    } else {
        Status::Failed
    })
}

fn print_summary(ctx: &Context, summary: &BatchSummary) {
    ui::header("Batch results");
    for target in &summary.targets {
        println!(
            "  {:<24} {}",
            target.target,
            ui::target_state(target.state)
        );
        if ctx.verbose > 0 && !target.output_tail.is_empty() {
            for line in target.output_tail.lines() {
                ui::dim(line);
            }
        }
        if let Some(err) = &target.error_tail {
            for line in err.lines() {
                println!("    {}", line.red());
            }
        }
    }

    println!();
    let counts = summary
        .counts
        .iter()
        .map(|(state, n)| format!("{n} {state}"))
        .collect::<Vec<_>>()
        .join(", ");
    ui::kv("Targets", &counts);

    if summary.timed_out {
        ui::warn("Wait timed out; remote work on unfinished targets was not cancelled");
    }
    if summary.interrupted {
        ui::error("Wait interrupted; results are partial");
    }
    println!("  {}: {}", "Overall".dimmed(), ui::overall(summary.overall));
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet::backend::mock::MockTransport;
    use fleet::{ManualClock, TargetState};

    fn quiet() -> Context {
        Context {
            verbose: 0,
            quiet: true,
        }
    }

    fn args(group: &str, targets: &str) -> DispatchArgs {
        DispatchArgs {
            group: group.to_string(),
            targets: targets.to_string(),
            dry_run: false,
            bucket: "remedy-artifacts".to_string(),
            prefix: "remedy/".to_string(),
            log_level: "INFO".to_string(),
            wait: true,
            json: false,
            timeout: 30,
            interval: 10,
            document: fleet::types::DEFAULT_ENTRY_POINT.to_string(),
            profile: None,
            region: None,
        }
    }

    const TEXT: Output = Output { json: false };

    fn wait() -> Option<WaitOptions> {
        Some(WaitOptions {
            interval: Duration::from_secs(10),
        })
    }

    #[test]
    fn test_scenario_a_single_target_success() {
        let mock = MockTransport::new().script("t1", [TargetState::Success]);
        let request = build_request(&args("4", "t1")).unwrap();

        let status = dispatch_and_wait(
            &quiet(),
            &mock,
            &ManualClock::new(),
            &request,
            wait(),
            TEXT,
            Interrupt::new(),
        )
        .unwrap();

        assert_eq!(status, Status::Success);
        assert_eq!(mock.sent().len(), 1);
    }

    #[test]
    fn test_scenario_b_timeout_fails_batch() {
        let mock = MockTransport::new()
            .script("t1", [TargetState::InProgress, TargetState::Success])
            .script("t2", [TargetState::InProgress]);
        let request = build_request(&args("4", "t1,t2")).unwrap();

        let status = dispatch_and_wait(
            &quiet(),
            &mock,
            &ManualClock::new(),
            &request,
            wait(),
            TEXT,
            Interrupt::new(),
        )
        .unwrap();

        assert_eq!(status, Status::Failed);
    }

    #[test]
    fn test_scenario_d_empty_targets_rejected_before_dispatch() {
        let err = build_request(&args("4", " , ")).unwrap_err();
        assert_eq!(err.to_string(), "target set is empty");
    }

    #[test]
    fn test_non_positive_timeout_rejected() {
        let mut a = args("all", "t1");
        a.timeout = -1;
        assert!(build_request(&a).is_err());
    }

    #[test]
    fn test_no_wait_returns_after_dispatch() {
        let mock = MockTransport::new();
        let request = build_request(&args("all", "t1")).unwrap();

        let status = dispatch_and_wait(
            &quiet(),
            &mock,
            &ManualClock::new(),
            &request,
            None,
            TEXT,
            Interrupt::new(),
        )
        .unwrap();

        assert_eq!(status, Status::Success);
        assert_eq!(mock.query_count(), 0);
    }

    #[test]
    fn test_rejected_dispatch_surfaces_detail() {
        let mock = MockTransport::new().rejecting("AccessDeniedException: not authorized");
        let request = build_request(&args("all", "t1")).unwrap();

        let err = dispatch_and_wait(
            &quiet(),
            &mock,
            &ManualClock::new(),
            &request,
            wait(),
            TEXT,
            Interrupt::new(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("AccessDeniedException"));
    }

    #[test]
    fn test_interrupted_wait_exits_interrupted() {
        let mock = MockTransport::new().script("t1", [TargetState::InProgress]);
        let request = build_request(&args("all", "t1")).unwrap();
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let status = dispatch_and_wait(
            &quiet(),
            &mock,
            &ManualClock::new(),
            &request,
            wait(),
            TEXT,
            interrupt,
        )
        .unwrap();

        assert_eq!(status, Status::Interrupted);
    }
}

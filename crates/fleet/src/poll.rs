//! Completion poller.
//!
//! Waiting sits behind [`CompletionWatcher`] so a batched or push-based
//! strategy can replace the fixed-interval loop without touching the
//! aggregator. The fixed-interval implementation sleeps, then issues one
//! status probe per non-terminal target, until every target is terminal or
//! the timeout elapses.

use crate::backend::Transport;
use crate::types::{BatchReport, DispatchHandle, TargetState, TimeoutSource};
use control::Interrupt;
use rayon::prelude::*;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default delay between poll rounds.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Shortest delay between poll rounds; smaller intervals are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Longest uninterrupted sleep; bounds how late an interrupt is noticed.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Time source for the wait loop.
pub trait Clock: Send + Sync {
    /// Time since the clock was started
    fn elapsed(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when slept on or advanced. For tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = match self.now.lock() {
            Ok(n) => n,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now += by;
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        match self.now.lock() {
            Ok(n) => *n,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Callback trait for wait progress.
pub trait PollProgress {
    /// Called after each completed round.
    fn on_round(&self, round: u32, report: &BatchReport);
}

/// No-op progress callback.
pub struct NoProgress;

impl PollProgress for NoProgress {
    fn on_round(&self, _round: u32, _report: &BatchReport) {}
}

/// Something that can wait for a dispatch to finish.
pub trait CompletionWatcher {
    /// Wait until every target is terminal, the timeout elapses, or the wait
    /// is interrupted. Always returns a report, possibly partial.
    fn wait(&self, handle: &DispatchHandle, targets: &[String], timeout: Duration) -> BatchReport;
}

/// Polls every non-terminal target once per interval.
pub struct FixedIntervalPoller<'a> {
    transport: &'a dyn Transport,
    clock: &'a dyn Clock,
    interval: Duration,
    interrupt: Interrupt,
    progress: &'a dyn PollProgress,
}

impl<'a> FixedIntervalPoller<'a> {
    pub fn new(transport: &'a dyn Transport, clock: &'a dyn Clock) -> Self {
        Self {
            transport,
            clock,
            interval: DEFAULT_INTERVAL,
            interrupt: Interrupt::new(),
            progress: &NoProgress,
        }
    }

    /// Delay between rounds, never less than [`MIN_INTERVAL`]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn PollProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Sleep for `duration` in short slices. Returns true if interrupted.
    fn pause(&self, duration: Duration) -> bool {
        let deadline = self.clock.elapsed() + duration;
        loop {
            if self.interrupt.is_set() {
                return true;
            }
            let now = self.clock.elapsed();
            if now >= deadline {
                return false;
            }
            self.clock.sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// One status probe per non-terminal target, issued in parallel.
    fn poll_round(&self, report: &mut BatchReport) {
        let pending: Vec<String> = report.pending().into_iter().map(String::from).collect();
        let command_id = report.command_id.clone();

        let results: Vec<_> = pending
            .par_iter()
            .map(|target| (target, self.transport.invocation(&command_id, target)))
            .collect();

        for (target, result) in results {
            let Some(status) = report.get_mut(target) else {
                continue;
            };
            match result {
                Ok(invocation) => {
                    let before = status.state;
                    status.observe(invocation);
                    if status.state != before {
                        log::info!("{target}: {before} -> {}", status.state);
                    }
                }
                Err(e) => match e.detail() {
                    Some(detail) => {
                        log::warn!("{target}: {e} ({detail}); retrying next round");
                    }
                    None => log::warn!("{target}: {e}; retrying next round"),
                },
            }
        }
    }
}

impl CompletionWatcher for FixedIntervalPoller<'_> {
    fn wait(&self, handle: &DispatchHandle, targets: &[String], timeout: Duration) -> BatchReport {
        let mut report = BatchReport::new(&handle.command_id, targets);
        let started = self.clock.elapsed();

        loop {
            if report.all_terminal() {
                break;
            }
            if self.interrupt.is_set() {
                report.interrupted = true;
                break;
            }
            let waited = self.clock.elapsed().saturating_sub(started);
            if waited >= timeout {
                break;
            }
            if self.pause(self.interval.min(timeout - waited)) {
                report.interrupted = true;
                break;
            }

            report.rounds += 1;
            self.poll_round(&mut report);
            self.progress.on_round(report.rounds, &report);
        }

        if report.interrupted {
            log::warn!(
                "wait interrupted after {} round(s); {} target(s) still running",
                report.rounds,
                report.pending().len()
            );
        } else if report.all_terminal() {
            log::info!("all targets terminal after {} round(s)", report.rounds);
        } else {
            let pending: Vec<String> = report.pending().into_iter().map(String::from).collect();
            log::warn!(
                "wait timed out after {}s; marking {} as timed out (remote work is not cancelled)",
                timeout.as_secs(),
                pending.join(", ")
            );
            for target in &pending {
                if let Some(status) = report.get_mut(target) {
                    status.advance(TargetState::TimedOut(TimeoutSource::Wait));
                }
            }
            report.timed_out = true;
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockResponse, MockTransport};
    use crate::types::Invocation;
    use chrono::Utc;
    use std::cell::Cell;

    fn handle(targets: &[&str]) -> (DispatchHandle, Vec<String>) {
        let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
        let handle = DispatchHandle {
            command_id: "cmd-1".into(),
            entry_point: "Remedy-RunControls".into(),
            targets: targets.clone(),
            submitted_at: Utc::now(),
            warnings: Vec::new(),
        };
        (handle, targets)
    }

    #[test]
    fn test_scenario_b_timeout_after_three_rounds() {
        let mock = MockTransport::new()
            .script("t1", [TargetState::InProgress, TargetState::Success])
            .script("t2", [TargetState::InProgress]);
        let clock = ManualClock::new();
        let poller = FixedIntervalPoller::new(&mock, &clock).with_interval(Duration::from_secs(10));
        let (handle, targets) = handle(&["t1", "t2"]);

        let report = poller.wait(&handle, &targets, Duration::from_secs(30));

        assert_eq!(report.rounds, 3);
        assert!(report.timed_out);
        assert!(!report.interrupted);
        assert_eq!(report.get("t1").unwrap().state, TargetState::Success);
        assert_eq!(
            report.get("t2").unwrap().state,
            TargetState::TimedOut(TimeoutSource::Wait)
        );
        // t1 stops being probed once terminal
        assert_eq!(mock.query_count(), 5);
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_interval_still_reaches_timeout() {
        let mock = MockTransport::new().script("t1", [TargetState::InProgress]);
        let clock = ManualClock::new();
        let poller = FixedIntervalPoller::new(&mock, &clock).with_interval(Duration::ZERO);
        let (handle, targets) = handle(&["t1"]);

        let report = poller.wait(&handle, &targets, Duration::from_secs(3));

        assert!(report.timed_out);
        assert_eq!(report.rounds, 3);
        assert_eq!(mock.query_count(), 3);
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn test_stops_as_soon_as_all_terminal() {
        let mock = MockTransport::new()
            .script("t1", [TargetState::Success])
            .script("t2", [TargetState::Pending, TargetState::Failed]);
        let clock = ManualClock::new();
        let poller = FixedIntervalPoller::new(&mock, &clock).with_interval(Duration::from_secs(5));
        let (handle, targets) = handle(&["t1", "t2"]);

        let report = poller.wait(&handle, &targets, Duration::from_secs(3600));

        assert_eq!(report.rounds, 2);
        assert!(!report.timed_out);
        assert_eq!(report.get("t2").unwrap().state, TargetState::Failed);
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_query_error_is_retried_next_round() {
        let mock = MockTransport::new().script(
            "t1",
            [
                MockResponse::QueryError("ThrottlingException".into()),
                MockResponse::from(Invocation::new(TargetState::Success).with_output("ok", "")),
            ],
        );
        let clock = ManualClock::new();
        let poller = FixedIntervalPoller::new(&mock, &clock).with_interval(Duration::from_secs(1));
        let (handle, targets) = handle(&["t1"]);

        let report = poller.wait(&handle, &targets, Duration::from_secs(60));

        assert_eq!(report.rounds, 2);
        let t1 = report.get("t1").unwrap();
        assert_eq!(t1.state, TargetState::Success);
        assert_eq!(t1.stdout, "ok");
    }

    #[test]
    fn test_terminal_states_never_regress() {
        let mock = MockTransport::new().script(
            "t1",
            [TargetState::InProgress, TargetState::Cancelled, TargetState::InProgress],
        );
        let clock = ManualClock::new();
        let poller = FixedIntervalPoller::new(&mock, &clock).with_interval(Duration::from_secs(1));
        let (handle, targets) = handle(&["t1"]);

        let report = poller.wait(&handle, &targets, Duration::from_secs(60));

        let t1 = report.get("t1").unwrap();
        assert_eq!(t1.state, TargetState::Cancelled);
        assert_eq!(
            t1.history,
            [TargetState::Pending, TargetState::InProgress, TargetState::Cancelled]
        );
    }

    #[test]
    fn test_interrupt_returns_partial_report() {
        let mock = MockTransport::new().script("t1", [TargetState::InProgress]);
        let clock = ManualClock::new();
        let interrupt = Interrupt::new();

        struct TripAfter<'a> {
            rounds: u32,
            interrupt: &'a Interrupt,
            seen: Cell<u32>,
        }
        impl PollProgress for TripAfter<'_> {
            fn on_round(&self, round: u32, _report: &BatchReport) {
                self.seen.set(round);
                if round == self.rounds {
                    self.interrupt.trigger();
                }
            }
        }
        let progress = TripAfter {
            rounds: 2,
            interrupt: &interrupt,
            seen: Cell::new(0),
        };

        let poller = FixedIntervalPoller::new(&mock, &clock)
            .with_interval(Duration::from_secs(10))
            .with_interrupt(interrupt.clone())
            .with_progress(&progress);
        let (handle, targets) = handle(&["t1"]);

        let report = poller.wait(&handle, &targets, Duration::from_secs(3600));

        assert!(report.interrupted);
        assert!(!report.timed_out);
        assert_eq!(report.rounds, 2);
        assert_eq!(progress.seen.get(), 2);
        assert_eq!(report.get("t1").unwrap().state, TargetState::InProgress);
    }
}

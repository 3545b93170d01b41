//! Progress indicators for remedy CLI.

use fleet::{BatchReport, PollProgress};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while waiting on a dispatch
pub struct WaitSpinner {
    pb: ProgressBar,
    total: usize,
}

impl WaitSpinner {
    pub fn new(total: usize, hidden: bool) -> Self {
        let pb = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {elapsed_precise} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("waiting on {total} target(s)"));
        pb.enable_steady_tick(Duration::from_millis(120));
        Self { pb, total }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl PollProgress for WaitSpinner {
    fn on_round(&self, round: u32, report: &BatchReport) {
        let done = self.total.saturating_sub(report.pending().len());
        self.pb
            .set_message(format!("round {round}: {done}/{} target(s) finished", self.total));
    }
}

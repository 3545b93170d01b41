//! # Control
//!
//! Compliance controls and the state machine that remediates them.
//!
//! Each control follows the same contract:
//!
//! ```text
//! detect ──compliant──▶ AlreadyCompliant
//!    │
//!  drift ──dry run──▶ WouldRemediate
//!    │
//! backup ──▶ apply ──ok──▶ verify ──ok──▶ Remediated
//!              │              │
//!             err           fail
//!              └──▶ rollback ◀┘ ──▶ Failed
//! ```
//!
//! ## Core Concepts
//!
//! - **Control**: one compliance rule (detect, apply, verify plus declared resources)
//! - **ControlUnit**: closure-based [`Control`] built from a descriptor
//! - **ExecutionContext**: dry-run flag, phase log, backup root, log level, interrupt flag
//! - **BackupStore**: timestamped `.bak` snapshots with restore-latest
//! - **Runner**: [`run`] for one control, [`run_all`] for an ordered group
//!
//! Nothing in this crate reads global state; everything a run needs is in
//! the [`ExecutionContext`].

pub mod backup;
pub mod context;
pub mod interrupt;
pub mod journal;
pub mod runner;
pub mod types;
pub mod unit;

// Re-export main types at crate root
pub use backup::{BackupError, BackupRecord, BackupStore};
pub use context::ExecutionContext;
pub use interrupt::Interrupt;
pub use journal::PhaseLog;
pub use runner::{FailurePolicy, GroupReport, Interrupted, UnitReport, run, run_all};
pub use types::{
    GroupSelector, LogLevel, MAX_GROUP, MIN_GROUP, Phase, RemediationOutcome, Severity,
};
pub use unit::{BoxedControl, Control, ControlId, ControlUnit, ControlUnitBuilder, Resource};

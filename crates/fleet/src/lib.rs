//! # fleet
//!
//! Fan a remediation batch out to many hosts, wait for it, and reduce the
//! per-host results to one answer.
//!
//! This crate provides:
//! - Validated dispatch requests (group selector, target set, options)
//! - A [`Transport`] boundary with an AWS SSM backend and a mock backend
//! - A [`Dispatcher`] that issues exactly one fan-out request
//! - A fixed-interval [`FixedIntervalPoller`] behind [`CompletionWatcher`]
//! - An [`aggregate`] step producing a bounded [`BatchSummary`]
//!
//! ## Example
//!
//! ```
//! use fleet::backend::mock::MockTransport;
//! use fleet::{
//!     aggregate, ArtifactSource, CompletionWatcher, Dispatcher, DispatchOptions,
//!     FixedIntervalPoller, ManualClock, TargetState,
//! };
//! use control::GroupSelector;
//! use std::time::Duration;
//!
//! let transport = MockTransport::new().script("i-0abc", [TargetState::Success]);
//! let options = DispatchOptions::new(ArtifactSource {
//!     bucket: "remedy-artifacts".into(),
//!     key_prefix: "catalog/".into(),
//! });
//!
//! let handle = Dispatcher::new(&transport)
//!     .dispatch(GroupSelector::Group(4), ["i-0abc"], options)
//!     .unwrap();
//!
//! let clock = ManualClock::new();
//! let report = FixedIntervalPoller::new(&transport, &clock)
//!     .wait(&handle, &handle.targets, Duration::from_secs(60));
//!
//! assert!(aggregate(&report).is_success());
//! ```

pub mod aggregate;
pub mod backend;
pub mod dispatch;
pub mod error;
pub mod poll;
pub mod types;

// Re-export main types at crate root
pub use aggregate::{BatchSummary, OverallStatus, TargetSummary, aggregate};
pub use backend::{SendRequest, Transport};
pub use dispatch::Dispatcher;
pub use error::{Error, ErrorCategory, Result, ValidationError};
pub use poll::{
    Clock, CompletionWatcher, FixedIntervalPoller, ManualClock, NoProgress, PollProgress,
    SystemClock,
};
pub use types::{
    ArtifactSource, BatchReport, CommandParameters, DispatchHandle, DispatchOptions,
    DispatchRequest, Invocation, TargetState, TargetStatus, TimeoutSource,
};

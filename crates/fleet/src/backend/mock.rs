//! Mock transport for testing.
//!
//! Records every request and serves scripted per-target responses, making it
//! easy to write deterministic tests for dispatch and polling.

use super::{SendRequest, Transport};
use crate::error::{Error, Result};
use crate::types::{Invocation, TargetState};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A scripted status response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Answer with this observation
    Reply(Invocation),
    /// Fail the status query
    QueryError(String),
}

impl From<TargetState> for MockResponse {
    fn from(state: TargetState) -> Self {
        Self::Reply(Invocation::new(state))
    }
}

impl From<Invocation> for MockResponse {
    fn from(invocation: Invocation) -> Self {
        Self::Reply(invocation)
    }
}

/// A test-double transport.
///
/// Each target plays its script one response per query; the last response
/// repeats once the script runs out. Unscripted targets stay `InProgress`.
#[derive(Debug)]
pub struct MockTransport {
    entry_point_known: bool,
    credentials_ok: bool,
    reject_send: Option<String>,
    scripts: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    sent: Mutex<Vec<SendRequest>>,
    queries: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            entry_point_known: true,
            credentials_ok: true,
            reject_send: None,
            scripts: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
        }
    }

    /// Pretend the entry point cannot be found.
    pub fn without_entry_point(mut self) -> Self {
        self.entry_point_known = false;
        self
    }

    /// Pretend the credential probe fails.
    pub fn without_credentials(mut self) -> Self {
        self.credentials_ok = false;
        self
    }

    /// Reject every send with `detail`.
    pub fn rejecting(mut self, detail: impl Into<String>) -> Self {
        self.reject_send = Some(detail.into());
        self
    }

    /// Script the responses for one target.
    pub fn script<I, R>(self, target: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<MockResponse>,
    {
        self.lock_scripts()
            .insert(target.to_string(), responses.into_iter().map(Into::into).collect());
        self
    }

    /// Requests sent so far.
    pub fn sent(&self) -> Vec<SendRequest> {
        match self.sent.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Status queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn lock_scripts(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<MockResponse>>> {
        match self.scripts.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn entry_point_exists(&self, _name: &str) -> Result<bool> {
        Ok(self.entry_point_known)
    }

    fn check_credentials(&self) -> Result<()> {
        if self.credentials_ok {
            Ok(())
        } else {
            Err(Error::Transport {
                message: "credential probe failed".into(),
                detail: "Unable to locate credentials".into(),
            })
        }
    }

    fn send(&self, request: &SendRequest) -> Result<String> {
        if let Some(detail) = &self.reject_send {
            return Err(Error::Transport {
                message: "send rejected".into(),
                detail: detail.clone(),
            });
        }
        let mut sent = match self.sent.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.push(request.clone());
        Ok(format!("mock-{}", sent.len()))
    }

    fn invocation(&self, _command_id: &str, target: &str) -> Result<Invocation> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let mut scripts = self.lock_scripts();
        let response = match scripts.get_mut(target) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().cloned(),
            None => None,
        };

        match response {
            Some(MockResponse::Reply(invocation)) => Ok(invocation),
            Some(MockResponse::QueryError(detail)) => Err(Error::Transport {
                message: format!("status query for {target} failed"),
                detail,
            }),
            None => Ok(Invocation::new(TargetState::InProgress)),
        }
    }
}

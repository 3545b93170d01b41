//! Target dispatcher: one fan-out request per batch, no waiting.

use crate::backend::{SendRequest, Transport};
use crate::error::Result;
use crate::types::{DispatchHandle, DispatchOptions, DispatchRequest};
use chrono::Utc;
use control::GroupSelector;

/// Submits remediation batches through a [`Transport`].
pub struct Dispatcher<'a> {
    transport: &'a dyn Transport,
}

impl<'a> Dispatcher<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Validate the inputs, then submit.
    ///
    /// Validation failures are returned before the transport is touched.
    pub fn dispatch<I, S>(
        &self,
        group: GroupSelector,
        targets: I,
        options: DispatchOptions,
    ) -> Result<DispatchHandle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = DispatchRequest::new(group, targets, options)?;
        self.submit(&request)
    }

    /// Submit an already validated request.
    ///
    /// Prerequisite checks only produce warnings. Exactly one send is issued
    /// and the handle comes back without any polling.
    pub fn submit(&self, request: &DispatchRequest) -> Result<DispatchHandle> {
        let options = request.options();
        let warnings = self.check_prerequisites(&options.entry_point);

        let send = SendRequest {
            entry_point: options.entry_point.clone(),
            targets: request.targets().to_vec(),
            parameters: request.parameters(),
            timeout: options.timeout,
            comment: format!("remedy group {}", request.group()),
        };

        log::info!(
            "dispatching group {} to {} target(s) via {}{}",
            request.group(),
            send.targets.len(),
            send.entry_point,
            if options.dry_run { " (dry run)" } else { "" }
        );

        let command_id = self.transport.send(&send).map_err(|e| e.into_dispatch())?;
        log::info!("dispatched command {command_id}");

        Ok(DispatchHandle {
            command_id,
            entry_point: send.entry_point,
            targets: send.targets,
            submitted_at: Utc::now(),
            warnings,
        })
    }

    fn check_prerequisites(&self, entry_point: &str) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.transport.entry_point_exists(entry_point) {
            Ok(true) => log::debug!("entry point {entry_point} found"),
            Ok(false) => warnings.push(format!(
                "entry point '{entry_point}' was not found; proceeding anyway"
            )),
            Err(e) => warnings.push(format!(
                "could not confirm entry point '{entry_point}': {e}"
            )),
        }

        if let Err(e) = self.transport.check_credentials() {
            warnings.push(format!("credential probe inconclusive: {e}"));
        }

        for warning in &warnings {
            log::warn!("{warning}");
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockTransport;
    use crate::error::{Error, ErrorCategory, ValidationError};
    use crate::types::ArtifactSource;

    fn options() -> DispatchOptions {
        DispatchOptions::new(ArtifactSource {
            bucket: "remedy-artifacts".into(),
            key_prefix: "catalog/".into(),
        })
    }

    #[test]
    fn test_single_send_for_all_targets() {
        let mock = MockTransport::new();
        let handle = Dispatcher::new(&mock)
            .dispatch(GroupSelector::Group(4), ["t1", "t2", "t1"], options())
            .unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].targets, ["t1", "t2"]);
        assert_eq!(sent[0].parameters.to_map()["Group"], ["4"]);
        assert_eq!(handle.command_id, "mock-1");
        assert_eq!(handle.targets, ["t1", "t2"]);
        assert!(handle.warnings.is_empty());
        assert_eq!(mock.query_count(), 0);
    }

    #[test]
    fn test_empty_targets_never_reach_transport() {
        let mock = MockTransport::new();
        let empty: Vec<String> = Vec::new();
        let err = Dispatcher::new(&mock)
            .dispatch(GroupSelector::Group(4), empty, options())
            .unwrap_err();

        assert!(matches!(err, Error::Validation(ValidationError::EmptyTargets)));
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn test_missing_prerequisites_are_warnings() {
        let mock = MockTransport::new().without_entry_point().without_credentials();
        let handle = Dispatcher::new(&mock)
            .dispatch(GroupSelector::All, ["t1"], options())
            .unwrap();

        assert_eq!(handle.warnings.len(), 2);
        assert!(handle.warnings[0].contains("Remedy-RunControls"));
        assert!(handle.warnings[1].starts_with("credential probe inconclusive"));
        assert_eq!(mock.sent().len(), 1);
    }

    #[test]
    fn test_rejected_send_is_dispatch_error() {
        let mock = MockTransport::new().rejecting("InvalidInstanceId: t9");
        let err = Dispatcher::new(&mock)
            .dispatch(GroupSelector::All, ["t9"], options())
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Dispatch);
        assert_eq!(err.detail(), Some("InvalidInstanceId: t9"));
    }
}

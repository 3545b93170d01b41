//! Control unit model
//!
//! A control is one compliance rule. It declares the resources its fix will
//! touch and provides three behaviors:
//! - `detect` - read-only; reports whether drift exists
//! - `apply` - the fix
//! - `verify` - read-only; confirms the fix took effect
//!
//! Backup and rollback are not part of a control: the runner derives them
//! from the declared resources.
//!
//! # Example
//!
//! ```
//! use control::{Control, ControlUnit, Resource, Severity};
//!
//! let unit = ControlUnit::builder("1.1.1.1", "Ensure cramfs is disabled")
//!     .severity(Severity::Medium)
//!     .group(1)
//!     .resource(Resource::new("cramfs.conf", "/etc/modprobe.d/cramfs.conf"))
//!     .detect(|_ctx| Ok(true))
//!     .apply(|_ctx| Ok(()))
//!     .verify(|_ctx| Ok(true))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(unit.id().as_str(), "1.1.1.1");
//! ```

use crate::context::ExecutionContext;
use crate::types::{MAX_GROUP, MIN_GROUP, Severity};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable control identifier such as `4.1.10`
///
/// Ordering compares dot-separated segments numerically where both segments
/// are numbers, so `4.1.2` sorts before `4.1.10`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(String);

impl ControlId {
    /// Create an identifier, rejecting empty or whitespace-containing input
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            bail!("invalid control id: '{id}'");
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for ControlId {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut a = self.0.split('.');
        let mut b = other.0.split('.');
        loop {
            match (a.next(), b.next()) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(x), Some(y)) => {
                    let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                        (Ok(n), Ok(m)) => n.cmp(&m).then_with(|| x.cmp(y)),
                        _ => x.cmp(y),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
            }
        }
    }
}

impl PartialOrd for ControlId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resource a control's fix may mutate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Logical name used for backup file naming
    pub name: String,
    /// Live location on the host
    pub path: PathBuf,
}

impl Resource {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
        }
    }
}

/// Core trait for compliance controls
///
/// `detect` and `verify` must be read-only. `apply` is only ever called after
/// `detect` reported drift and after every declared resource was snapshotted.
pub trait Control: Send + Sync + fmt::Debug {
    /// Unique, stable identifier
    fn id(&self) -> &ControlId;

    /// Human-readable title
    fn title(&self) -> &str;

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    /// Group this control belongs to (1..=6)
    fn group(&self) -> u8;

    /// Resources `apply` may touch
    fn resources(&self) -> &[Resource];

    /// Returns `true` when the host is out of compliance
    fn detect(&self, ctx: &ExecutionContext) -> Result<bool>;

    /// Bring the host into compliance
    fn apply(&self, ctx: &ExecutionContext) -> Result<()>;

    /// Returns `true` when the host is compliant after `apply`
    fn verify(&self, ctx: &ExecutionContext) -> Result<bool>;
}

/// A boxed control for type-erased storage
pub type BoxedControl = Box<dyn Control>;

type DetectFn = Box<dyn Fn(&ExecutionContext) -> Result<bool> + Send + Sync>;
type ApplyFn = Box<dyn Fn(&ExecutionContext) -> Result<()> + Send + Sync>;

/// Declarative control: metadata plus injected behaviors
pub struct ControlUnit {
    id: ControlId,
    title: String,
    severity: Severity,
    group: u8,
    resources: Vec<Resource>,
    detect: DetectFn,
    apply: ApplyFn,
    verify: DetectFn,
}

impl ControlUnit {
    /// Start building a control
    pub fn builder(id: impl Into<String>, title: impl Into<String>) -> ControlUnitBuilder {
        ControlUnitBuilder {
            id: id.into(),
            title: title.into(),
            severity: Severity::default(),
            group: None,
            resources: Vec::new(),
            detect: None,
            apply: None,
            verify: None,
        }
    }
}

impl fmt::Debug for ControlUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlUnit")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("severity", &self.severity)
            .field("group", &self.group)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

impl Control for ControlUnit {
    fn id(&self) -> &ControlId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn group(&self) -> u8 {
        self.group
    }

    fn resources(&self) -> &[Resource] {
        &self.resources
    }

    fn detect(&self, ctx: &ExecutionContext) -> Result<bool> {
        (self.detect)(ctx)
    }

    fn apply(&self, ctx: &ExecutionContext) -> Result<()> {
        (self.apply)(ctx)
    }

    fn verify(&self, ctx: &ExecutionContext) -> Result<bool> {
        (self.verify)(ctx)
    }
}

/// Builder for [`ControlUnit`]
pub struct ControlUnitBuilder {
    id: String,
    title: String,
    severity: Severity,
    group: Option<u8>,
    resources: Vec<Resource>,
    detect: Option<DetectFn>,
    apply: Option<ApplyFn>,
    verify: Option<DetectFn>,
}

impl ControlUnitBuilder {
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn group(mut self, group: u8) -> Self {
        self.group = Some(group);
        self
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn resources(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
        self.resources.extend(resources);
        self
    }

    /// Drift detector: `Ok(true)` means a fix is needed
    pub fn detect<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<bool> + Send + Sync + 'static,
    {
        self.detect = Some(Box::new(f));
        self
    }

    pub fn apply<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<()> + Send + Sync + 'static,
    {
        self.apply = Some(Box::new(f));
        self
    }

    /// Post-fix check: `Ok(true)` means compliant
    pub fn verify<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<bool> + Send + Sync + 'static,
    {
        self.verify = Some(Box::new(f));
        self
    }

    /// Validate and finish
    pub fn build(self) -> Result<ControlUnit> {
        let id = ControlId::new(self.id)?;

        let Some(group) = self.group else {
            bail!("control {id}: group is required");
        };
        if !(MIN_GROUP..=MAX_GROUP).contains(&group) {
            bail!("control {id}: group {group} is outside {MIN_GROUP}..{MAX_GROUP}");
        }

        let mut seen = std::collections::HashSet::new();
        for r in &self.resources {
            if !seen.insert(r.name.as_str()) {
                bail!("control {id}: resource '{}' declared twice", r.name);
            }
        }

        let (Some(detect), Some(apply), Some(verify)) = (self.detect, self.apply, self.verify)
        else {
            bail!("control {id}: detect, apply and verify are all required");
        };

        Ok(ControlUnit {
            id,
            title: self.title,
            severity: self.severity,
            group,
            resources: self.resources,
            detect,
            apply,
            verify,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ControlId {
        ControlId::new(s).unwrap()
    }

    #[test]
    fn test_control_id_numeric_order() {
        assert!(id("4.1.2") < id("4.1.10"));
        assert!(id("1.9") < id("2.1"));
        assert!(id("4.1") < id("4.1.1"));
        assert!(id("5.a") < id("5.b"));
        assert_eq!(id("3.2.1").cmp(&id("3.2.1")), Ordering::Equal);

        let mut ids = vec![id("4.1.10"), id("1.1.1.1"), id("4.1.2"), id("4.1.1")];
        ids.sort();
        let sorted: Vec<_> = ids.iter().map(ControlId::as_str).collect();
        assert_eq!(sorted, ["1.1.1.1", "4.1.1", "4.1.2", "4.1.10"]);
    }

    #[test]
    fn test_control_id_rejects_blank() {
        assert!(ControlId::new("").is_err());
        assert!(ControlId::new("4 .1").is_err());
    }

    #[test]
    fn test_builder_requires_behaviors_and_group() {
        let missing_verify = ControlUnit::builder("1.1", "x")
            .group(1)
            .detect(|_| Ok(false))
            .apply(|_| Ok(()))
            .build();
        assert!(missing_verify.is_err());

        let bad_group = ControlUnit::builder("1.1", "x")
            .group(9)
            .detect(|_| Ok(false))
            .apply(|_| Ok(()))
            .verify(|_| Ok(true))
            .build();
        assert!(bad_group.is_err());
    }

    #[test]
    fn test_builder_rejects_duplicate_resources() {
        let result = ControlUnit::builder("1.1", "x")
            .group(1)
            .resource(Resource::new("a", "/tmp/a"))
            .resource(Resource::new("a", "/tmp/b"))
            .detect(|_| Ok(false))
            .apply(|_| Ok(()))
            .verify(|_| Ok(true))
            .build();
        assert!(result.is_err());
    }
}

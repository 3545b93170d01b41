//! Control catalog
//!
//! A catalog is a TOML file of `[[control]]` tables. Each control's checks
//! and fix are shell snippets run with `sh -c`; exit status 0 of `detect`
//! or `verify` means compliant.
//!
//! ```toml
//! [[control]]
//! id = "1.1.1.1"
//! title = "Ensure cramfs kernel module is not available"
//! severity = "medium"
//! group = 1
//! resources = [{ name = "cramfs.conf", path = "/etc/modprobe.d/cramfs.conf" }]
//! detect = "grep -q '^install cramfs /bin/false' /etc/modprobe.d/cramfs.conf"
//! apply = "echo 'install cramfs /bin/false' > /etc/modprobe.d/cramfs.conf"
//! ```

use crate::{paths, runner};
use anyhow::{Context, Result, bail};
use control::{ControlId, ControlUnit, MAX_GROUP, MIN_GROUP, Resource, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "control", default)]
    pub controls: Vec<ControlSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlSpec {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub severity: Severity,
    pub group: u8,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    /// Exit 0 means compliant
    pub detect: String,
    pub apply: String,
    /// Defaults to `detect`
    #[serde(default)]
    pub verify: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    pub name: String,
    /// `~` and `$VARS` are expanded
    pub path: String,
}

impl Catalog {
    /// Load and validate a catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read catalog {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid catalog {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let catalog: Self = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.controls {
            ControlId::new(spec.id.as_str())?;
            if !seen.insert(spec.id.as_str()) {
                bail!("duplicate control id '{}'", spec.id);
            }
            if !(MIN_GROUP..=MAX_GROUP).contains(&spec.group) {
                bail!(
                    "control {}: group {} is outside {}..{}",
                    spec.id,
                    spec.group,
                    MIN_GROUP,
                    MAX_GROUP
                );
            }
        }
        Ok(())
    }
}

impl ControlSpec {
    pub fn control_id(&self) -> Result<ControlId> {
        ControlId::new(self.id.as_str())
    }

    /// Build a runnable control whose behaviors shell out
    pub fn to_unit(&self) -> Result<ControlUnit> {
        let detect = self.detect.clone();
        let apply = self.apply.clone();
        let verify = self.verify.clone().unwrap_or_else(|| self.detect.clone());

        ControlUnit::builder(self.id.as_str(), self.title.as_str())
            .severity(self.severity)
            .group(self.group)
            .resources(
                self.resources
                    .iter()
                    .map(|r| Resource::new(r.name.as_str(), paths::expand(&r.path))),
            )
            .detect(move |_ctx| Ok(!runner::shell_succeeds(&detect)?))
            .apply(move |_ctx| runner::shell_checked(&apply).map(|_| ()))
            .verify(move |_ctx| runner::shell_succeeds(&verify))
            .build()
    }
}

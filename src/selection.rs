//! Rule selection
//!
//! A rules file holds one glob pattern per line (`4.1.*`, `5.2.?`). Blank
//! lines and `#` comments are ignored. Selection intersects the catalog with
//! the group selector and the patterns, then orders by control id.

use crate::catalog::{Catalog, ControlSpec};
use anyhow::{Context, Result};
use control::GroupSelector;
use regex::Regex;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct RuleSet {
    patterns: Vec<(String, Regex)>,
}

impl RuleSet {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read rules file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut patterns = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let regex = Regex::new(&glob_to_regex(line))
                .with_context(|| format!("Invalid rule pattern '{line}'"))?;
            patterns.push((line.to_string(), regex));
        }
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, id: &str) -> bool {
        self.patterns.iter().any(|(_, re)| re.is_match(id))
    }

    /// Patterns that matched none of `ids`
    pub fn unmatched<'a>(&'a self, ids: &[&str]) -> Vec<&'a str> {
        self.patterns
            .iter()
            .filter(|(_, re)| !ids.iter().any(|id| re.is_match(id)))
            .map(|(p, _)| p.as_str())
            .collect()
    }
}

/// Translate a glob into an anchored regex. Only `*` and `?` are special.
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Resolve the ordered list of controls to run.
///
/// Without a rule set every control in the group is selected.
pub fn select<'a>(
    catalog: &'a Catalog,
    group: GroupSelector,
    rules: Option<&RuleSet>,
) -> Result<Vec<&'a ControlSpec>> {
    let mut selected = Vec::new();
    for spec in &catalog.controls {
        if !group.matches(spec.group) {
            continue;
        }
        if rules.is_some_and(|r| !r.matches(&spec.id)) {
            continue;
        }
        selected.push((spec.control_id()?, spec));
    }

    selected.sort_by(|a, b| a.0.cmp(&b.0));
    selected.dedup_by(|a, b| a.0 == b.0);
    Ok(selected.into_iter().map(|(_, spec)| spec).collect())
}

// Target-side commands
pub mod backups;
pub mod list;
pub mod run;

// Orchestrator
pub mod dispatch;

use crate::catalog::Catalog;
use crate::cli::SelectionArgs;
use crate::paths;
use crate::selection::RuleSet;
use anyhow::Result;

/// How a command finished; maps onto the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failed,
    Interrupted,
}

impl Status {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failed => 1,
            Self::Interrupted => crate::signal::EXIT_INTERRUPTED,
        }
    }
}

/// Load the catalog and optional rules file named by the selection flags
pub fn load_selection(args: &SelectionArgs) -> Result<(Catalog, Option<RuleSet>)> {
    let catalog_path = paths::resolve(args.catalog.as_deref(), paths::catalog_file)?;
    log::debug!("catalog: {}", catalog_path.display());
    let catalog = Catalog::load(&catalog_path)?;

    let rules = match &args.rules {
        Some(path) => {
            let rules = RuleSet::load(&paths::expand(path))?;
            if rules.is_empty() {
                log::warn!("rules file {path} has no patterns; nothing will match");
            }
            Some(rules)
        }
        None => None,
    };

    Ok((catalog, rules))
}

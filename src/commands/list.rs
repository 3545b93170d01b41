//! `remedy list` - show the resolved control list without running it

use anyhow::{Result, anyhow};
use colored::Colorize;
use control::GroupSelector;

use super::{Status, load_selection};
use crate::cli::ListArgs;
use crate::{selection, ui};

pub fn run(args: ListArgs) -> Result<Status> {
    let group: GroupSelector = args.group.parse().map_err(|e: String| anyhow!(e))?;
    let (catalog, rules) = load_selection(&args.selection)?;
    let selected = selection::select(&catalog, group, rules.as_ref())?;

    ui::header(&format!("Controls for group {group}"));
    for spec in &selected {
        println!(
            "  {:<12} {}  {:<8} {}",
            spec.id,
            format!("g{}", spec.group).dimmed(),
            spec.severity.to_string(),
            spec.title
        );
        if !spec.resources.is_empty() {
            let names: Vec<&str> = spec.resources.iter().map(|r| r.name.as_str()).collect();
            ui::dim(&format!("touches: {}", names.join(", ")));
        }
    }

    println!();
    ui::kv("Selected", &format!("{} of {}", selected.len(), catalog.controls.len()));

    if let Some(rules) = &rules {
        let ids: Vec<&str> = catalog.controls.iter().map(|c| c.id.as_str()).collect();
        for pattern in rules.unmatched(&ids) {
            ui::warn(&format!("Pattern '{pattern}' matches no control"));
        }
    }

    Ok(Status::Success)
}

//! `remedy backups` - list snapshots taken for one resource

use anyhow::Result;
use control::BackupStore;

use super::Status;
use crate::cli::BackupsArgs;
use crate::{paths, ui};

pub fn run(args: BackupsArgs) -> Result<Status> {
    let root = paths::resolve(args.backup_dir.as_deref(), paths::backup_dir)?;
    let store = BackupStore::new(root);
    let records = store.list(&args.name)?;

    ui::header(&format!("Backups of {}", args.name));
    ui::kv("Root", &store.root().display().to_string());
    println!();

    if records.is_empty() {
        ui::info("No backups found");
        return Ok(Status::Success);
    }

    for record in &records {
        let digest = record.digest.get(..12).unwrap_or(&record.digest);
        println!(
            "  {}  {:>9}  {}  {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            ui::format_size(record.size),
            digest,
            record.location.display()
        );
    }

    println!();
    ui::kv("Total", &records.len().to_string());
    Ok(Status::Success)
}

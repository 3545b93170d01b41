//! Backup store - content snapshots of resources about to be mutated
//!
//! Backups live flat under a root directory and are named
//! `<logical_name>.<YYYYMMDD_HHMMSS>.bak`. A second backup of the same
//! logical name within the same second gets a sequence suffix
//! (`<logical_name>.<YYYYMMDD_HHMMSS>-1.bak`, `-2`, ...) so nothing is ever
//! overwritten. The store never deletes backups; retention is up to the caller.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Timestamp layout used in backup file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const EXTENSION: &str = "bak";

/// Errors raised by the backup store
#[derive(Debug, Error)]
pub enum BackupError {
    /// Logical name is empty or contains characters unsafe in a file name
    #[error("invalid logical name: '{0}'")]
    InvalidName(String),

    /// Only regular files can be snapshotted
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    /// Restored content does not match the snapshot
    #[error("restore of {path} produced content that differs from backup {backup}")]
    DigestMismatch { path: PathBuf, backup: PathBuf },

    /// IO error with the path that caused it
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

impl BackupError {
    fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for backup operations
pub type Result<T> = std::result::Result<T, BackupError>;

/// One stored snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Logical resource name the snapshot belongs to
    pub logical_name: String,
    /// When the snapshot was taken (second granularity)
    pub timestamp: NaiveDateTime,
    /// Disambiguator for snapshots taken within the same second
    pub sequence: u32,
    /// Where the snapshot content is stored
    pub location: PathBuf,
    /// blake3 digest of the stored content
    pub digest: String,
    /// Size of the stored content in bytes
    pub size: u64,
}

impl BackupRecord {
    /// Build a record from an existing backup file
    fn from_file(
        logical_name: &str,
        timestamp: NaiveDateTime,
        sequence: u32,
        path: &Path,
    ) -> Result<Self> {
        let content =
            fs::read(path).map_err(|e| BackupError::io("Failed to read backup", path, e))?;
        Ok(Self {
            logical_name: logical_name.to_string(),
            timestamp,
            sequence,
            location: path.to_path_buf(),
            digest: blake3::hash(&content).to_hex().to_string(),
            size: content.len() as u64,
        })
    }
}

/// Flat directory of `.bak` snapshots
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    /// Create a store rooted at `root` (created lazily on first backup)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Backup root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot the current content of `live` under `logical_name`
    ///
    /// Returns `Ok(None)` when the live resource does not exist, since there
    /// is nothing to preserve.
    pub fn create(&self, logical_name: &str, live: &Path) -> Result<Option<BackupRecord>> {
        self.create_at(logical_name, live, Utc::now())
    }

    /// Snapshot with an explicit timestamp
    pub fn create_at(
        &self,
        logical_name: &str,
        live: &Path,
        at: DateTime<Utc>,
    ) -> Result<Option<BackupRecord>> {
        validate_name(logical_name)?;

        if !live.exists() {
            log::debug!("Nothing to back up for {}: {} is absent", logical_name, live.display());
            return Ok(None);
        }
        if !live.is_file() {
            return Err(BackupError::NotAFile(live.to_path_buf()));
        }

        fs::create_dir_all(&self.root)
            .map_err(|e| BackupError::io("Failed to create backup directory", &self.root, e))?;

        let content = fs::read(live).map_err(|e| BackupError::io("Failed to read", live, e))?;
        let timestamp = at.naive_utc().with_nanosecond(0).unwrap_or(at.naive_utc());

        let mut sequence = 0u32;
        let (location, mut file) = loop {
            let candidate = self.root.join(file_name(logical_name, &timestamp, sequence));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(file) => break (candidate, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => sequence += 1,
                Err(e) => return Err(BackupError::io("Failed to create backup", &candidate, e)),
            }
        };

        file.write_all(&content)
            .and_then(|()| file.sync_all())
            .map_err(|e| BackupError::io("Failed to write backup", &location, e))?;

        if let Ok(meta) = fs::metadata(live) {
            let _ = fs::set_permissions(&location, meta.permissions());
        }

        log::debug!("Backed up {} to {}", live.display(), location.display());

        Ok(Some(BackupRecord {
            logical_name: logical_name.to_string(),
            timestamp,
            sequence,
            location,
            digest: blake3::hash(&content).to_hex().to_string(),
            size: content.len() as u64,
        }))
    }

    /// Backup files of `logical_name` as `(timestamp, sequence, path)`,
    /// unordered. Only file names are inspected.
    fn entries(&self, logical_name: &str) -> Result<Vec<(NaiveDateTime, u32, PathBuf)>> {
        validate_name(logical_name)?;

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::io("Failed to read backup directory", &self.root, e)),
        };

        let mut found = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some((logical, timestamp, sequence)) = parse_file_name(name)
                && logical == logical_name
            {
                found.push((timestamp, sequence, entry.path()));
            }
        }
        Ok(found)
    }

    /// All snapshots of `logical_name`, oldest first
    pub fn list(&self, logical_name: &str) -> Result<Vec<BackupRecord>> {
        let mut found = self.entries(logical_name)?;
        found.sort_by_key(|(timestamp, sequence, _)| (*timestamp, *sequence));
        found
            .iter()
            .map(|(timestamp, sequence, path)| {
                BackupRecord::from_file(logical_name, *timestamp, *sequence, path)
            })
            .collect()
    }

    /// Most recent snapshot of `logical_name`, if any
    ///
    /// Older snapshots are never opened.
    pub fn latest(&self, logical_name: &str) -> Result<Option<BackupRecord>> {
        self.entries(logical_name)?
            .into_iter()
            .max_by_key(|(timestamp, sequence, _)| (*timestamp, *sequence))
            .map(|(timestamp, sequence, path)| {
                BackupRecord::from_file(logical_name, timestamp, sequence, &path)
            })
            .transpose()
    }

    /// Overwrite `live` with the most recent snapshot of `logical_name`
    ///
    /// A missing live resource or a missing backup is a logged no-op and
    /// returns `Ok(None)`. On success returns the backup that was restored.
    pub fn restore(&self, logical_name: &str, live: &Path) -> Result<Option<PathBuf>> {
        let Some(record) = self.latest(logical_name)? else {
            log::warn!("No backup of {} found in {}", logical_name, self.root.display());
            return Ok(None);
        };
        if !live.exists() {
            log::warn!(
                "Cannot restore {}: live resource {} is missing",
                logical_name,
                live.display()
            );
            return Ok(None);
        }

        let content = fs::read(&record.location)
            .map_err(|e| BackupError::io("Failed to read backup", &record.location, e))?;
        fs::write(live, &content).map_err(|e| BackupError::io("Failed to restore", live, e))?;

        let written = fs::read(live).map_err(|e| BackupError::io("Failed to read", live, e))?;
        if blake3::hash(&written).to_hex().as_str() != record.digest {
            return Err(BackupError::DigestMismatch {
                path: live.to_path_buf(),
                backup: record.location,
            });
        }

        log::debug!("Restored {} from {}", live.display(), record.location.display());
        Ok(Some(record.location))
    }
}

/// Check that a logical name is usable as a file name prefix
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | '@'));
    if valid {
        Ok(())
    } else {
        Err(BackupError::InvalidName(name.to_string()))
    }
}

fn file_name(logical_name: &str, timestamp: &NaiveDateTime, sequence: u32) -> String {
    let stamp = timestamp.format(TIMESTAMP_FORMAT);
    if sequence == 0 {
        format!("{logical_name}.{stamp}.{EXTENSION}")
    } else {
        format!("{logical_name}.{stamp}-{sequence}.{EXTENSION}")
    }
}

/// Split `<logical>.<stamp>[-<seq>].bak` into its parts
fn parse_file_name(name: &str) -> Option<(&str, NaiveDateTime, u32)> {
    let stem = name.strip_suffix(EXTENSION)?.strip_suffix('.')?;
    let (logical, stamp) = stem.rsplit_once('.')?;
    let (stamp, sequence) = match stamp.split_once('-') {
        Some((stamp, seq)) => (stamp, seq.parse().ok()?),
        None => (stamp, 0),
    };
    let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    if logical.is_empty() {
        return None;
    }
    Some((logical, timestamp, sequence))
}

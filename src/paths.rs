//! Centralized path resolution for remedy
//!
//! # Environment Variables
//!
//! - `REMEDY_CONFIG_DIR` - Override config directory
//! - `REMEDY_STATE_DIR` - Override state directory (phase log, backups)
//! - `REMEDY_LOG_FILE` - Override the phase log file
//! - `REMEDY_BACKUP_DIR` - Override the backup root
//! - `REMEDY_CATALOG` - Override the control catalog file
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `REMEDY_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/remedy` (if set)
//! 3. `~/.config/remedy`
//!
//! For state_dir():
//! 1. `REMEDY_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/remedy` (if set)
//! 3. `~/.local/state/remedy`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "REMEDY_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "REMEDY_STATE_DIR";

/// Environment variable for the phase log file
pub const ENV_LOG_FILE: &str = "REMEDY_LOG_FILE";

/// Environment variable for the backup root
pub const ENV_BACKUP_DIR: &str = "REMEDY_BACKUP_DIR";

/// Environment variable for the catalog file
pub const ENV_CATALOG: &str = "REMEDY_CATALOG";

/// Get the remedy config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("remedy");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("remedy");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the remedy state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("remedy");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("remedy");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Phase log file: `REMEDY_LOG_FILE`, else `<state_dir>/remedy.log`
pub fn log_file() -> Result<PathBuf> {
    override_or(ENV_LOG_FILE, || Ok(state_dir()?.join("remedy.log")))
}

/// Backup root: `REMEDY_BACKUP_DIR`, else `<state_dir>/backups`
pub fn backup_dir() -> Result<PathBuf> {
    override_or(ENV_BACKUP_DIR, || Ok(state_dir()?.join("backups")))
}

/// Catalog file: `REMEDY_CATALOG`, else `<config_dir>/catalog.toml`
pub fn catalog_file() -> Result<PathBuf> {
    override_or(ENV_CATALOG, || Ok(config_dir()?.join("catalog.toml")))
}

/// An explicit CLI path wins; otherwise resolve the default.
pub fn resolve(explicit: Option<&str>, default: fn() -> Result<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(path)),
        None => default(),
    }
}

fn override_or(var: &str, default: impl FnOnce() -> Result<PathBuf>) -> Result<PathBuf> {
    if let Ok(value) = std::env::var(var) {
        let path = expand(&value);
        log::debug!("Using {} from environment: {}", var, path.display());
        return Ok(path);
    }
    default()
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

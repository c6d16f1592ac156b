//! Command implementations for the Forge CLI.

pub mod cluster;
pub mod datasets;
pub mod demo;
pub mod models;
pub mod runs;

use anyhow::{Context, Result};
use forge_core::{ForgeConfig, Platform};

/// Opens the platform against the configured database file.
pub fn open_platform(config: ForgeConfig) -> Result<Platform> {
    let db_path = config.storage.db_path.clone();
    Platform::open(config).with_context(|| format!("Failed to open database at {db_path}"))
}

/// Shortens an identifier-like value for table output.
pub fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut short: String = value.chars().take(width.saturating_sub(1)).collect();
    short.push('…');
    short
}

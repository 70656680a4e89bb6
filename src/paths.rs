//! Single source of truth for the on-disk layout.
//!
//! This module defines WHERE the catalog lives. It has no I/O besides the
//! directory creation helper and no business logic.
//!
//! ```text
//! <user-config>/KnobKraft/
//! ├── SysexDatabaseOfAllPatches.db3            # the catalog
//! ├── SysexDatabaseOfAllPatches-backup.db3     # rolling close backup
//! └── SysexDatabaseOfAllPatches-before-migration.db3
//! ```
//!
//! Backups always live beside the database they were taken from; a numeric
//! disambiguator (`-backup_2`, `-backup_3`, ...) is appended when the plain
//! name is taken.

use std::path::PathBuf;

/// File name of the catalog database.
pub const DATABASE_FILE_NAME: &str = "SysexDatabaseOfAllPatches.db3";

/// Suffix of the rolling backup taken when a read-write database closes.
pub const BACKUP_SUFFIX: &str = "-backup";

/// Suffix of the safety copy taken before the first migration of a session.
pub const MIGRATION_BACKUP_SUFFIX: &str = "-before-migration";

/// Application directory under the per-user config location.
pub fn app_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("KnobKraft")
}

/// Default catalog location, directory created on demand.
pub fn default_database_location() -> std::io::Result<PathBuf> {
    let dir = app_config_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir.join(DATABASE_FILE_NAME))
}

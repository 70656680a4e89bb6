//! Database backups.
//!
//! Every backup goes through SQLite's online backup facility so the copy
//! is a consistent snapshot even while the source connection is live; the
//! database file itself is never copied. Pruning of old backups is a pure
//! decision over `(path, size, mtime)` tuples so it can be tested without
//! touching a disk.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};

use crate::error::DatabaseResult;

/// Keep at most this many bytes of backups, except that the newest three
/// are always kept.
const MAX_TOTAL_BACKUP_BYTES: u64 = 500_000_000;

/// Copy the live database into `dest` via the online backup API.
pub(crate) fn online_backup(source: &Connection, dest: &Path) -> rusqlite::Result<()> {
    let mut target = Connection::open(dest)?;
    let backup = Backup::new(source, &mut target)?;
    backup.run_to_completion(100, Duration::from_millis(250), None)
}

/// Copy any database file into a named destination. The source is opened
/// read-only; nothing else needs to hold it.
pub fn export_database(source: &Path, dest: &Path) -> DatabaseResult<()> {
    let source_conn =
        Connection::open_with_flags(source, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    online_backup(&source_conn, dest)?;
    Ok(())
}

/// First nonexistent sibling of `db_path` named `<stem><suffix>[_n].<ext>`.
pub(crate) fn nonexistent_sibling(db_path: &Path, suffix: &str) -> PathBuf {
    let stem = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = db_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let dir = db_path.parent().unwrap_or_else(|| Path::new("."));

    let plain = dir.join(format!("{}{}{}", stem, suffix, ext));
    if !plain.exists() {
        return plain;
    }
    let mut n = 2;
    loop {
        let candidate = dir.join(format!("{}{}_{}{}", stem, suffix, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// One backup file on disk, as seen by the pruning policy.
#[derive(Debug, Clone)]
pub(crate) struct BackupCandidate {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Decide which backups to delete: newest first, a file is kept while
/// fewer than three are kept or the running total stays within the size
/// budget.
pub(crate) fn prune_plan(mut candidates: Vec<BackupCandidate>) -> Vec<PathBuf> {
    candidates.sort_by(|a, b| b.modified.cmp(&a.modified));
    let mut total: u64 = 0;
    let mut kept: usize = 0;
    let mut doomed = Vec::new();
    for candidate in candidates {
        total += candidate.size;
        if total > MAX_TOTAL_BACKUP_BYTES && kept > 2 {
            doomed.push(candidate.path);
        } else {
            kept += 1;
        }
    }
    doomed
}

/// All backup files of `db_path` with the given suffix.
pub(crate) fn list_backups(db_path: &Path, suffix: &str) -> Vec<BackupCandidate> {
    let stem = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = db_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = format!("{}{}", stem, suffix);
    let dir = match db_path.parent() {
        Some(dir) => dir,
        None => return Vec::new(),
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut result = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let matches_ext = path
            .extension()
            .map(|e| e.to_string_lossy() == ext)
            .unwrap_or(ext.is_empty());
        if name.starts_with(&prefix) && matches_ext {
            if let Ok(meta) = entry.metadata() {
                result.push(BackupCandidate {
                    path,
                    size: meta.len(),
                    modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                });
            }
        }
    }
    result
}

/// Delete backups beyond the retention policy. Deletion failures are
/// logged and tolerated.
pub(crate) fn prune_backups(db_path: &Path, suffix: &str) {
    let candidates = list_backups(db_path, suffix);
    let before = candidates.len();
    let doomed = prune_plan(candidates);
    if doomed.is_empty() {
        return;
    }
    log::info!(
        "Removing {} of {} database backups to limit disk usage",
        doomed.len(),
        before
    );
    for path in doomed {
        if let Err(e) = std::fs::remove_file(&path) {
            log::error!(
                "Failed to remove backup file {}, please check file permissions: {}",
                path.display(),
                e
            );
        }
    }
}

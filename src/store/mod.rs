//! The patch store: a single SQLite file holding the whole catalog.
//!
//! `PatchDatabase` owns the writer connection. It is single-writer by
//! construction; concurrent reads go through [`crate::facade`], which opens
//! its own read-only connections. The category map is process-wide state
//! guarded by a mutex and refreshed inside that critical section whenever
//! category definitions change.

pub mod backup;
pub mod categories;
pub mod imports;
pub mod lists;
pub mod patches;
pub mod query;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, ErrorCode, OpenFlags};

use crate::category::{CategoryBitfield, CategoryDefinition};
use crate::error::{DatabaseError, DatabaseResult};
use crate::paths;

pub use backup::export_database;

/// How to open a catalog file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    /// Read-write, but without automatic backups (open-time pruning, the
    /// pre-migration snapshot, and the rolling close backup are all
    /// skipped). Explicit backup calls still work.
    ReadWriteNoBackups,
}

impl OpenMode {
    fn writable(self) -> bool {
        self != OpenMode::ReadOnly
    }

    fn automatic_backups(self) -> bool {
        self == OpenMode::ReadWrite
    }
}

/// Cached category definitions plus the active bitfield built from them.
/// Refreshed as one unit inside the category critical section.
pub(crate) struct CategoryState {
    pub definitions: Vec<CategoryDefinition>,
    pub bitfield: CategoryBitfield,
}

/// The catalog engine handle.
pub struct PatchDatabase {
    conn: Connection,
    path: PathBuf,
    mode: OpenMode,
    pub(crate) categories: Mutex<CategoryState>,
}

impl PatchDatabase {
    /// Open the catalog at its default per-user location, read-write.
    pub fn open_default() -> DatabaseResult<Self> {
        let location = paths::default_database_location()?;
        Self::open(&location, OpenMode::ReadWrite)
    }

    /// Open (or create, in a writable mode) a catalog file.
    ///
    /// Ensures all tables exist, migrates old schema versions forward, and
    /// prunes stale backups. Fails with [`DatabaseError::SchemaFuture`]
    /// when the file was written by a newer release and with
    /// [`DatabaseError::ReadOnly`] when a needed migration cannot be
    /// applied to a read-only file.
    pub fn open(path: &Path, mode: OpenMode) -> DatabaseResult<Self> {
        let conn = match mode {
            OpenMode::ReadOnly => {
                Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?
            }
            _ => Connection::open(path)?,
        };

        schema::create_tables(&conn).map_err(|e| map_readonly(path, e))?;

        match schema::read_version(&conn) {
            Ok(Some(version)) if version > schema::SCHEMA_VERSION => {
                return Err(DatabaseError::SchemaFuture {
                    path: path.to_path_buf(),
                    found: version,
                    supported: schema::SCHEMA_VERSION,
                });
            }
            Ok(Some(version)) if version < schema::SCHEMA_VERSION => {
                let mut backed_up = false;
                schema::migrate_schema(&conn, version, || {
                    if !backed_up && mode.automatic_backups() {
                        backed_up = true;
                        let dest =
                            backup::nonexistent_sibling(path, paths::MIGRATION_BACKUP_SUFFIX);
                        match backup::online_backup(&conn, &dest) {
                            Ok(()) => log::info!(
                                "Created pre-migration backup at {}",
                                dest.display()
                            ),
                            Err(e) => log::error!(
                                "Could not create pre-migration backup at {}: {}",
                                dest.display(),
                                e
                            ),
                        }
                    }
                })
                .map_err(|e| map_readonly(path, e))?;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                // Completely fresh database, stamp it with our version.
                schema::write_initial_version(&conn).map_err(|e| map_readonly(path, e))?;
            }
            Err(_) => {
                return Err(DatabaseError::SchemaCorrupt {
                    path: path.to_path_buf(),
                });
            }
        }

        if mode.automatic_backups() {
            backup::prune_backups(path, paths::BACKUP_SUFFIX);
        }

        let db = Self {
            conn,
            path: path.to_path_buf(),
            mode,
            categories: Mutex::new(CategoryState {
                definitions: Vec::new(),
                bitfield: CategoryBitfield::default(),
            }),
        };
        db.refresh_category_cache()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Take an online backup next to the database, named with `suffix`
    /// plus a numeric disambiguator if needed. Returns the backup path.
    pub fn make_backup(&self, suffix: &str) -> DatabaseResult<PathBuf> {
        let dest = backup::nonexistent_sibling(&self.path, suffix);
        backup::online_backup(&self.conn, &dest)?;
        Ok(dest)
    }

    /// Take an online backup into an explicit destination, replacing any
    /// existing file there.
    pub fn backup_to(&self, dest: &Path) -> DatabaseResult<()> {
        if dest.exists() {
            std::fs::remove_file(dest)?;
        }
        backup::online_backup(&self.conn, dest)?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Current active-category bitfield snapshot.
    pub(crate) fn bitfield_snapshot(&self) -> CategoryBitfield {
        self.categories.lock().unwrap().bitfield.clone()
    }

    /// Re-read the category table into the cache. Runs inside the category
    /// critical section; every category mutation calls this before
    /// returning.
    pub(crate) fn refresh_category_cache(&self) -> rusqlite::Result<()> {
        let definitions = categories::load_definitions(&self.conn)?;
        let mut state = self.categories.lock().unwrap();
        state.bitfield = CategoryBitfield::new(definitions.clone());
        state.definitions = definitions;
        Ok(())
    }
}

impl Drop for PatchDatabase {
    fn drop(&mut self) {
        if self.mode.automatic_backups() {
            match self.make_backup(paths::BACKUP_SUFFIX) {
                Ok(dest) => log::info!("Database backup written to {}", dest.display()),
                Err(e) => log::error!("Failed to write close backup: {}", e),
            }
        }
    }
}

fn map_readonly(path: &Path, e: rusqlite::Error) -> DatabaseError {
    if e.sqlite_error_code() == Some(ErrorCode::ReadOnly) {
        DatabaseError::ReadOnly {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    } else {
        DatabaseError::Sql(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_fresh_database_at_current_version() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.db3");
        let db = PatchDatabase::open(&path, OpenMode::ReadWriteNoBackups).unwrap();
        assert_eq!(
            schema::read_version(db.conn()).unwrap(),
            Some(schema::SCHEMA_VERSION)
        );
        // Seeded defaults are active in the bitfield cache right away.
        assert!(db.bitfield_snapshot().max_bit_index() >= 14);
    }

    #[test]
    fn test_open_rejects_future_schema() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.db3");
        {
            let db = PatchDatabase::open(&path, OpenMode::ReadWriteNoBackups).unwrap();
            db.conn()
                .execute("UPDATE schema_version SET number = 99", [])
                .unwrap();
        }
        match PatchDatabase::open(&path, OpenMode::ReadWriteNoBackups) {
            Err(DatabaseError::SchemaFuture { found, supported, .. }) => {
                assert_eq!(found, 99);
                assert_eq!(supported, schema::SCHEMA_VERSION);
            }
            other => panic!("expected SchemaFuture, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_open_rejects_corrupt_version_row() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.db3");
        {
            let db = PatchDatabase::open(&path, OpenMode::ReadWriteNoBackups).unwrap();
            db.conn()
                .execute("UPDATE schema_version SET number = 'garbage'", [])
                .unwrap();
        }
        match PatchDatabase::open(&path, OpenMode::ReadWriteNoBackups) {
            Err(DatabaseError::SchemaCorrupt { .. }) => {}
            other => panic!("expected SchemaCorrupt, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_no_backups_mode_leaves_no_files_behind() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.db3");
        {
            let _db = PatchDatabase::open(&path, OpenMode::ReadWriteNoBackups).unwrap();
        }
        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["catalog.db3".to_string()]);
    }

    #[test]
    fn test_read_write_close_takes_rolling_backup() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.db3");
        {
            let _db = PatchDatabase::open(&path, OpenMode::ReadWrite).unwrap();
        }
        assert!(temp.path().join("catalog-backup.db3").exists());
    }
}

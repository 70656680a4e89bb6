//! Catalog error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can abort opening a patch database.
///
/// Everything past a successful open is recovered locally: writes report
/// `false` or a zero count, reads come back empty, and the incident is
/// logged through the host-supplied logger.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The file was produced by a newer release and cannot be opened.
    #[error("database {path:?} has schema version {found}, newer than the supported version {supported}")]
    SchemaFuture {
        path: PathBuf,
        found: i32,
        supported: i32,
    },

    /// The file needs a schema migration but was opened read-only.
    #[error("database {path:?} needs a schema migration but is read-only: {message}")]
    ReadOnly { path: PathBuf, message: String },

    /// The schema version row exists but cannot be read.
    #[error("database {path:?} has an unreadable schema version row")]
    SchemaCorrupt { path: PathBuf },

    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for operations that can abort an open.
pub type DatabaseResult<T> = std::result::Result<T, DatabaseError>;

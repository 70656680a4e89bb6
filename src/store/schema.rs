//! Table creation and forward-only schema migrations.
//!
//! Column names are a compatibility contract with existing catalog files
//! and must not change. Each migration step runs inside its own
//! transaction; the caller takes a safety backup before the first step of
//! a session.

use rusqlite::Connection;

/// Version written by this release.
pub const SCHEMA_VERSION: i32 = 7;
/* History */
/* 1 - initial schema */
/* 2 - hidden flag (soft delete) */
/* 3 - type integer on patches (voice, layer, tuning...) */
/* 4 - backfill NULL type to 0 */
/* 5 - bank number column for sorting multi-bank imports */
/* 6 - categories table mapping bit indices to tags */
/* 7 - lists and patch_in_list */

/// Default tags seeded into a fresh categories table.
const DEFAULT_CATEGORIES: &[(i32, &str, &str)] = &[
    (0, "Lead", "ff8dd3c7"),
    (1, "Pad", "ffffffb3"),
    (2, "Brass", "ff4a75b2"),
    (3, "Organ", "fffb8072"),
    (4, "Keys", "ff80b1d3"),
    (5, "Bass", "fffdb462"),
    (6, "Arp", "ffb3de69"),
    (7, "Pluck", "fffccde5"),
    (8, "Drone", "ffd9d9d9"),
    (9, "Drum", "ffbc80bd"),
    (10, "Bell", "ffccebc5"),
    (11, "SFX", "ffffed6f"),
    (12, "Ambient", "ff869cab"),
    (13, "Wind", "ff317469"),
    (14, "Voice", "ffa75781"),
];

pub(crate) fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = :NAM",
        &[(":NAM", name)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Create any missing tables. A fresh file ends up with the complete
/// current schema; for old files the existence checks keep this a no-op so
/// that a read-only open of a complete database issues no DDL at all.
pub(crate) fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    if !table_exists(&tx, "patches")? {
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS patches (synth TEXT, md5 TEXT UNIQUE, name TEXT, \
             type INTEGER, data BLOB, favorite INTEGER, hidden INTEGER, sourceID TEXT, \
             sourceName TEXT, sourceInfo TEXT, midiBankNo INTEGER, midiProgramNo INTEGER, \
             categories INTEGER, categoryUserDecision INTEGER)",
        )?;
    }
    if !table_exists(&tx, "imports")? {
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS imports (synth TEXT, name TEXT, id TEXT, date TEXT)",
        )?;
    }
    if !table_exists(&tx, "categories")? {
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS categories (bitIndex INTEGER UNIQUE, name TEXT, \
             color TEXT, active INTEGER)",
        )?;
        seed_default_categories(&tx)?;
    }
    if !table_exists(&tx, "schema_version")? {
        tx.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (number INTEGER)")?;
    }
    if !table_exists(&tx, "lists")? {
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS lists(id TEXT UNIQUE NOT NULL, name TEXT); \
             CREATE TABLE IF NOT EXISTS patch_in_list(id TEXT, synth TEXT, md5 TEXT, \
             order_num INTEGER NOT NULL, FOREIGN KEY(id) REFERENCES lists(id))",
        )?;
    }
    tx.commit()
}

pub(crate) fn seed_default_categories(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO categories (bitIndex, name, color, active) VALUES (:BIT, :NAM, :COL, 1)",
    )?;
    for (bit_index, name, color) in DEFAULT_CATEGORIES {
        stmt.execute(rusqlite::named_params! {
            ":BIT": bit_index,
            ":NAM": name,
            ":COL": color,
        })?;
    }
    Ok(())
}

/// Read the stored schema version. `None` means the row is missing (a
/// freshly created file).
pub(crate) fn read_version(conn: &Connection) -> rusqlite::Result<Option<i32>> {
    match conn.query_row("SELECT number FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    }) {
        Ok(version) => Ok(Some(version as i32)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn write_initial_version(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schema_version VALUES (:NUM)",
        &[(":NUM", &SCHEMA_VERSION)],
    )?;
    Ok(())
}

/// Apply all migrations from `current` up to [`SCHEMA_VERSION`], strictly
/// ascending, one transaction per step. `backup_once` fires before the
/// first step that actually runs.
pub(crate) fn migrate_schema(
    conn: &Connection,
    current: i32,
    mut backup_once: impl FnMut(),
) -> rusqlite::Result<()> {
    if current < 2 {
        backup_once();
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "ALTER TABLE patches ADD COLUMN hidden INTEGER; \
             UPDATE schema_version SET number = 2;",
        )?;
        tx.commit()?;
    }
    if current < 3 {
        backup_once();
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "ALTER TABLE patches ADD COLUMN type INTEGER; \
             UPDATE schema_version SET number = 3;",
        )?;
        tx.commit()?;
    }
    if current < 4 {
        backup_once();
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "UPDATE patches SET type = 0 WHERE type is NULL; \
             UPDATE schema_version SET number = 4;",
        )?;
        tx.commit()?;
    }
    if current < 5 {
        backup_once();
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "ALTER TABLE patches ADD COLUMN midiBankNo INTEGER; \
             UPDATE schema_version SET number = 5;",
        )?;
        tx.commit()?;
    }
    if current < 6 {
        backup_once();
        let tx = conn.unchecked_transaction()?;
        if !table_exists(&tx, "categories")? {
            tx.execute_batch(
                "CREATE TABLE categories (bitIndex INTEGER UNIQUE, name TEXT, color TEXT, \
                 active INTEGER)",
            )?;
            seed_default_categories(&tx)?;
        }
        tx.execute_batch("UPDATE schema_version SET number = 6")?;
        tx.commit()?;
    }
    if current < 7 {
        backup_once();
        let tx = conn.unchecked_transaction()?;
        if !table_exists(&tx, "lists")? {
            tx.execute_batch(
                "CREATE TABLE lists(id TEXT UNIQUE NOT NULL, name TEXT); \
                 CREATE TABLE patch_in_list(id TEXT, synth TEXT, md5 TEXT, \
                 order_num INTEGER NOT NULL, FOREIGN KEY(id) REFERENCES lists(id))",
            )?;
        }
        tx.execute_batch("UPDATE schema_version SET number = 7")?;
        tx.commit()?;
    }
    Ok(())
}

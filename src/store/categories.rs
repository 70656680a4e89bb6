//! Category definition storage.
//!
//! Definitions map tag names to bit positions of the patch category mask.
//! They are never deleted, only deactivated, so historical bits keep their
//! meaning. All mutations refresh the cached bitfield before returning.

use rusqlite::{named_params, Connection};

use crate::category::{CategoryDefinition, MAX_BIT_INDEX};
use crate::store::PatchDatabase;

pub(crate) fn load_definitions(conn: &Connection) -> rusqlite::Result<Vec<CategoryDefinition>> {
    let mut stmt =
        conn.prepare("SELECT bitIndex, name, color, active FROM categories ORDER BY bitIndex")?;
    let definitions = stmt
        .query_map([], |row| {
            Ok(CategoryDefinition {
                bit_index: row.get::<_, i64>(0)? as i32,
                name: row.get(1)?,
                color: row.get(2)?,
                active: row.get::<_, Option<i64>>(3)?.unwrap_or(0) != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(definitions)
}

impl PatchDatabase {
    /// All category definitions, re-read from the table. Also refreshes
    /// the cached active bitfield as a side effect.
    pub fn get_categories(&self) -> Vec<CategoryDefinition> {
        if let Err(e) = self.refresh_category_cache() {
            log::error!("DATABASE ERROR in get_categories: {}", e);
            return Vec::new();
        }
        self.categories.lock().unwrap().definitions.clone()
    }

    /// Insert or update category definitions by bit index, atomically.
    ///
    /// Refused wholesale when any definition falls outside the usable bit
    /// range; the 63-category limit is a hard cap of the mask
    /// representation.
    pub fn upsert_categories(&self, definitions: &[CategoryDefinition]) -> bool {
        for def in definitions {
            if def.bit_index < 0 || def.bit_index > MAX_BIT_INDEX {
                log::error!(
                    "Rejecting category '{}' with bit index {}: only {} categories are possible \
                     in this database. Consider splitting the catalog into several files.",
                    def.name,
                    def.bit_index,
                    MAX_BIT_INDEX + 1
                );
                return false;
            }
        }

        let result = (|| -> rusqlite::Result<()> {
            let tx = self.conn().unchecked_transaction()?;
            for def in definitions {
                let exists: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM categories WHERE bitIndex = :BIT",
                    named_params! { ":BIT": def.bit_index },
                    |row| row.get(0),
                )?;
                if exists > 0 {
                    tx.execute(
                        "UPDATE categories SET name = :NAM, color = :COL, active = :ACT \
                         WHERE bitIndex = :BIT",
                        named_params! {
                            ":BIT": def.bit_index,
                            ":NAM": def.name,
                            ":COL": def.color,
                            ":ACT": def.active as i64,
                        },
                    )?;
                } else {
                    tx.execute(
                        "INSERT INTO categories (bitIndex, name, color, active) \
                         VALUES (:BIT, :NAM, :COL, :ACT)",
                        named_params! {
                            ":BIT": def.bit_index,
                            ":NAM": def.name,
                            ":COL": def.color,
                            ":ACT": def.active as i64,
                        },
                    )?;
                }
            }
            tx.commit()
        })();

        if let Err(e) = result {
            log::error!("DATABASE ERROR in upsert_categories: {}", e);
            return false;
        }
        if let Err(e) = self.refresh_category_cache() {
            log::error!("Failed to refresh category cache: {}", e);
        }
        true
    }

    /// Next unused bit index, or -1 when all 63 are taken.
    pub fn next_free_bit_index(&self) -> i32 {
        let max_plus_one: rusqlite::Result<i64> = self.conn().query_row(
            "SELECT MAX(bitIndex) + 1 AS maxbitindex FROM categories",
            [],
            |row| Ok(row.get::<_, Option<i64>>(0)?.unwrap_or(0)),
        );
        match max_plus_one {
            Ok(next) if next <= MAX_BIT_INDEX as i64 => next as i32,
            Ok(_) => {
                log::warn!(
                    "You have exhausted the {} possible categories, it is no longer possible to \
                     create new ones in this database. Consider splitting the catalog into \
                     several files.",
                    MAX_BIT_INDEX + 1
                );
                -1
            }
            Err(e) => {
                log::error!("DATABASE ERROR in next_free_bit_index: {}", e);
                -1
            }
        }
    }
}

//! Import batch bookkeeping.
//!
//! An import row groups the patches that entered the catalog together. It
//! is created implicitly by the merge engine when the first new patch of a
//! batch is written; a synthetic batch with the id `EditBufferImport`
//! collects all transient edit-buffer captures of a synth.

use rusqlite::named_params;

use crate::store::PatchDatabase;

/// One import batch as shown in a browser dropdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportInfo {
    pub id: String,
    pub name: String,
    /// Name plus patch count, e.g. `"Bank 1 from DX7 (64)"`.
    pub description: String,
}

impl PatchDatabase {
    /// Record an import batch if it is not present yet. Returns `true`
    /// when a new row was created.
    pub fn ensure_import(&self, synth_name: &str, import_id: &str, display_name: &str) -> bool {
        let result = (|| -> rusqlite::Result<bool> {
            let existing: i64 = self.conn().query_row(
                "SELECT COUNT(*) AS numExisting FROM imports WHERE synth = :SYN AND id = :SID",
                named_params! { ":SYN": synth_name, ":SID": import_id },
                |row| row.get(0),
            )?;
            if existing >= 1 {
                return Ok(false);
            }
            // The display name can differ between the patches of a bulk
            // import; whoever gets here first names the batch.
            self.conn().execute(
                "INSERT INTO imports (synth, name, id, date) VALUES (:SYN, :NAM, :SID, :DAT)",
                named_params! {
                    ":SYN": synth_name,
                    ":NAM": display_name,
                    ":SID": import_id,
                    ":DAT": chrono::Utc::now().to_rfc3339(),
                },
            )?;
            Ok(true)
        })();

        match result {
            Ok(created) => created,
            Err(e) => {
                log::error!("DATABASE ERROR in ensure_import: {}", e);
                false
            }
        }
    }

    /// All import batches of a synth that still have patches, with their
    /// patch counts, oldest first.
    pub fn imports_for_synth(&self, synth_name: &str) -> Vec<ImportInfo> {
        let result = (|| -> rusqlite::Result<Vec<ImportInfo>> {
            let mut stmt = self.conn().prepare(
                "SELECT imports.name, id, count(patches.md5) AS patchCount FROM imports \
                 JOIN patches ON imports.id == patches.sourceID \
                 WHERE patches.synth = :SYN AND imports.synth = :SYN \
                 GROUP BY imports.id ORDER BY date",
            )?;
            let rows = stmt
                .query_map(named_params! { ":SYN": synth_name }, |row| {
                    let name: String = row.get(0)?;
                    let id: String = row.get(1)?;
                    let count: i64 = row.get(2)?;
                    Ok(ImportInfo {
                        description: format!("{} ({})", name, count),
                        id,
                        name,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })();

        match result {
            Ok(imports) => imports,
            Err(e) => {
                log::error!("DATABASE ERROR in imports_for_synth: {}", e);
                Vec::new()
            }
        }
    }
}

//! User-curated patch lists.
//!
//! Lists reference patches by identity tuple `(synth, fingerprint)`, not
//! by a surrogate key, so a reindex (delete then reinsert) does not orphan
//! memberships that were rewritten with the same fingerprint.

use rusqlite::named_params;

use crate::patch::PatchHolder;
use crate::store::PatchDatabase;
use crate::synth::SynthResolver;

/// Name and id of a stored list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListInfo {
    pub id: String,
    pub name: String,
}

/// A list resolved into its member patches, in list order.
#[derive(Debug)]
pub struct PatchList {
    pub id: String,
    pub name: String,
    pub patches: Vec<PatchHolder>,
}

impl PatchDatabase {
    /// All stored lists.
    pub fn all_lists(&self) -> Vec<ListInfo> {
        let result = (|| -> rusqlite::Result<Vec<ListInfo>> {
            let mut stmt = self.conn().prepare("SELECT id, name FROM lists")?;
            let lists = stmt
                .query_map([], |row| {
                    Ok(ListInfo {
                        id: row.get(0)?,
                        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(lists)
        })();
        match result {
            Ok(lists) => lists,
            Err(e) => {
                log::error!("DATABASE ERROR in all_lists: {}", e);
                Vec::new()
            }
        }
    }

    /// Create a list, or rename it when the id already exists.
    pub fn create_list(&self, id: &str, name: &str) -> bool {
        let result = self.conn().execute(
            "INSERT INTO lists (id, name) VALUES (:ID, :NAM) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            named_params! { ":ID": id, ":NAM": name },
        );
        match result {
            Ok(_) => true,
            Err(e) => {
                log::error!("DATABASE ERROR in create_list: {}", e);
                false
            }
        }
    }

    /// Resolve a list into its patches, ordered by list position. Members
    /// of unregistered synths are skipped (the membership row stays).
    pub fn get_list(&self, info: &ListInfo, resolver: &SynthResolver) -> PatchList {
        let members = (|| -> rusqlite::Result<Vec<(String, String)>> {
            let mut stmt = self
                .conn()
                .prepare("SELECT synth, md5 FROM patch_in_list WHERE id = :ID ORDER BY order_num")?;
            let rows = stmt
                .query_map(named_params! { ":ID": info.id }, |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })();

        let members = match members {
            Ok(members) => members,
            Err(e) => {
                log::error!("DATABASE ERROR in get_list: {}", e);
                Vec::new()
            }
        };

        let mut patches = Vec::new();
        for (synth_name, fingerprint) in members {
            let Some(adapter) = resolver.get(&synth_name).and_then(|weak| weak.upgrade()) else {
                log::warn!(
                    "List {} references synth {} which is not registered, skipping entry",
                    info.id,
                    synth_name
                );
                continue;
            };
            if let Some(holder) = self.get_single_patch(adapter.as_ref(), &fingerprint) {
                patches.push(holder);
            }
        }

        PatchList {
            id: info.id.clone(),
            name: info.name.clone(),
            patches,
        }
    }

    /// Append a patch at the end of a list.
    pub fn append_to_list(&self, list_id: &str, patch: &PatchHolder) -> bool {
        let result = self.conn().execute(
            "INSERT INTO patch_in_list (id, synth, md5, order_num) VALUES (:ID, :SYN, :MD5, \
             (SELECT COALESCE(MAX(order_num) + 1, 0) FROM patch_in_list WHERE id = :ID))",
            named_params! {
                ":ID": list_id,
                ":SYN": patch.synth,
                ":MD5": patch.fingerprint,
            },
        );
        match result {
            Ok(_) => true,
            Err(e) => {
                log::error!("DATABASE ERROR in append_to_list: {}", e);
                false
            }
        }
    }
}

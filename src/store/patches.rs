//! Patch row storage.
//!
//! Every result row passes through one decoder: payload and placement are
//! extracted, the synth adapter reconstitutes the canonical patch bytes
//! (or the row is skipped with a diagnostic), category masks are decoded
//! through the active bitfield, and the fingerprint is recomputed. A row
//! whose stored fingerprint no longer matches the adapter's algorithm is
//! still returned, but lands in the needs-reindex report on the side.

use std::collections::HashMap;

use rusqlite::{named_params, Row, ToSql};

use crate::category::CategoryBitfield;
use crate::filter::PatchFilter;
use crate::merge::{merged_categories, merged_favorite};
use crate::patch::{update, Favorite, PatchHolder};
use crate::progress::ProgressSink;
use crate::source::SourceInfo;
use crate::store::query::WhereClause;
use crate::store::PatchDatabase;
use crate::synth::{SynthAdapter, SynthResolver};

/// A row whose stored fingerprint disagrees with the recomputed one.
#[derive(Debug, Clone)]
pub struct ReindexEntry {
    /// Fingerprint currently stored in the database.
    pub stored_fingerprint: String,
    /// The decoded row, carrying the freshly computed fingerprint.
    pub holder: PatchHolder,
}

impl PatchDatabase {
    /// Insert a single patch row with the full column projection.
    pub fn insert_patch(&self, patch: &PatchHolder, source_id: &str) -> bool {
        let bitfield = self.bitfield_snapshot();
        let result = self.conn().execute(
            "INSERT INTO patches (synth, md5, name, type, data, favorite, hidden, sourceID, \
             sourceName, sourceInfo, midiBankNo, midiProgramNo, categories, categoryUserDecision) \
             VALUES (:SYN, :MD5, :NAM, :TYP, :DAT, :FAV, :HID, :SID, :SNM, :SRC, :BNK, :PRG, \
             :CAT, :CUD)",
            named_params! {
                ":SYN": patch.synth,
                ":MD5": patch.fingerprint,
                ":NAM": patch.name,
                ":TYP": patch.patch_type as i64,
                ":DAT": patch.data,
                ":FAV": patch.favorite.as_stored(),
                ":HID": patch.hidden as i64,
                ":SID": source_id,
                ":SNM": patch.source_display(),
                ":SRC": patch.source_info.as_ref().map(|s| s.to_stored()),
                ":BNK": patch.bank as i64,
                ":PRG": patch.program as i64,
                ":CAT": bitfield.encode(&patch.categories),
                ":CUD": bitfield.encode(&patch.user_decisions),
            },
        );
        match result {
            Ok(_) => true,
            Err(e) => {
                log::error!("DATABASE ERROR in insert_patch: {}", e);
                false
            }
        }
    }

    /// Partial update of the row identified by `(synth, fingerprint)` of
    /// `new`. The mask selects which columns are touched; the statement is
    /// assembled from it on every call.
    ///
    /// When categories are part of the mask, the stored value is the merge
    /// of `new` and `existing` under the user-decision rules; the favorite
    /// keeps the existing value when the incoming one is unknown.
    pub fn update_patch(&self, new: &PatchHolder, existing: &PatchHolder, mask: u32) -> bool {
        let mut set_clauses: Vec<&str> = Vec::new();
        if mask & update::CATEGORIES != 0 {
            set_clauses.push("categories = :CAT, categoryUserDecision = :CUD");
        }
        if mask & update::NAME != 0 {
            set_clauses.push("name = :NAM");
        }
        if mask & update::HIDDEN != 0 {
            set_clauses.push("hidden = :HID");
        }
        if mask & update::DATA != 0 {
            set_clauses.push("data = :DAT");
        }
        if mask & update::FAVORITE != 0 {
            set_clauses.push("favorite = :FAV");
        }
        if set_clauses.is_empty() {
            return true;
        }

        let sql = format!(
            "UPDATE patches SET {} WHERE md5 = :MD5 AND synth = :SYN",
            set_clauses.join(", ")
        );

        let bitfield = self.bitfield_snapshot();
        let mut category_mask = 0i64;
        let mut decision_mask = 0i64;
        if mask & update::CATEGORIES != 0 {
            let (categories, decisions) = merged_categories(new, existing);
            category_mask = bitfield.encode(&categories);
            decision_mask = bitfield.encode(&decisions);
        }
        let hidden = new.hidden as i64;
        let favorite = merged_favorite(new, existing).as_stored();

        let mut params: Vec<(&str, &dyn ToSql)> = Vec::new();
        if mask & update::CATEGORIES != 0 {
            params.push((":CAT", &category_mask));
            params.push((":CUD", &decision_mask));
        }
        if mask & update::NAME != 0 {
            params.push((":NAM", &new.name));
        }
        if mask & update::HIDDEN != 0 {
            params.push((":HID", &hidden));
        }
        if mask & update::DATA != 0 {
            params.push((":DAT", &new.data));
        }
        if mask & update::FAVORITE != 0 {
            params.push((":FAV", &favorite));
        }
        params.push((":MD5", &new.fingerprint));
        params.push((":SYN", &existing.synth));

        match self.conn().execute(&sql, params.as_slice()) {
            Ok(1) => true,
            Ok(rows) => {
                log::error!(
                    "Update of patch {} touched {} rows instead of one, refusing to continue",
                    new.fingerprint,
                    rows
                );
                false
            }
            Err(e) => {
                log::error!("DATABASE ERROR in update_patch: {}", e);
                false
            }
        }
    }

    /// Load one patch by identity tuple.
    pub fn get_single_patch(
        &self,
        adapter: &dyn SynthAdapter,
        fingerprint: &str,
    ) -> Option<PatchHolder> {
        let bitfield = self.bitfield_snapshot();
        let result = (|| -> rusqlite::Result<Option<PatchHolder>> {
            let mut stmt = self
                .conn()
                .prepare("SELECT * FROM patches WHERE md5 = :MD5 AND synth = :SYN")?;
            let mut rows = stmt.query(named_params! {
                ":MD5": fingerprint,
                ":SYN": adapter.name(),
            })?;
            match rows.next()? {
                Some(row) => Ok(decode_row(adapter, &bitfield, row)?.map(|(holder, _)| holder)),
                None => Ok(None),
            }
        })();
        match result {
            Ok(holder) => holder,
            Err(e) => {
                log::error!("DATABASE ERROR in get_single_patch: {}", e);
                None
            }
        }
    }

    /// Run a filtered, paginated query. Alongside the decoded rows, report
    /// every row whose stored fingerprint no longer matches the adapter's
    /// current algorithm.
    pub fn get_patches_with_report(
        &self,
        filter: &PatchFilter,
        resolver: &SynthResolver,
        skip: i32,
        limit: i32,
    ) -> rusqlite::Result<(Vec<PatchHolder>, Vec<ReindexEntry>)> {
        let bitfield = self.bitfield_snapshot();
        let clause = WhereClause::compile(filter, &bitfield, true);
        let mut sql = format!("SELECT * FROM patches{}", clause.fragment_with_order());
        if limit != -1 {
            sql.push_str(" LIMIT :LIM OFFSET :OFS");
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let limit_bind = limit as i64;
        let skip_bind = skip as i64;
        let mut params = clause.params();
        if limit != -1 {
            params.push((":LIM", &limit_bind));
            params.push((":OFS", &skip_bind));
        }

        let mut result = Vec::new();
        let mut needs_reindex = Vec::new();
        let mut rows = stmt.query(params.as_slice())?;
        while let Some(row) = rows.next()? {
            let synth_name: String = row.get("synth")?;
            let adapter = resolver.get(&synth_name).and_then(|weak| weak.upgrade());
            let Some(adapter) = adapter else {
                log::warn!(
                    "Query returned a patch for synth {} which is not registered, skipping row",
                    synth_name
                );
                continue;
            };
            match decode_row(adapter.as_ref(), &bitfield, row)? {
                Some((holder, Some(stored_fingerprint))) => {
                    needs_reindex.push(ReindexEntry {
                        stored_fingerprint,
                        holder: holder.clone(),
                    });
                    result.push(holder);
                }
                Some((holder, None)) => result.push(holder),
                None => {}
            }
        }
        Ok((result, needs_reindex))
    }

    /// Filtered, paginated query. Fingerprint drift is reported through the
    /// log; use [`PatchDatabase::get_patches_with_report`] to act on it.
    pub fn get_patches(
        &self,
        filter: &PatchFilter,
        resolver: &SynthResolver,
        skip: i32,
        limit: i32,
    ) -> Vec<PatchHolder> {
        match self.get_patches_with_report(filter, resolver, skip, limit) {
            Ok((patches, needs_reindex)) => {
                if !needs_reindex.is_empty() {
                    log::warn!(
                        "Found {} patches with inconsistent fingerprints - please reindex this \
                         synth",
                        needs_reindex.len()
                    );
                }
                patches
            }
            Err(e) => {
                log::error!("DATABASE ERROR in get_patches: {}", e);
                Vec::new()
            }
        }
    }

    /// Number of patches matching the filter. The name substring match is
    /// case-sensitive here, unlike `get_patches`.
    pub fn count(&self, filter: &PatchFilter) -> i32 {
        let bitfield = self.bitfield_snapshot();
        let clause = WhereClause::compile(filter, &bitfield, false);
        let sql = format!("SELECT count(*) FROM patches{}", clause.fragment());
        let result = self
            .conn()
            .query_row(&sql, clause.params().as_slice(), |row| row.get::<_, i64>(0));
        match result {
            Ok(count) => count as i32,
            Err(e) => {
                log::error!("DATABASE ERROR in count: {}", e);
                0
            }
        }
    }

    /// Delete everything matching the filter, returning the rows removed.
    pub fn delete_by_filter(&self, filter: &PatchFilter) -> i32 {
        let bitfield = self.bitfield_snapshot();
        let clause = WhereClause::compile(filter, &bitfield, false);
        let sql = format!("DELETE FROM patches{}", clause.fragment());
        match self.conn().execute(&sql, clause.params().as_slice()) {
            Ok(rows) => rows as i32,
            Err(e) => {
                log::error!("DATABASE ERROR in delete_by_filter: {}", e);
                0
            }
        }
    }

    /// Delete specific patches of one synth by fingerprint.
    pub fn delete_by_fingerprints(&self, synth_name: &str, fingerprints: &[String]) -> i32 {
        let result = (|| -> rusqlite::Result<i32> {
            let mut stmt = self
                .conn()
                .prepare("DELETE FROM patches WHERE md5 = :MD5 AND synth = :SYN")?;
            let mut deleted = 0;
            for fingerprint in fingerprints {
                deleted += stmt.execute(named_params! {
                    ":MD5": fingerprint,
                    ":SYN": synth_name,
                })?;
            }
            Ok(deleted as i32)
        })();
        match result {
            Ok(deleted) => deleted,
            Err(e) => {
                log::error!("DATABASE ERROR in delete_by_fingerprints: {}", e);
                0
            }
        }
    }

    /// Cheap existence probe for a batch of incoming patches: for every
    /// fingerprint already present, a sparse holder carrying only name and
    /// placement. Used by the merge engine to detect collisions without
    /// decoding payloads.
    pub fn bulk_probe(
        &self,
        patches: &[PatchHolder],
        progress: &dyn ProgressSink,
    ) -> HashMap<String, PatchHolder> {
        let mut result = HashMap::new();
        let total = patches.len().max(1);
        for (checked, patch) in patches.iter().enumerate() {
            if progress.should_abort() {
                return HashMap::new();
            }
            let probe = (|| -> rusqlite::Result<Option<PatchHolder>> {
                let mut stmt = self.conn().prepare(
                    "SELECT md5, name, midiProgramNo, midiBankNo FROM patches \
                     WHERE md5 = :MD5 AND synth = :SYN",
                )?;
                let mut rows = stmt.query(named_params! {
                    ":MD5": patch.fingerprint,
                    ":SYN": patch.synth,
                })?;
                match rows.next()? {
                    Some(row) => Ok(Some(PatchHolder {
                        synth: patch.synth.clone(),
                        fingerprint: row.get(0)?,
                        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        patch_type: 0,
                        data: Vec::new(),
                        favorite: Favorite::DontKnow,
                        hidden: false,
                        source_id: None,
                        source_info: patch.source_info.clone(),
                        bank: row.get::<_, Option<i64>>(3)?.unwrap_or(0) as i32,
                        program: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as i32,
                        categories: Default::default(),
                        user_decisions: Default::default(),
                    })),
                    None => Ok(None),
                }
            })();
            match probe {
                Ok(Some(existing)) => {
                    result.insert(existing.fingerprint.clone(), existing);
                }
                Ok(None) => {}
                Err(e) => log::error!("DATABASE ERROR in bulk_probe: {}", e),
            }
            progress.set_progress(checked as f64 / total as f64);
        }
        result
    }
}

/// Decode one result row. `Ok(None)` means the adapter rejected the
/// payload and the row was skipped; the second tuple element carries the
/// stored fingerprint when it disagrees with the recomputed one.
fn decode_row(
    adapter: &dyn SynthAdapter,
    bitfield: &CategoryBitfield,
    row: &Row,
) -> rusqlite::Result<Option<(PatchHolder, Option<String>)>> {
    let stored_fingerprint: String = row.get("md5")?;
    let Some(data) = row.get::<_, Option<Vec<u8>>>("data")? else {
        log::warn!(
            "Patch {} of synth {} has no payload, skipping row",
            stored_fingerprint,
            adapter.name()
        );
        return Ok(None);
    };
    let bank = row.get::<_, Option<i64>>("midiBankNo")?.unwrap_or(0) as i32;
    let program = row.get::<_, Option<i64>>("midiProgramNo")?.unwrap_or(0) as i32;

    let Some(canonical) = adapter.patch_from_data(&data, program) else {
        log::warn!(
            "Adapter {} rejected stored patch {}, skipping row",
            adapter.name(),
            stored_fingerprint
        );
        return Ok(None);
    };

    let source_info = row
        .get::<_, Option<String>>("sourceInfo")?
        .as_deref()
        .and_then(SourceInfo::from_stored);

    let fingerprint = adapter.fingerprint(&canonical);
    let drift = if fingerprint != stored_fingerprint {
        Some(stored_fingerprint)
    } else {
        None
    };

    let holder = PatchHolder {
        synth: adapter.name(),
        fingerprint,
        name: row.get::<_, Option<String>>("name")?.unwrap_or_default(),
        patch_type: row.get::<_, Option<i64>>("type")?.unwrap_or(0) as i32,
        data: canonical,
        favorite: Favorite::from_stored(row.get::<_, Option<i64>>("favorite")?.unwrap_or(-1)),
        hidden: row.get::<_, Option<i64>>("hidden")? == Some(1),
        source_id: row.get::<_, Option<String>>("sourceID")?,
        source_info,
        bank,
        program,
        categories: bitfield.decode(row.get::<_, Option<i64>>("categories")?.unwrap_or(0)),
        user_decisions: bitfield
            .decode(row.get::<_, Option<i64>>("categoryUserDecision")?.unwrap_or(0)),
    };
    Ok(Some((holder, drift)))
}

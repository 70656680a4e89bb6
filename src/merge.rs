//! The merge engine: the only legal write path for patches.
//!
//! Merging reconciles a batch of incoming patches with the catalog: rows
//! that already exist are updated under the caller's update mask, new rows
//! are inserted (deduplicated within the batch), and import batches are
//! recorded for whatever actually went in. Manual user decisions on
//! categories survive every merge, and a vendor default name never
//! overwrites a name somebody chose.

use std::collections::{BTreeSet, HashMap};

use crate::category::Category;
use crate::filter::PatchFilter;
use crate::patch::{update, Favorite, PatchHolder};
use crate::progress::{NoProgress, ProgressSink};
use crate::source::{EDIT_BUFFER_IMPORT_ID, EDIT_BUFFER_IMPORT_NAME};
use crate::store::PatchDatabase;
use crate::synth::SynthResolver;

/// Outcome of a merge: how many rows were written, and which of the
/// incoming patches were new to the catalog (in incoming order, batch
/// duplicates removed).
#[derive(Debug, Default)]
pub struct MergeReport {
    pub inserted: usize,
    pub new_patches: Vec<PatchHolder>,
}

/// Category outcome when an incoming patch meets an existing row.
///
/// A user decision on either side dominates the other side's automatic
/// tagging; a fresh user decision overrides an old one; automatic tagging
/// never erases a user decision. Decisions themselves accumulate.
pub(crate) fn merged_categories(
    new: &PatchHolder,
    existing: &PatchHolder,
) -> (BTreeSet<Category>, BTreeSet<Category>) {
    let new_user_decided: BTreeSet<Category> = new
        .categories
        .intersection(&new.user_decisions)
        .cloned()
        .collect();
    let new_automatic: BTreeSet<Category> = new
        .categories
        .difference(&new.user_decisions)
        .cloned()
        .collect();
    let old_user_decided: BTreeSet<Category> = existing
        .categories
        .intersection(&existing.user_decisions)
        .cloned()
        .collect();

    let mut result: BTreeSet<Category> = new_user_decided;
    result.extend(
        new_automatic
            .difference(&existing.user_decisions)
            .cloned(),
    );
    result.extend(old_user_decided.difference(&new.user_decisions).cloned());

    let decisions: BTreeSet<Category> = new
        .user_decisions
        .union(&existing.user_decisions)
        .cloned()
        .collect();
    (result, decisions)
}

/// An unknown incoming favorite keeps the existing value.
pub(crate) fn merged_favorite(new: &PatchHolder, existing: &PatchHolder) -> Favorite {
    if new.favorite == Favorite::DontKnow {
        existing.favorite
    } else {
        new.favorite
    }
}

impl PatchDatabase {
    /// Merge a batch of incoming patches into the catalog.
    ///
    /// Patches are processed in caller order; `new_patches` keeps that
    /// order minus batch duplicates. Cancellation through the progress
    /// sink is honored between items and reports the count written so
    /// far. With `use_transaction` the whole merge commits atomically;
    /// without it the caller is expected to hold its own transaction.
    pub fn merge_patches(
        &self,
        resolver: &SynthResolver,
        patches: &[PatchHolder],
        update_mask: u32,
        progress: &dyn ProgressSink,
        use_transaction: bool,
    ) -> MergeReport {
        let known = self.bulk_probe(patches, progress);
        if progress.should_abort() {
            return MergeReport::default();
        }

        let transaction = if use_transaction {
            match self.conn().unchecked_transaction() {
                Ok(tx) => Some(tx),
                Err(e) => {
                    log::error!("DATABASE ERROR in merge_patches: {}", e);
                    return MergeReport::default();
                }
            }
        } else {
            None
        };

        let mut new_patches: Vec<PatchHolder> = Vec::new();
        let mut updated_names = 0;
        let total = patches.len().max(1);

        for (loop_count, patch) in patches.iter().enumerate() {
            if progress.should_abort() {
                return MergeReport::default();
            }
            let Some(adapter) = resolver.get(&patch.synth).and_then(|weak| weak.upgrade())
            else {
                log::warn!(
                    "No adapter registered for synth {}, skipping patch {}",
                    patch.synth,
                    patch.name
                );
                continue;
            };

            if let Some(existing) = known.get(&patch.fingerprint) {
                // Never let a factory default name clobber a name the user
                // (or a better sysex file) has given the patch.
                let mut only_update_this = update_mask;
                if adapter.is_default_name(&patch.name) {
                    only_update_this &= !update::NAME;
                }
                if only_update_this & update::NAME != 0 && patch.name != existing.name {
                    updated_names += 1;
                    log::info!("Renaming {} with better name {}", existing.name, patch.name);
                }

                if only_update_this == update::NAME {
                    // Name-only change: the probe projection is enough.
                    self.update_patch(patch, existing, update::NAME);
                } else if only_update_this != 0 {
                    // More columns change: the category and favorite merge
                    // needs the fully loaded row.
                    match self.get_single_patch(adapter.as_ref(), &patch.fingerprint) {
                        Some(full) => {
                            self.update_patch(patch, &full, only_update_this);
                        }
                        None => log::warn!(
                            "Patch {} disappeared between probe and update, skipping",
                            patch.fingerprint
                        ),
                    }
                }
            } else {
                new_patches.push(patch.clone());
            }
            progress.set_progress(loop_count as f64 / total as f64);
        }

        if updated_names > 0 {
            log::info!("Updated {} patches in the database with new names", updated_names);
        }

        // Work out which import batch each new patch belongs to.
        let mut import_of_fingerprint: HashMap<String, String> = HashMap::new();
        let mut imports_to_create: BTreeSet<(String, String, String)> = BTreeSet::new();
        for patch in &new_patches {
            match &patch.source_info {
                None => {
                    // No provenance recorded, probably very old or from a
                    // third-party system.
                }
                Some(source) if source.is_edit_buffer() => {
                    import_of_fingerprint
                        .insert(patch.fingerprint.clone(), EDIT_BUFFER_IMPORT_ID.to_string());
                    imports_to_create.insert((
                        patch.synth.clone(),
                        EDIT_BUFFER_IMPORT_ID.to_string(),
                        EDIT_BUFFER_IMPORT_NAME.to_string(),
                    ));
                }
                Some(source) => {
                    let uid = source.import_uid(&patch.synth);
                    import_of_fingerprint.insert(patch.fingerprint.clone(), uid.clone());
                    imports_to_create.insert((
                        patch.synth.clone(),
                        uid,
                        source.display_string(&patch.synth),
                    ));
                }
            }
        }

        // Insert, deduplicating within the batch by fingerprint.
        let mut inserted_by_fingerprint: HashMap<String, PatchHolder> = HashMap::new();
        let mut inserted = 0usize;
        let new_total = new_patches.len().max(1);
        for loop_count in 0..new_patches.len() {
            if progress.should_abort() {
                return MergeReport {
                    inserted,
                    new_patches,
                };
            }
            let patch = &new_patches[loop_count];
            if let Some(duplicate) = inserted_by_fingerprint.get(&patch.fingerprint) {
                let default_dup = resolver
                    .get(&duplicate.synth)
                    .and_then(|weak| weak.upgrade())
                    .map(|a| a.is_default_name(&duplicate.name))
                    .unwrap_or(false);
                let default_new = resolver
                    .get(&patch.synth)
                    .and_then(|weak| weak.upgrade())
                    .map(|a| a.is_default_name(&patch.name))
                    .unwrap_or(false);
                if default_dup && !default_new {
                    self.update_patch(patch, duplicate, update::NAME);
                    log::info!(
                        "Updating patch name {} to better one: {}",
                        duplicate.name,
                        patch.name
                    );
                } else {
                    log::info!(
                        "Skipping patch {} because it is a duplicate of {}",
                        patch.name,
                        duplicate.name
                    );
                }
            } else {
                let source_id = match &patch.source_id {
                    Some(id) if !id.is_empty() => id.clone(),
                    _ => import_of_fingerprint
                        .get(&patch.fingerprint)
                        .cloned()
                        .unwrap_or_default(),
                };
                if self.insert_patch(patch, &source_id) {
                    inserted += 1;
                    inserted_by_fingerprint.insert(patch.fingerprint.clone(), patch.clone());
                }
            }
            progress.set_progress(loop_count as f64 / new_total as f64);
        }

        for (synth, uid, display) in imports_to_create {
            self.ensure_import(&synth, &uid, &display);
        }

        // The reported new-patch list keeps incoming order but drops the
        // batch duplicates that collapsed onto an earlier insert.
        let mut emitted: BTreeSet<String> = BTreeSet::new();
        new_patches.retain(|patch| {
            inserted_by_fingerprint.contains_key(&patch.fingerprint)
                && emitted.insert(patch.fingerprint.clone())
        });

        if let Some(tx) = transaction {
            if let Err(e) = tx.commit() {
                log::error!("DATABASE ERROR committing merge: {}", e);
                return MergeReport {
                    inserted: 0,
                    new_patches,
                };
            }
        }

        MergeReport {
            inserted,
            new_patches,
        }
    }

    /// Upsert a single patch. Returns `true` when the patch was new.
    pub fn put_patch(&self, resolver: &SynthResolver, patch: &PatchHolder) -> bool {
        let report = self.merge_patches(
            resolver,
            std::slice::from_ref(patch),
            update::ALL,
            &NoProgress,
            true,
        );
        report.inserted > 0
    }

    /// Recompute fingerprints for everything matching a single-synth
    /// filter: rows whose stored fingerprint drifted are deleted and
    /// re-merged under one transaction. Returns the resulting match count,
    /// or -1 when the reindex was refused or failed.
    pub fn reindex_patches(&self, filter: &PatchFilter, resolver: &SynthResolver) -> i32 {
        if filter.synths.len() > 1 {
            log::warn!("Aborting reindexing - please select only one synth at a time");
            return -1;
        }
        let Some(synth_name) = filter.synths.first().cloned() else {
            log::warn!("Aborting reindexing - no synth selected");
            return -1;
        };

        let (_, needs_reindex) = match self.get_patches_with_report(filter, resolver, 0, -1) {
            Ok(loaded) => loaded,
            Err(e) => {
                log::error!("Aborting reindexing - could not load filtered patches: {}", e);
                return -1;
            }
        };
        if needs_reindex.is_empty() {
            log::info!("None of the selected patches needed reindexing, skipping");
            return self.count(filter);
        }

        let stored: Vec<String> = needs_reindex
            .iter()
            .map(|entry| entry.stored_fingerprint.clone())
            .collect();
        let reinsert: Vec<PatchHolder> = needs_reindex
            .into_iter()
            .map(|entry| entry.holder)
            .collect();

        let tx = match self.conn().unchecked_transaction() {
            Ok(tx) => tx,
            Err(e) => {
                log::error!("Aborting reindexing - cannot start transaction: {}", e);
                return -1;
            }
        };

        // Everything is in RAM now, safe to drop the stale rows.
        let deleted = self.delete_by_fingerprints(&synth_name, &stored);
        if deleted as usize != stored.len() {
            log::error!(
                "Aborting reindexing - deleted {} rows but expected {}",
                deleted,
                stored.len()
            );
            return -1;
        }

        // The merge pipeline handles rows that collapsed onto the same new
        // fingerprint.
        self.merge_patches(resolver, &reinsert, update::ALL, &NoProgress, false);
        if let Err(e) = tx.commit() {
            log::error!("Aborting reindexing - commit failed: {}", e);
            return -1;
        }

        self.count(filter)
    }
}

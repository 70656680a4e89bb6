//! End-to-end scenarios for the merge pipeline and filtered queries.

mod common;

use std::collections::BTreeSet;

use tempfile::TempDir;

use common::{incoming, resolver, MockSynth};
use patchdb::{
    update, Category, Favorite, NoProgress, OpenMode, OrderBy, PatchDatabase, PatchFilter,
    SourceInfo,
};

fn open_db(temp: &TempDir) -> PatchDatabase {
    PatchDatabase::open(&temp.path().join("catalog.db3"), OpenMode::ReadWriteNoBackups).unwrap()
}

fn cats(names: &[&str]) -> BTreeSet<Category> {
    names.iter().map(|n| Category::new(*n, "")).collect()
}

fn cat_names(set: &BTreeSet<Category>) -> Vec<String> {
    set.iter().map(|c| c.name.clone()).collect()
}

#[test]
fn test_fresh_insert_creates_patch_and_import() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp);
    let synth = MockSynth::new("A");
    let resolver = resolver(&[&synth]);

    let source = SourceInfo::BankDownload { bank: 0 };
    let patch = incoming(&synth, &[0x01, 0x02], "Init", 0, source.clone());
    let report = db.merge_patches(&resolver, &[patch], update::ALL, &NoProgress, true);

    assert_eq!(report.inserted, 1);
    assert_eq!(report.new_patches.len(), 1);
    assert_eq!(db.count(&PatchFilter::all_for_synth("A")), 1);

    let loaded = db.get_patches(&PatchFilter::all_for_synth("A"), &resolver, 0, -1);
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name, "Init");
    assert_eq!(loaded[0].data, vec![0x01, 0x02]);
    assert_eq!(loaded[0].favorite, Favorite::DontKnow);
    assert!(!loaded[0].hidden);

    // Exactly one import row, with the uid derived from the provenance.
    let imports = db.imports_for_synth("A");
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].id, source.import_uid("A"));
    assert_eq!(imports[0].description, "Bank 1 from A (1)");
    assert_eq!(loaded[0].source_id.as_deref(), Some(imports[0].id.as_str()));
}

#[test]
fn test_duplicate_with_better_name_renames_once() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp);
    let synth = MockSynth::new("A");
    let resolver = resolver(&[&synth]);
    let source = SourceInfo::BankDownload { bank: 0 };

    // "Init" is a vendor default name for the mock.
    let first = incoming(&synth, &[0x01, 0x02], "Init", 0, source.clone());
    db.merge_patches(&resolver, &[first], update::ALL, &NoProgress, true);

    // Same payload under a real name: the better name wins.
    let better = incoming(&synth, &[0x01, 0x02], "Basic Preset", 0, source.clone());
    let report = db.merge_patches(&resolver, &[better], update::ALL, &NoProgress, true);
    assert_eq!(report.inserted, 0);
    let loaded = db.get_patches(&PatchFilter::all_for_synth("A"), &resolver, 0, -1);
    assert_eq!(loaded[0].name, "Basic Preset");

    // A default name coming in later must not take the real name back.
    let worse = incoming(&synth, &[0x01, 0x02], "Init", 0, source);
    db.merge_patches(&resolver, &[worse], update::ALL, &NoProgress, true);
    let loaded = db.get_patches(&PatchFilter::all_for_synth("A"), &resolver, 0, -1);
    assert_eq!(loaded[0].name, "Basic Preset");
}

#[test]
fn test_merge_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp);
    let synth = MockSynth::new("A");
    let resolver = resolver(&[&synth]);
    let source = SourceInfo::FileImport {
        filename: "bank.syx".to_string(),
        full_path: None,
    };

    let patches: Vec<_> = (0u8..5)
        .map(|i| {
            incoming(
                &synth,
                &[i + 1, 0x40],
                &format!("Patch {}", i),
                i as i32,
                source.clone(),
            )
        })
        .collect();
    let first = db.merge_patches(&resolver, &patches, update::ALL, &NoProgress, true);
    assert_eq!(first.inserted, 5);

    let before = db.get_patches(&PatchFilter::all_for_synth("A"), &resolver, 0, -1);
    let again = db.merge_patches(&resolver, &patches, update::ALL, &NoProgress, true);
    assert_eq!(again.inserted, 0);
    assert!(again.new_patches.is_empty());

    let after = db.get_patches(&PatchFilter::all_for_synth("A"), &resolver, 0, -1);
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.name, a.name);
        assert_eq!(b.fingerprint, a.fingerprint);
        assert_eq!(b.data, a.data);
        assert_eq!(b.favorite, a.favorite);
        assert_eq!(b.categories, a.categories);
        assert_eq!(b.user_decisions, a.user_decisions);
    }
    assert_eq!(db.imports_for_synth("A").len(), 1);
}

#[test]
fn test_user_decision_survives_automatic_retag() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp);
    let synth = MockSynth::new("A");
    let resolver = resolver(&[&synth]);
    let source = SourceInfo::BankDownload { bank: 0 };

    // The user affirmed Lead on the stored patch.
    let mut stored = incoming(&synth, &[0x10, 0x20], "Solo", 0, source.clone());
    stored.categories = cats(&["Lead"]);
    stored.user_decisions = cats(&["Lead"]);
    db.merge_patches(&resolver, &[stored], update::ALL, &NoProgress, true);

    // An automatic re-import tags it Pad instead.
    let mut retagged = incoming(&synth, &[0x10, 0x20], "Solo", 0, source);
    retagged.categories = cats(&["Pad"]);
    db.merge_patches(&resolver, &[retagged], update::ALL, &NoProgress, true);

    let loaded = db.get_patches(&PatchFilter::all_for_synth("A"), &resolver, 0, -1);
    assert_eq!(cat_names(&loaded[0].categories), vec!["Lead", "Pad"]);
    assert_eq!(cat_names(&loaded[0].user_decisions), vec!["Lead"]);
}

#[test]
fn test_in_batch_duplicates_collapse() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp);
    let synth = MockSynth::new("A");
    let resolver = resolver(&[&synth]);
    let source = SourceInfo::BankDownload { bank: 1 };

    // Same payload three times in one batch: default name first, then a
    // real name, then another default.
    let batch = vec![
        incoming(&synth, &[0x55], "Init", 0, source.clone()),
        incoming(&synth, &[0x55], "Warm Pad", 1, source.clone()),
        incoming(&synth, &[0x55], "INIT VOICE", 2, source),
    ];
    let report = db.merge_patches(&resolver, &batch, update::ALL, &NoProgress, true);

    assert_eq!(report.inserted, 1);
    assert_eq!(report.new_patches.len(), 1);
    assert_eq!(db.count(&PatchFilter::all_for_synth("A")), 1);
    let loaded = db.get_patches(&PatchFilter::all_for_synth("A"), &resolver, 0, -1);
    assert_eq!(loaded[0].name, "Warm Pad");
}

#[test]
fn test_edit_buffer_goes_to_sentinel_import() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp);
    let synth = MockSynth::new("A");
    let resolver = resolver(&[&synth]);

    let capture = incoming(&synth, &[0x0a, 0x0b], "Scratch", 0, SourceInfo::EditBuffer);
    db.merge_patches(&resolver, &[capture], update::ALL, &NoProgress, true);

    let imports = db.imports_for_synth("A");
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].id, "EditBufferImport");
    assert_eq!(imports[0].name, "Edit buffer imports");

    // A second capture shares the batch.
    let capture = incoming(&synth, &[0x0c, 0x0d], "Scratch 2", 0, SourceInfo::EditBuffer);
    db.merge_patches(&resolver, &[capture], update::ALL, &NoProgress, true);
    let imports = db.imports_for_synth("A");
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].description, "Edit buffer imports (2)");
}

#[test]
fn test_favorite_and_hidden_updates() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp);
    let synth = MockSynth::new("A");
    let resolver = resolver(&[&synth]);
    let source = SourceInfo::BankDownload { bank: 0 };

    let patch = incoming(&synth, &[0x01], "Keeper", 0, source.clone());
    db.merge_patches(&resolver, &[patch.clone()], update::ALL, &NoProgress, true);

    // Mark favorite and hide through the merge path.
    let mut edit = patch.clone();
    edit.favorite = Favorite::Yes;
    edit.hidden = true;
    db.merge_patches(
        &resolver,
        &[edit],
        update::FAVORITE | update::HIDDEN,
        &NoProgress,
        true,
    );

    let all = PatchFilter::all_for_synth("A");
    let loaded = db.get_patches(&all, &resolver, 0, -1);
    assert_eq!(loaded[0].favorite, Favorite::Yes);
    assert!(loaded[0].hidden);

    // An unknown incoming favorite keeps the stored one.
    let mut unknown = patch.clone();
    unknown.favorite = Favorite::DontKnow;
    db.merge_patches(&resolver, &[unknown], update::FAVORITE, &NoProgress, true);
    let loaded = db.get_patches(&all, &resolver, 0, -1);
    assert_eq!(loaded[0].favorite, Favorite::Yes);

    // Hidden rows disappear from the default browser view.
    let mut visible_only = PatchFilter::all_for_synth("A");
    visible_only.show_hidden = false;
    assert_eq!(db.count(&visible_only), 0);
    assert!(db.get_patches(&visible_only, &resolver, 0, -1).is_empty());
}

#[test]
fn test_filters_and_pagination() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp);
    let synth = MockSynth::new("A");
    let resolver = resolver(&[&synth]);
    let source = SourceInfo::BankDownload { bank: 0 };

    let mut batch = Vec::new();
    for i in 0u8..10 {
        let name = if i % 2 == 0 {
            format!("Brass Stab {}", i)
        } else {
            format!("String Pad {}", i)
        };
        let mut p = incoming(&synth, &[i + 1, 0x7f], &name, i as i32, source.clone());
        if i == 0 {
            p.favorite = Favorite::Yes;
            p.categories = cats(&["Brass"]);
        }
        batch.push(p);
    }
    db.merge_patches(&resolver, &batch, update::ALL, &NoProgress, true);

    let all = PatchFilter::all_for_synth("A");
    assert_eq!(db.count(&all), 10);

    // Pagination respects import order.
    let page = db.get_patches(&all, &resolver, 4, 3);
    assert_eq!(page.len(), 3);
    assert_eq!(page[0].program, 4);

    // Substring match on the name, ASCII case folded.
    let mut named = all.clone();
    named.name = Some("brass".to_string());
    assert_eq!(db.get_patches(&named, &resolver, 0, -1).len(), 5);
    assert_eq!(db.count(&named), 5);

    let mut faves = all.clone();
    faves.only_faves = true;
    assert_eq!(db.get_patches(&faves, &resolver, 0, -1).len(), 1);

    let mut tagged = all.clone();
    tagged.categories = cats(&["Brass"]);
    let hits = db.get_patches(&tagged, &resolver, 0, -1);
    assert_eq!(hits.len(), 1);
    assert_eq!(cat_names(&hits[0].categories), vec!["Brass"]);

    let mut untagged = all.clone();
    untagged.only_untagged = true;
    assert_eq!(db.count(&untagged), 9);

    let mut by_name = all.clone();
    by_name.order_by = OrderBy::Name;
    let sorted = db.get_patches(&by_name, &resolver, 0, -1);
    assert_eq!(sorted[0].name, "Brass Stab 0");

    // Deleting by filter removes exactly the matching rows.
    let mut strings = all.clone();
    strings.name = Some("String".to_string());
    assert_eq!(db.delete_by_filter(&strings), 5);
    assert_eq!(db.count(&all), 5);
}

#[test]
fn test_lists_reference_patches_by_identity() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp);
    let synth = MockSynth::new("A");
    let resolver = resolver(&[&synth]);
    let source = SourceInfo::BankDownload { bank: 0 };

    let batch = vec![
        incoming(&synth, &[0x01], "One", 0, source.clone()),
        incoming(&synth, &[0x02], "Two", 1, source.clone()),
        incoming(&synth, &[0x03], "Three", 2, source),
    ];
    db.merge_patches(&resolver, &batch, update::ALL, &NoProgress, true);

    assert!(db.create_list("set-1", "Live set"));
    for patch in &batch {
        assert!(db.append_to_list("set-1", patch));
    }

    let lists = db.all_lists();
    assert_eq!(lists.len(), 1);
    let list = db.get_list(&lists[0], &resolver);
    assert_eq!(list.name, "Live set");
    let names: Vec<_> = list.patches.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["One", "Two", "Three"]);

    // Filtering by list membership and ordering by list position.
    let mut filter = PatchFilter::all_for_synth("A");
    filter.list_id = Some("set-1".to_string());
    filter.order_by = OrderBy::ListPlace;
    let members = db.get_patches(&filter, &resolver, 0, -1);
    assert_eq!(members.len(), 3);
    assert_eq!(members[0].name, "One");
}

#[test]
fn test_json_interchange_roundtrip() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp);
    let synth = MockSynth::new("A");
    let resolver = resolver(&[&synth]);
    let source = SourceInfo::BankDownload { bank: 2 };

    let patch = incoming(&synth, &[0xf0, 0x43, 0x12, 0xf7], "Exported", 7, source);
    db.merge_patches(&resolver, &[patch.clone()], update::ALL, &NoProgress, true);

    let json = patchdb::codec::patch_to_json(&patch);
    assert_eq!(json.place, "7");
    assert_eq!(json.md5, patch.fingerprint);

    let rendered = serde_json::to_string(&json).unwrap();
    let parsed: patchdb::codec::PatchJson = serde_json::from_str(&rendered).unwrap();
    let imported = patchdb::codec::patch_from_json(synth.as_ref(), &parsed).unwrap();
    assert_eq!(imported.data, patch.data);
    assert_eq!(imported.fingerprint, patch.fingerprint);
    assert_eq!(imported.name, "Exported");
    assert_eq!(imported.program, 7);
}

#[test]
fn test_put_patch_reports_new_vs_updated() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp);
    let synth = MockSynth::new("A");
    let resolver = resolver(&[&synth]);

    let patch = incoming(
        &synth,
        &[0x11, 0x22],
        "Single",
        0,
        SourceInfo::EditBuffer,
    );
    assert!(db.put_patch(&resolver, &patch));
    assert!(!db.put_patch(&resolver, &patch));
    assert_eq!(db.count(&PatchFilter::all_for_synth("A")), 1);
}

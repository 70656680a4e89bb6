//! The in-memory catalog entry and its update mask.

use std::collections::BTreeSet;

use crate::category::Category;
use crate::source::SourceInfo;
use crate::synth::SynthAdapter;

/// Tri-state favorite marker, stored as INTEGER in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Favorite {
    /// No information either way; a merge keeps the existing value.
    DontKnow,
    No,
    Yes,
}

impl Favorite {
    pub fn from_stored(value: i64) -> Self {
        match value {
            0 => Favorite::No,
            1 => Favorite::Yes,
            _ => Favorite::DontKnow,
        }
    }

    pub fn as_stored(self) -> i64 {
        match self {
            Favorite::DontKnow => -1,
            Favorite::No => 0,
            Favorite::Yes => 1,
        }
    }
}

/// Bitmask selecting which columns an update may touch.
pub mod update {
    pub const NAME: u32 = 1;
    pub const CATEGORIES: u32 = 2;
    pub const HIDDEN: u32 = 4;
    pub const DATA: u32 = 8;
    pub const FAVORITE: u32 = 16;
    pub const ALL: u32 = NAME | CATEGORIES | HIDDEN | DATA | FAVORITE;
}

/// One patch plus its catalog metadata.
///
/// Identity within a synth is the adapter-computed fingerprint, never the
/// name: names collide freely across banks while the fingerprint is derived
/// from the canonicalized payload bytes.
#[derive(Debug, Clone)]
pub struct PatchHolder {
    /// Name of the synth adapter this patch belongs to.
    pub synth: String,
    /// Adapter-supplied content hash, hex, treated as opaque.
    pub fingerprint: String,
    pub name: String,
    /// Small integer distinguishing voice/layer/tuning etc.; adapter-defined.
    pub patch_type: i32,
    /// The opaque patch payload.
    pub data: Vec<u8>,
    pub favorite: Favorite,
    /// Soft delete flag.
    pub hidden: bool,
    /// Import batch this patch arrived with, when known.
    pub source_id: Option<String>,
    pub source_info: Option<SourceInfo>,
    /// Zero-based placement at capture time.
    pub bank: i32,
    pub program: i32,
    pub categories: BTreeSet<Category>,
    /// Categories the user has manually affirmed or denied. A set bit here
    /// protects the corresponding category bit from automatic re-tagging.
    pub user_decisions: BTreeSet<Category>,
}

impl PatchHolder {
    /// Build a holder for freshly captured payload bytes. The adapter
    /// canonicalizes the data and supplies the fingerprint.
    ///
    /// Returns `None` if the adapter rejects the payload.
    pub fn from_data(
        adapter: &dyn SynthAdapter,
        data: &[u8],
        name: impl Into<String>,
        bank: i32,
        program: i32,
        source_info: Option<SourceInfo>,
    ) -> Option<Self> {
        let canonical = adapter.patch_from_data(data, program)?;
        let fingerprint = adapter.fingerprint(&canonical);
        Some(Self {
            synth: adapter.name(),
            fingerprint,
            name: name.into(),
            patch_type: 0,
            data: canonical,
            favorite: Favorite::DontKnow,
            hidden: false,
            source_id: None,
            source_info,
            bank,
            program,
            categories: BTreeSet::new(),
            user_decisions: BTreeSet::new(),
        })
    }

    /// Display string of the provenance, empty when none was recorded.
    pub fn source_display(&self) -> String {
        self.source_info
            .as_ref()
            .map(|s| s.display_string(&self.synth))
            .unwrap_or_default()
    }
}

//! Patch provenance.
//!
//! Every patch remembers where it came from: a bank download, a file
//! import, or a transient edit-buffer capture. The provenance is stored
//! serialized in the `sourceInfo` column and also determines the import
//! batch a new patch is grouped under.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Import id shared by all edit-buffer captures of a synth.
pub const EDIT_BUFFER_IMPORT_ID: &str = "EditBufferImport";

/// Display name of the synthetic edit-buffer import batch.
pub const EDIT_BUFFER_IMPORT_NAME: &str = "Edit buffer imports";

/// Where a patch entered the catalog from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "camelCase")]
pub enum SourceInfo {
    /// Captured from the synth's edit buffer; has no bank/program position.
    EditBuffer,
    /// Downloaded from the synth, one bank at a time.
    BankDownload { bank: i32 },
    /// Imported from a sysex file on disk.
    FileImport {
        filename: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        full_path: Option<String>,
    },
}

impl SourceInfo {
    pub fn is_edit_buffer(&self) -> bool {
        matches!(self, SourceInfo::EditBuffer)
    }

    /// Serialized form stored in the `sourceInfo` column.
    pub fn to_stored(&self) -> String {
        // A tagged enum over plain fields cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse the stored form. Unknown or legacy provenance yields `None`;
    /// callers keep the raw string around so nothing is lost on rewrite.
    pub fn from_stored(stored: &str) -> Option<Self> {
        serde_json::from_str(stored).ok()
    }

    /// Human readable description used for import batch names.
    pub fn display_string(&self, synth_name: &str) -> String {
        match self {
            SourceInfo::EditBuffer => format!("Edit buffer import from {}", synth_name),
            SourceInfo::BankDownload { bank } => {
                format!("Bank {} from {}", bank + 1, synth_name)
            }
            SourceInfo::FileImport { filename, .. } => format!("Imported from file {}", filename),
        }
    }

    /// Stable identifier of the import batch this provenance belongs to.
    ///
    /// Derived by hashing the serialized provenance together with the synth
    /// name, so the same bank downloaded twice lands in the same batch.
    pub fn import_uid(&self, synth_name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(synth_name.as_bytes());
        hasher.update(self.to_stored().as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

//! The synth adapter seam.
//!
//! The engine never decodes vendor payloads itself. Everything
//! synth-specific — canonicalizing sysex bytes, computing the content
//! fingerprint, recognizing factory default names — is delegated through
//! this trait. The engine holds adapters only weakly; rows for synths no
//! longer registered are skipped with a diagnostic instead of crashing.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Capabilities a synthesizer plug-in offers to the catalog.
pub trait SynthAdapter: Send + Sync {
    /// Unique display name, also the `synth` column value.
    fn name(&self) -> String;

    /// Reconstitute the canonical patch bytes from a stored payload.
    ///
    /// The adapter may strip headers, checksums, or position-dependent
    /// bits. Returns `None` to reject the payload entirely.
    fn patch_from_data(&self, data: &[u8], program: i32) -> Option<Vec<u8>>;

    /// Stable content hash over canonical patch bytes, as a hex string.
    /// The engine treats the result as opaque.
    fn fingerprint(&self, data: &[u8]) -> String;

    /// Whether the given name is a vendor factory default ("INIT VOICE").
    /// Default names never overwrite a user-chosen name during merges.
    fn is_default_name(&self, _name: &str) -> bool {
        false
    }

    /// A synthesized display name for a patch with no stored name.
    fn default_name_for(&self, _data: &[u8], _program: i32) -> Option<String> {
        None
    }
}

/// Per-call map from synth name to a weak adapter handle, supplied by the
/// host alongside any filter that needs rows decoded.
pub type SynthResolver = HashMap<String, Weak<dyn SynthAdapter>>;

/// Build a resolver from strong adapter handles.
pub fn resolver_from(adapters: &[Arc<dyn SynthAdapter>]) -> SynthResolver {
    adapters
        .iter()
        .map(|a| (a.name(), Arc::downgrade(a)))
        .collect()
}

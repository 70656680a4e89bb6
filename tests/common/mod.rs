//! Shared test fixtures: a scriptable synth adapter.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use patchdb::{PatchHolder, SourceInfo, SynthAdapter, SynthResolver};

/// Test adapter with a switchable fingerprint algorithm (to simulate an
/// adapter release changing its canonicalization) and a fixed set of
/// vendor default names.
pub struct MockSynth {
    name: String,
    algorithm: AtomicU8,
    default_names: Vec<String>,
}

impl MockSynth {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            algorithm: AtomicU8::new(1),
            default_names: vec!["Init".to_string(), "INIT VOICE".to_string()],
        })
    }

    /// Switch the fingerprint algorithm; previously stored fingerprints
    /// will no longer match.
    pub fn set_algorithm(&self, version: u8) {
        self.algorithm.store(version, Ordering::SeqCst);
    }
}

impl SynthAdapter for MockSynth {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn patch_from_data(&self, data: &[u8], _program: i32) -> Option<Vec<u8>> {
        if data.is_empty() {
            return None;
        }
        Some(data.to_vec())
    }

    fn fingerprint(&self, data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update([self.algorithm.load(Ordering::SeqCst)]);
        hasher.update(data);
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    fn is_default_name(&self, name: &str) -> bool {
        self.default_names.iter().any(|d| d == name)
    }
}

/// Resolver over one or more mock synths.
pub fn resolver(synths: &[&Arc<MockSynth>]) -> SynthResolver {
    let adapters: Vec<Arc<dyn SynthAdapter>> = synths
        .iter()
        .map(|s| Arc::clone(*s) as Arc<dyn SynthAdapter>)
        .collect();
    patchdb::resolver_from(&adapters)
}

/// A holder as the import pipeline would produce it.
pub fn incoming(
    synth: &Arc<MockSynth>,
    data: &[u8],
    name: &str,
    program: i32,
    source: SourceInfo,
) -> PatchHolder {
    PatchHolder::from_data(synth.as_ref(), data, name, 0, program, Some(source))
        .expect("mock adapter accepts non-empty payloads")
}

//! Binary payload encoding and the JSON interchange format.
//!
//! Base64 (standard alphabet, no line wrapping) carries patch payloads
//! through JSON; the interchange object is what patch export/import files
//! are made of. Fields the current release does not know are preserved on
//! round-trip.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::patch::PatchHolder;
use crate::synth::SynthAdapter;

/// Encode binary payload bytes for JSON interchange.
pub fn encode_data(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a base64 payload. Byte-for-byte inverse of [`encode_data`].
pub fn decode_data(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}

/// One patch in the JSON interchange format.
///
/// `place` is the zero-based program number as a decimal string, a wire
/// compatibility requirement. Unknown fields collect in `extra` and are
/// written back verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchJson {
    pub synth: String,
    pub name: String,
    pub sysex: String,
    pub place: String,
    pub md5: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Render a holder into the interchange format.
pub fn patch_to_json(holder: &PatchHolder) -> PatchJson {
    PatchJson {
        synth: holder.synth.clone(),
        name: holder.name.clone(),
        sysex: encode_data(&holder.data),
        place: holder.program.to_string(),
        md5: holder.fingerprint.clone(),
        extra: serde_json::Map::new(),
    }
}

/// Reconstitute a holder from the interchange format.
///
/// The adapter canonicalizes the payload and recomputes the fingerprint;
/// the `md5` field of the input is advisory only. Returns `None` when the
/// payload does not decode or the adapter rejects it.
pub fn patch_from_json(adapter: &dyn SynthAdapter, json: &PatchJson) -> Option<PatchHolder> {
    let data = match decode_data(&json.sysex) {
        Ok(data) => data,
        Err(e) => {
            log::warn!("Skipping patch '{}': undecodable sysex field: {}", json.name, e);
            return None;
        }
    };
    let program = json.place.parse::<i32>().unwrap_or(0);
    let holder = PatchHolder::from_data(adapter, &data, json.name.clone(), 0, program, None);
    if holder.is_none() {
        log::warn!(
            "Skipping patch '{}': adapter {} rejected the payload",
            json.name,
            adapter.name()
        );
    }
    holder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        let payloads: [&[u8]; 4] = [b"", b"\x00", b"\xf0\x43\x00\x09\xf7", &[0xffu8; 300]];
        for payload in payloads {
            let encoded = encode_data(payload);
            assert!(!encoded.contains('\n'));
            assert_eq!(decode_data(&encoded).unwrap(), payload);
        }
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let input = r#"{"synth":"DX7","name":"BRASS 1","sysex":"8EMACfc=","place":"12","md5":"abc","futureField":{"nested":true}}"#;
        let parsed: PatchJson = serde_json::from_str(input).unwrap();
        assert_eq!(parsed.place, "12");
        assert!(parsed.extra.contains_key("futureField"));

        let rendered = serde_json::to_string(&parsed).unwrap();
        let reparsed: PatchJson = serde_json::from_str(&rendered).unwrap();
        assert_eq!(reparsed.extra, parsed.extra);
    }
}

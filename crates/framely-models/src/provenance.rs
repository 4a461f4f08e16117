//! Provenance records and deterministic parameter hashing.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Tool identity and effective parameters behind one piece of analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Provenance {
    /// Tool name (detector or pipeline component)
    pub tool: String,
    /// Tool version
    pub version: String,
    /// Model checkpoint, when the tool is model-backed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    /// Hash of the effective parameters (see [`params_hash`])
    pub params_hash: String,
    /// When the record was produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Provenance {
    /// Create a provenance record, hashing the given effective parameters.
    pub fn new(tool: impl Into<String>, version: impl Into<String>, params: &Value) -> Self {
        Self {
            tool: tool.into(),
            version: version.into(),
            checkpoint: None,
            params_hash: params_hash(params),
            timestamp: None,
        }
    }

    /// Create a provenance record with a precomputed hash (e.g. a file digest).
    pub fn with_hash(
        tool: impl Into<String>,
        version: impl Into<String>,
        params_hash: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            version: version.into(),
            checkpoint: None,
            params_hash: params_hash.into(),
            timestamp: None,
        }
    }

    /// Set the model checkpoint.
    pub fn with_checkpoint(mut self, checkpoint: impl Into<String>) -> Self {
        self.checkpoint = Some(checkpoint.into());
        self
    }

    /// Stamp the record with the current time.
    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(Utc::now());
        self
    }
}

/// SHA-256 of the canonical JSON encoding of `params`.
///
/// Object keys are sorted recursively before encoding, so two parameter sets
/// that differ only in key insertion order hash identically.
pub fn params_hash(params: &Value) -> String {
    let canonical = canonicalize(params);
    // Serializing a `Value` cannot fail.
    let encoded = serde_json::to_vec(&canonical).unwrap_or_default();
    sha256_hex(&encoded)
}

/// Lowercase hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key.clone(), canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_hash_ignores_key_order() {
        let mut a = Map::new();
        a.insert("tile".into(), json!({"size": 640, "stride": 512}));
        a.insert("conf".into(), json!(0.25));
        a.insert("classes".into(), json!(["person", "car"]));

        let mut b = Map::new();
        b.insert("classes".into(), json!(["person", "car"]));
        b.insert("conf".into(), json!(0.25));
        let mut tile = Map::new();
        tile.insert("stride".into(), json!(512));
        tile.insert("size".into(), json!(640));
        b.insert("tile".into(), Value::Object(tile));

        assert_eq!(params_hash(&Value::Object(a)), params_hash(&Value::Object(b)));
    }

    #[test]
    fn test_params_hash_sensitive_to_values() {
        let a = json!({"conf": 0.25});
        let b = json!({"conf": 0.3});
        assert_ne!(params_hash(&a), params_hash(&b));

        // Array order is significant.
        let a = json!({"order": ["sam2_off", "sr_off"]});
        let b = json!({"order": ["sr_off", "sam2_off"]});
        assert_ne!(params_hash(&a), params_hash(&b));
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_provenance_builders() {
        let prov = Provenance::new("yolo", "8.1", &json!({"conf": 0.25}))
            .with_checkpoint("yolov8x.pt")
            .stamped();
        assert_eq!(prov.tool, "yolo");
        assert_eq!(prov.checkpoint.as_deref(), Some("yolov8x.pt"));
        assert!(prov.timestamp.is_some());
        assert_eq!(prov.params_hash.len(), 64);
    }
}

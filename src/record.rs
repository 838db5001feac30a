//! Catalog record type shared by sources, snapshots, and the diff merger.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the primary-key attribute inside a serialized record.
pub const KEY_FIELD: &str = "objectID";

/// A keyed catalog document.
///
/// Records from the catalog source and the previous snapshot share the same
/// key space and are comparable field-by-field. Attribute values use
/// `serde_json::Value`, the recursive `Scalar | Array | Map` union the
/// field diff operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary catalog item identifier. Streams yield records in ascending
    /// byte-lexicographic order of this key.
    #[serde(rename = "objectID")]
    pub key: String,
    /// Attribute map, flat or nested.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record from a key and attribute map.
    pub fn new(key: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            key: key.into(),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_roundtrip() {
        let record = Record::new("sku-100", {
            let mut fields = Map::new();
            fields.insert("price".into(), json!(19.99));
            fields.insert("tags".into(), json!(["new", "sale"]));
            fields
        });

        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"objectID\":\"sku-100\""));

        let parsed: Record = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_record_key_is_flattened() {
        let parsed: Record =
            serde_json::from_str(r#"{"objectID":"a","name":"Anvil"}"#).unwrap();
        assert_eq!(parsed.key, "a");
        assert_eq!(parsed.fields.get("name"), Some(&json!("Anvil")));
        assert!(!parsed.fields.contains_key(KEY_FIELD));
    }
}

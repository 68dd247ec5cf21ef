//! Storage encoding for session payloads.
//!
//! Entries are split into two maps before serialization: structured records
//! go through their own binary form (carried as base64 next to their `KIND`
//! tag), everything else goes through serde_json untouched. The envelope is
//! itself JSON:
//!
//! ```text
//! {"v":1,"records":{"user":{"kind":"account","data":"AQAAAA..."}},"plain":{"cart":[1,2,3]}}
//! ```

use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::value::{Payload, RecordRegistry, Value};

/// Current envelope format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct EncodedRecord {
    kind: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u32,
    #[serde(default)]
    records: HashMap<String, EncodedRecord>,
    #[serde(default)]
    plain: HashMap<String, serde_json::Value>,
}

/// Encodes and decodes payloads, resolving record kinds through a registry.
#[derive(Debug, Clone, Default)]
pub struct PayloadCodec {
    registry: RecordRegistry,
}

impl PayloadCodec {
    /// Create a codec that can decode the record kinds in `registry`.
    pub fn new(registry: RecordRegistry) -> Self {
        Self { registry }
    }

    /// The record registry used for decoding.
    pub fn registry(&self) -> &RecordRegistry {
        &self.registry
    }

    /// Encode a payload into its storage form.
    pub fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        let mut envelope = Envelope {
            v: FORMAT_VERSION,
            records: HashMap::new(),
            plain: HashMap::new(),
        };

        for (key, value) in payload.iter() {
            match value {
                Value::Record(record) => {
                    envelope.records.insert(
                        key.clone(),
                        EncodedRecord {
                            kind: record.kind().to_string(),
                            data: STANDARD.encode(record.to_bytes()),
                        },
                    );
                }
                Value::Plain(v) => {
                    envelope.plain.insert(key.clone(), v.clone());
                }
            }
        }

        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Decode a payload from its storage form.
    ///
    /// Any malformation, unknown version or unregistered record kind is
    /// reported as [`SessionError::CorruptPayload`].
    pub fn decode(&self, bytes: &[u8]) -> Result<Payload> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| SessionError::CorruptPayload(format!("malformed envelope: {}", e)))?;

        if envelope.v != FORMAT_VERSION {
            return Err(SessionError::CorruptPayload(format!(
                "unsupported format version {}",
                envelope.v
            )));
        }

        let mut payload = Payload::new();
        for (key, value) in envelope.plain {
            payload.insert(key, Value::Plain(value));
        }

        for (key, encoded) in envelope.records {
            if payload.contains_key(&key) {
                return Err(SessionError::CorruptPayload(format!(
                    "key '{}' present as both record and plain value",
                    key
                )));
            }
            let bytes = STANDARD.decode(&encoded.data).map_err(|e| {
                SessionError::CorruptPayload(format!("record '{}' data: {}", key, e))
            })?;
            let record = self.registry.decode(&encoded.kind, &bytes)?;
            payload.insert(key, Value::Record(record));
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::tests::Account;
    use proptest::prelude::*;
    use serde_json::json;

    fn codec() -> PayloadCodec {
        PayloadCodec::new(RecordRegistry::new().with::<Account>())
    }

    #[test]
    fn test_mixed_payload_roundtrip() {
        let mut payload = Payload::new();
        payload.insert("expiration", Value::from("2026-10-25T08:30:00Z"));
        payload.insert("cart", Value::from(json!([1, 2, 3])));
        payload.insert("prefs", Value::from(json!({"theme": "dark", "n": null})));
        payload.insert("user", Value::record(Account { id: 42, name: "ada".into() }));

        let codec = codec();
        let bytes = codec.encode(&payload).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_records_are_not_json_serialized() {
        let mut payload = Payload::new();
        payload.insert("user", Value::record(Account { id: 1, name: "ada".into() }));

        let bytes = codec().encode(&payload).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(raw["v"], json!(FORMAT_VERSION));
        assert_eq!(raw["records"]["user"]["kind"], json!("account"));
        assert!(raw["plain"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = codec().decode(b"\x80not json").unwrap_err();
        assert!(matches!(err, SessionError::CorruptPayload(_)));
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let err = codec().decode(br#"{"v":9,"plain":{}}"#).unwrap_err();
        assert!(matches!(err, SessionError::CorruptPayload(_)));
    }

    #[test]
    fn test_unregistered_kind_is_corrupt() {
        let mut payload = Payload::new();
        payload.insert("user", Value::record(Account { id: 1, name: "ada".into() }));
        let bytes = codec().encode(&payload).unwrap();

        let bare = PayloadCodec::default();
        assert!(matches!(
            bare.decode(&bytes),
            Err(SessionError::CorruptPayload(_))
        ));
    }

    #[test]
    fn test_duplicate_key_is_corrupt() {
        let bytes = br#"{"v":1,"plain":{"k":1},"records":{"k":{"kind":"account","data":""}}}"#;
        assert!(matches!(
            codec().decode(bytes),
            Err(SessionError::CorruptPayload(_))
        ));
    }

    #[test]
    fn test_floats_and_large_integers_are_exact() {
        let tiny = f64::from_bits(0x330e_4d99_f18c_755d);
        let mut payload = Payload::new();
        payload.insert("tiny", Value::from(json!(tiny)));
        payload.insert("third", Value::from(json!(1.0_f64 / 3.0)));
        payload.insert("big", Value::from(json!(u64::MAX)));
        let codec = codec();

        let decoded = codec.decode(&codec.encode(&payload).unwrap()).unwrap();

        let bits = decoded.get_as::<f64>("tiny").unwrap().unwrap().to_bits();
        assert_eq!(bits, tiny.to_bits());
        assert_eq!(decoded.get_as::<u64>("big").unwrap(), Some(u64::MAX));
        assert_eq!(decoded, payload);
    }

    fn plain_value() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            any::<u64>().prop_map(serde_json::Value::from),
            any::<f64>()
                .prop_filter("finite", |x| x.is_finite())
                .prop_map(serde_json::Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(serde_json::Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
                prop::collection::hash_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn session_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            plain_value().prop_map(Value::Plain),
            (any::<u64>(), "[a-z]{0,12}")
                .prop_map(|(id, name)| Value::record(Account { id, name })),
        ]
    }

    proptest! {
        /// Property: decode(encode(p)) == p for any mix of plain and record values.
        #[test]
        fn roundtrip_law(entries in prop::collection::hash_map("[a-z_]{1,10}", session_value(), 0..8)) {
            let payload: Payload = entries.into_iter().collect();
            let codec = codec();
            let bytes = codec.encode(&payload).unwrap();
            prop_assert_eq!(codec.decode(&bytes).unwrap(), payload);
        }
    }
}

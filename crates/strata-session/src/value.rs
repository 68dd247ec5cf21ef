//! Session payload values.
//!
//! A payload maps string keys to one of two value kinds:
//!
//! - [`Value::Plain`]: any JSON-representable value (numbers, strings,
//!   timestamps rendered as strings, nested arrays and objects). Encoded with
//!   the general-purpose serializer.
//! - [`Value::Record`]: an application-defined entity implementing [`Record`].
//!   Encoded through the record's own compact binary form and resolved on
//!   decode through a [`RecordRegistry`].

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, SessionError};

/// Payload key holding the session expiration timestamp.
pub const EXPIRATION_KEY: &str = "expiration";

// ─────────────────────────────────────────────────────────────────────────────
// Structured records
// ─────────────────────────────────────────────────────────────────────────────

/// An application entity stored with a schema-aware binary encoding.
///
/// `KIND` must be stable across deployments: it is written next to the
/// encoded bytes and used to pick the decoder when the payload is loaded.
pub trait Record: fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Stable tag identifying this record type in stored payloads.
    const KIND: &'static str;

    /// Encode into the record's compact binary form.
    fn to_bytes(&self) -> Vec<u8>;

    /// Decode from bytes produced by [`Record::to_bytes`].
    ///
    /// Implementations should return [`SessionError::CorruptPayload`] on
    /// malformed input.
    fn from_bytes(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

/// Object-safe view of a [`Record`].
trait ErasedRecord: fmt::Debug + Send + Sync {
    fn kind(&self) -> &'static str;
    fn to_bytes(&self) -> Vec<u8>;
    fn as_any(&self) -> &dyn Any;
    fn eq_erased(&self, other: &dyn ErasedRecord) -> bool;
}

impl<T: Record> ErasedRecord for T {
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn to_bytes(&self) -> Vec<u8> {
        Record::to_bytes(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_erased(&self, other: &dyn ErasedRecord) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }
}

/// A type-erased, cheaply clonable structured record.
#[derive(Clone)]
pub struct RecordValue(Arc<dyn ErasedRecord>);

impl RecordValue {
    /// Wrap a record.
    pub fn new<T: Record>(record: T) -> Self {
        Self(Arc::new(record))
    }

    /// The record's `KIND` tag.
    pub fn kind(&self) -> &'static str {
        self.0.kind()
    }

    /// Encode the record into its binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    /// Borrow the concrete record if it is a `T`.
    pub fn downcast_ref<T: Record>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl PartialEq for RecordValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_erased(&*other.0)
    }
}

type Decoder = fn(&[u8]) -> Result<RecordValue>;

fn decode_as<T: Record>(bytes: &[u8]) -> Result<RecordValue> {
    T::from_bytes(bytes).map(RecordValue::new)
}

/// Maps record `KIND` tags to their decoders.
///
/// Every record type that may appear in a stored payload must be registered,
/// otherwise loading that payload fails with [`SessionError::CorruptPayload`].
#[derive(Clone, Default)]
pub struct RecordRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl RecordRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type (builder style).
    pub fn with<T: Record>(mut self) -> Self {
        self.register::<T>();
        self
    }

    /// Register a record type.
    pub fn register<T: Record>(&mut self) -> &mut Self {
        self.decoders.insert(T::KIND, decode_as::<T>);
        self
    }

    /// Check whether a `KIND` tag is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Decode record bytes tagged with `kind`.
    pub fn decode(&self, kind: &str, bytes: &[u8]) -> Result<RecordValue> {
        let decoder = self.decoders.get(kind).ok_or_else(|| {
            SessionError::CorruptPayload(format!("unregistered record kind '{}'", kind))
        })?;
        decoder(bytes)
    }
}

impl fmt::Debug for RecordRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().collect();
        kinds.sort();
        f.debug_struct("RecordRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// A single session variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// JSON-like value stored through the general-purpose serializer.
    Plain(serde_json::Value),
    /// Structured record stored through its schema-aware encoding.
    Record(RecordValue),
}

impl Value {
    /// Convert any serializable value into a plain value.
    pub fn plain<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Plain(serde_json::to_value(value)?))
    }

    /// Wrap a structured record.
    pub fn record<T: Record>(record: T) -> Self {
        Self::Record(RecordValue::new(record))
    }

    /// Borrow the plain JSON value, if this is one.
    pub fn as_plain(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Plain(v) => Some(v),
            Value::Record(_) => None,
        }
    }

    /// Borrow the concrete record, if this is a record of type `T`.
    pub fn as_record<T: Record>(&self) -> Option<&T> {
        match self {
            Value::Record(r) => r.downcast_ref::<T>(),
            Value::Plain(_) => None,
        }
    }

    /// Whether this is a structured record.
    pub fn is_record(&self) -> bool {
        matches!(self, Value::Record(_))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Plain(value)
    }
}

impl From<RecordValue> for Value {
    fn from(value: RecordValue) -> Self {
        Value::Record(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Plain(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Plain(serde_json::Value::String(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Plain(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Plain(value.into())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Plain(serde_json::Value::String(format_timestamp(value)))
    }
}

/// Render a timestamp the way payload timestamps are stored.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a stored payload timestamp.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_plain()?.as_str()?;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload
// ─────────────────────────────────────────────────────────────────────────────

/// Unordered mapping of session variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    entries: HashMap<String, Value>,
}

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a payload holding only an expiration timestamp.
    pub fn with_expiration(expiration: DateTime<Utc>) -> Self {
        let mut payload = Self::new();
        payload.set_expiration(expiration);
        payload
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, Value> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deserialize a plain value into `T`.
    ///
    /// Returns `Ok(None)` when the key is absent or holds a record.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.entries.get(key).and_then(Value::as_plain) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    /// Borrow a structured record of type `T`.
    pub fn get_record<T: Record>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(Value::as_record::<T>)
    }

    /// The parsed `expiration` timestamp, if present and well-formed.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.entries.get(EXPIRATION_KEY).and_then(parse_timestamp)
    }

    /// Overwrite the `expiration` timestamp.
    pub fn set_expiration(&mut self, expiration: DateTime<Utc>) {
        self.entries
            .insert(EXPIRATION_KEY.to_string(), Value::from(expiration));
    }
}

impl FromIterator<(String, Value)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Payload {
    type Item = (String, Value);
    type IntoIter = hash_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        write!(f, "{{")?;
        for (i, key) in keys.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &self.entries[key] {
                Value::Plain(v) => write!(f, "{}: {}", key, v)?,
                Value::Record(r) => write!(f, "{}: <{}>", key, r.kind())?,
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Minimal record used across the crate's tests.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Account {
        pub id: u64,
        pub name: String,
    }

    impl Record for Account {
        const KIND: &'static str = "account";

        fn to_bytes(&self) -> Vec<u8> {
            let mut out = self.id.to_le_bytes().to_vec();
            out.extend_from_slice(self.name.as_bytes());
            out
        }

        fn from_bytes(bytes: &[u8]) -> Result<Self> {
            if bytes.len() < 8 {
                return Err(SessionError::CorruptPayload("account too short".into()));
            }
            let (id, name) = bytes.split_at(8);
            let id = u64::from_le_bytes(id.try_into().expect("split at 8"));
            let name = String::from_utf8(name.to_vec())
                .map_err(|e| SessionError::CorruptPayload(e.to_string()))?;
            Ok(Self { id, name })
        }
    }

    #[test]
    fn test_record_equality_dispatches_on_type() {
        let a = Value::record(Account { id: 1, name: "ada".into() });
        let b = Value::record(Account { id: 1, name: "ada".into() });
        let c = Value::record(Account { id: 2, name: "ada".into() });

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Value::from("ada"));
    }

    #[test]
    fn test_registry_rejects_unknown_kind() {
        let registry = RecordRegistry::new().with::<Account>();
        assert!(registry.contains("account"));

        let err = registry.decode("invoice", b"").unwrap_err();
        assert!(matches!(err, SessionError::CorruptPayload(_)));
    }

    #[test]
    fn test_get_as_and_get_record() {
        let mut payload = Payload::new();
        payload.insert("cart", Value::from(json!([1, 2, 3])));
        payload.insert("who", Value::record(Account { id: 7, name: "lin".into() }));

        let cart: Vec<u32> = payload.get_as("cart").unwrap().unwrap();
        assert_eq!(cart, vec![1, 2, 3]);
        assert_eq!(payload.get_record::<Account>("who").unwrap().id, 7);
        assert!(payload.get_as::<u32>("who").unwrap().is_none());
        assert!(payload.get_record::<Account>("cart").is_none());
    }

    #[test]
    fn test_expiration_roundtrips_through_string() {
        let ts = DateTime::parse_from_rfc3339("2026-10-25T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let payload = Payload::with_expiration(ts);

        assert_eq!(payload.expiration(), Some(ts));
        assert_eq!(
            payload.get(EXPIRATION_KEY),
            Some(&Value::from("2026-10-25T08:30:00Z"))
        );
    }

    #[test]
    fn test_display_sorts_keys_and_hides_record_bytes() {
        let mut payload = Payload::new();
        payload.insert("b", Value::from(2_i64));
        payload.insert("a", Value::record(Account { id: 1, name: "x".into() }));

        assert_eq!(payload.to_string(), "{a: <account>, b: 2}");
    }
}

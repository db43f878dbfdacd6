//! Cache Values
//!
//! Values are an explicit tagged variant picked by the caller, so backends
//! and serializers never inspect runtime types to decide how to pack them.

use bytes::Bytes;

/// A value stored in or returned from a cache
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// Raw byte sequence, storable without a serializer
    Bytes(Bytes),
    /// UTF-8 text
    Text(String),
    /// Structured value that needs a serializer to be stored
    Json(serde_json::Value),
}

impl CacheValue {
    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            CacheValue::Bytes(_) => "bytes",
            CacheValue::Text(_) => "text",
            CacheValue::Json(_) => "json",
        }
    }

    /// Borrow the raw bytes, if this is a byte value
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            CacheValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Borrow the text, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the structured value, if this is a JSON value
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            CacheValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Build a JSON value from anything serde can serialize
    pub fn json<T: serde::Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(CacheValue::Json)
    }

    /// Decode a JSON value into `T`
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        match self {
            CacheValue::Json(v) => T::deserialize(v),
            CacheValue::Text(s) => serde_json::from_str(s),
            CacheValue::Bytes(b) => serde_json::from_slice(b),
        }
    }
}

impl From<Bytes> for CacheValue {
    fn from(b: Bytes) -> Self {
        CacheValue::Bytes(b)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(b: Vec<u8>) -> Self {
        CacheValue::Bytes(Bytes::from(b))
    }
}

impl From<&'static [u8]> for CacheValue {
    fn from(b: &'static [u8]) -> Self {
        CacheValue::Bytes(Bytes::from_static(b))
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        CacheValue::Text(s)
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        CacheValue::Text(s.to_string())
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(v: serde_json::Value) -> Self {
        CacheValue::Json(v)
    }
}

// =============================================================================
// Tests
// =============================================================================

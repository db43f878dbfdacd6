//! Value Serializers
//!
//! A serializer turns a [`CacheValue`] into the opaque byte payload a backend
//! stores, and back. Both directions receive the cache key so encodings can
//! depend on it.

use std::fmt;
use std::sync::Arc;

use super::value::CacheValue;
use crate::error::{Error, Result};

/// Pluggable value serialization capability
pub trait Serializer: Send + Sync {
    /// Encode `value` stored under `key`
    fn serialize(&self, key: &str, value: &CacheValue) -> Result<Vec<u8>>;

    /// Decode the payload stored under `key`
    fn deserialize(&self, key: &str, payload: &[u8]) -> Result<CacheValue>;
}

/// How a backend encodes values, fixed when the backend is built
#[derive(Clone, Default)]
pub enum Codec {
    /// No serializer; each backend stores only the variants it holds natively
    #[default]
    Raw,
    /// Every value goes through the serializer
    Serializer(Arc<dyn Serializer>),
}

impl Codec {
    /// Codec using `serializer`
    pub fn with_serializer(serializer: impl Serializer + 'static) -> Self {
        Codec::Serializer(Arc::new(serializer))
    }

    /// True when no serializer is configured
    pub fn is_raw(&self) -> bool {
        matches!(self, Codec::Raw)
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Raw => write!(f, "Codec::Raw"),
            Codec::Serializer(_) => write!(f, "Codec::Serializer(..)"),
        }
    }
}

impl From<Arc<dyn Serializer>> for Codec {
    fn from(serializer: Arc<dyn Serializer>) -> Self {
        Codec::Serializer(serializer)
    }
}

/// JSON serializer backed by serde_json
///
/// Structured values and text are written as JSON documents. Byte values are
/// accepted only if they already hold a JSON document. Decoding always yields
/// [`CacheValue::Json`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, key: &str, value: &CacheValue) -> Result<Vec<u8>> {
        match value {
            CacheValue::Json(v) => serde_json::to_vec(v),
            CacheValue::Text(s) => serde_json::to_vec(s),
            CacheValue::Bytes(b) => {
                serde_json::from_slice::<serde_json::Value>(b).map(|_| b.to_vec())
            }
        }
        .map_err(|e| Error::serialization(key, e))
    }

    fn deserialize(&self, key: &str, payload: &[u8]) -> Result<CacheValue> {
        serde_json::from_slice(payload)
            .map(CacheValue::Json)
            .map_err(|e| Error::serialization(key, e))
    }
}

// =============================================================================
// Tests
// =============================================================================

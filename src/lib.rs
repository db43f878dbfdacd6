//! kvcache - Key-Value Cache with TTL Expiry
//!
//! A key-value cache contract with two interchangeable backends: an
//! in-process concurrent map and a persistent SQLite file. Both support
//! per-entry TTLs, lazy expiry on read, periodic background reclamation and
//! an optional pluggable value serializer.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use kvcache::{Cache, CacheValue, MemoryCache};
//!
//! # async fn demo() -> kvcache::Result<()> {
//! let cache = MemoryCache::new()?;
//! cache.set("a", CacheValue::from(b"1".as_slice()), Duration::from_secs(3600)).await?;
//! assert_eq!(cache.get("a").await?, CacheValue::from(b"1".as_slice()));
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Cache contract, backends and serializers
//! - [`error`] - Error types
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the embedding application.

pub mod cache;
pub mod error;

// Re-export commonly used types
pub use cache::{
    Cache, CacheExt, CacheValue, Codec, JsonSerializer, MemoryCache, MemoryCacheConfig,
    MemoryCacheStats, Serializer, SqliteCache, SqliteCacheConfig, Supplier,
};
pub use error::{BoxError, Error, Result};

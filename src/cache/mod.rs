//! Key-Value Cache with TTL Expiry
//!
//! One contract, two interchangeable backends.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Cache contract (trait)                       │
//! │          get · set · del · has · set_with_func                   │
//! ├───────────────────────────────┬──────────────────────────────────┤
//! │  MemoryCache                  │  SqliteCache                     │
//! │  ┌─────────────────────────┐  │  ┌────────────────────────────┐  │
//! │  │ DashMap<String, Entry>  │  │  │ cache(key, value,          │  │
//! │  │ Instant deadlines       │  │  │       expires_at)  WAL     │  │
//! │  └─────────────────────────┘  │  └────────────────────────────┘  │
//! │           │                   │              │                   │
//! │       Sweeper (1 min)         │          Sweeper (1 min)         │
//! └───────────────────────────────┴──────────────────────────────────┘
//!                         optional Serializer
//! ```
//!
//! # Expiry
//!
//! - A zero TTL means "never expire"
//! - Reads treat an expired entry as absent and remove it
//! - A background sweeper removes expired entries nobody reads

mod contract;
mod memory;
mod proptest;
mod serializer;
mod sqlite;
mod sweeper;
mod value;

pub use contract::{Cache, CacheExt, Supplier};
pub use memory::{MemoryCache, MemoryCacheConfig, MemoryCacheStats};
pub use serializer::{Codec, JsonSerializer, Serializer};
pub use sqlite::{SqliteCache, SqliteCacheConfig};
pub use value::CacheValue;

use std::time::Duration;

/// Default interval between background sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Lifetime given to in-process entries stored with a zero TTL (~99 years)
pub const NEVER_EXPIRE: Duration = Duration::from_secs(99 * 365 * 24 * 60 * 60);

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_sweep_interval() {
        assert_eq!(DEFAULT_SWEEP_INTERVAL, Duration::from_secs(60));
    }

    #[test]
    fn test_never_expire_is_far_future() {
        assert!(NEVER_EXPIRE > Duration::from_secs(98 * 365 * 24 * 3600));
    }

    #[tokio::test]
    async fn test_backends_are_interchangeable() {
        let dir = tempfile::tempdir().unwrap();

        let backends: Vec<Arc<dyn Cache>> = vec![
            Arc::new(MemoryCache::new().unwrap()),
            Arc::new(SqliteCache::open(dir.path().join("swap.db")).await.unwrap()),
        ];

        for cache in backends {
            let value = CacheValue::from(b"1".as_slice());
            cache.set("a", value.clone(), Duration::from_secs(3600)).await.unwrap();
            assert_eq!(cache.get("a").await.unwrap(), value);
            assert!(cache.has("a").await.unwrap());

            cache.del("a").await.unwrap();
            assert!(cache.get("a").await.unwrap_err().is_not_found());
            assert!(!cache.has("a").await.unwrap());
        }
    }
}

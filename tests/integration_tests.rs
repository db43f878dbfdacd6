//! kvcache Integration Tests
//!
//! Exercises the public cache contract against both backends:
//! - Feature 1: TTL expiry and lazy reclamation
//! - Feature 2: Compute operations
//! - Feature 3: Persistence and lifecycle

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use kvcache::{
    BoxError, Cache, CacheExt, CacheValue, Codec, Error, JsonSerializer, MemoryCache,
    MemoryCacheConfig, SqliteCache, SqliteCacheConfig,
};

const HOUR: Duration = Duration::from_secs(3600);

fn bytes(s: &'static str) -> CacheValue {
    CacheValue::from(s.as_bytes())
}

// =============================================================================
// Feature 1: TTL Expiry
// =============================================================================

mod expiry_tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get_before_ttl() {
        let cache = MemoryCache::new().unwrap();

        cache.set("a", bytes("1"), HOUR).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), bytes("1"));
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_found_without_sweep() {
        let cache = MemoryCache::new().unwrap();

        cache.set("b", bytes("2"), Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = cache.get("b").await.unwrap_err();
        assert_matches!(err, Error::NotFound { ref key } if key == "b");
        assert_eq!(err.to_string(), "cache key not exists. key=b");
    }

    #[tokio::test]
    async fn test_del_then_get() {
        let cache = MemoryCache::new().unwrap();

        cache.set("a", bytes("1"), Duration::ZERO).await.unwrap();
        cache.del("a").await.unwrap();
        assert!(cache.get("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_has_agrees_with_get() {
        let dir = tempfile::tempdir().unwrap();
        let backends: Vec<Arc<dyn Cache>> = vec![
            Arc::new(MemoryCache::new().unwrap()),
            Arc::new(SqliteCache::open(dir.path().join("has.db")).await.unwrap()),
        ];

        for cache in backends {
            cache.set("live", bytes("v"), HOUR).await.unwrap();
            cache.set("gone", bytes("v"), Duration::from_millis(1)).await.unwrap();
            cache.del("gone").await.unwrap();

            for key in ["live", "gone", "never-set"] {
                let has = cache.has(key).await.unwrap();
                assert_eq!(has, cache.get(key).await.is_ok(), "key {}", key);
            }
        }
    }

    #[tokio::test]
    async fn test_zero_ttl_survives() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryCache::new().unwrap();
        let sqlite = SqliteCache::open(dir.path().join("forever.db")).await.unwrap();

        memory.set("k", bytes("v"), Duration::ZERO).await.unwrap();
        sqlite.set("k", bytes("v"), Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(memory.purge_expired(), 0);
        assert_eq!(sqlite.purge_expired().await.unwrap(), 0);
        assert_eq!(memory.get("k").await.unwrap(), bytes("v"));
        assert_eq!(sqlite.get("k").await.unwrap(), bytes("v"));
        sqlite.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_disjoint_keys() {
        let cache = Arc::new(MemoryCache::new().unwrap());

        cache.set("bystander", bytes("untouched"), HOUR).await.unwrap();

        let tasks = (0..32).map(|i| {
            let cache = Arc::clone(&cache);
            async move {
                let key = format!("worker-{}", i);
                let value = CacheValue::from(format!("value-{}", i).into_bytes());
                cache.set(&key, value.clone(), HOUR).await.unwrap();
                assert_eq!(cache.get(&key).await.unwrap(), value);
                if i % 2 == 0 {
                    cache.del(&key).await.unwrap();
                }
            }
        });
        join_all(tasks).await;

        assert_eq!(cache.len(), 17);
        assert_eq!(cache.get("bystander").await.unwrap(), bytes("untouched"));
    }

    #[tokio::test]
    async fn test_periodic_sweep_reclaims() {
        let config = MemoryCacheConfig {
            name: "integration".into(),
            sweep_interval: Duration::from_millis(25),
        };
        let cache = MemoryCache::with_config(config, Codec::Raw).unwrap();

        for i in 0..10 {
            cache
                .set(&format!("k{}", i), bytes("v"), Duration::from_millis(5))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.is_empty());
        assert_eq!(cache.stats().reclaimed, 10);
    }
}

// =============================================================================
// Feature 2: Compute Operations
// =============================================================================

mod compute_tests {
    use super::*;

    #[tokio::test]
    async fn test_set_with_func_runs_every_time() {
        let cache = MemoryCache::new().unwrap();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .set_with(
                    "c",
                    || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, BoxError>(bytes("computed"))
                    },
                    HOUR,
                )
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("c").await.unwrap(), bytes("computed"));
    }

    #[tokio::test]
    async fn test_supplier_error_is_downcastable() {
        #[derive(Debug)]
        struct UpstreamDown;

        impl std::fmt::Display for UpstreamDown {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "upstream down")
            }
        }

        impl std::error::Error for UpstreamDown {}

        let cache = MemoryCache::new().unwrap();
        let err = cache
            .set_with("k", || Err::<CacheValue, _>(UpstreamDown), HOUR)
            .await
            .unwrap_err();

        match err {
            Error::Compute(source) => assert!(source.downcast_ref::<UpstreamDown>().is_some()),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!cache.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_or_set_with_reuses_live_value() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::open(dir.path().join("gos.db")).await.unwrap();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_set_with(
                    "k",
                    || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, BoxError>(CacheValue::from("once"))
                    },
                    HOUR,
                )
                .await
                .unwrap();
            assert_eq!(value, CacheValue::from("once"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        cache.close().await;
    }

    #[tokio::test]
    async fn test_get_or_set_with_propagates_non_miss_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::open(dir.path().join("closed.db")).await.unwrap();
        cache.close().await;

        let err = cache
            .get_or_set_with("k", || Ok::<_, BoxError>(CacheValue::from("v")), HOUR)
            .await
            .unwrap_err();
        assert_matches!(err, Error::Closed);
    }
}

// =============================================================================
// Feature 3: Persistence and Lifecycle
// =============================================================================

mod persistence_tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        scopes: Vec<String>,
    }

    #[tokio::test]
    async fn test_restart_durability() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("durable.db");

        let first = SqliteCache::open(&path).await.unwrap();
        first.set("p", CacheValue::from("v"), HOUR).await.unwrap();
        first.close().await;

        let second = SqliteCache::open(&path).await.unwrap();
        assert_eq!(second.get("p").await.unwrap(), CacheValue::from("v"));
        second.close().await;
    }

    #[tokio::test]
    async fn test_structured_values_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteCacheConfig::new(dir.path().join("json.db"));
        let session = Session {
            user: "ada".into(),
            scopes: vec!["read".into(), "write".into()],
        };

        let first = SqliteCache::open_with(config.clone(), Codec::with_serializer(JsonSerializer))
            .await
            .unwrap();
        first
            .set("session", CacheValue::json(&session).unwrap(), HOUR)
            .await
            .unwrap();
        first.close().await;

        let second = SqliteCache::open_with(config, Codec::with_serializer(JsonSerializer))
            .await
            .unwrap();
        let restored: Session = second.get("session").await.unwrap().decode().unwrap();
        assert_eq!(restored, session);
        second.close().await;
    }

    #[tokio::test]
    async fn test_closed_store_fails_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::open(dir.path().join("c.db")).await.unwrap();
        cache.close().await;

        let err = cache.get("anything").await.unwrap_err();
        assert_matches!(err, Error::Closed);
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_memory_shutdown_stops_sweeper() {
        let cache = MemoryCache::new().unwrap();
        assert!(cache.is_sweeping());

        cache.shutdown().await;
        assert!(!cache.is_sweeping());
        cache.set("still", bytes("works"), HOUR).await.unwrap();
        assert_eq!(cache.get("still").await.unwrap(), bytes("works"));
    }

    #[tokio::test]
    async fn test_operation_respects_caller_timeout() {
        let cache = MemoryCache::new().unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), cache.set("k", bytes("v"), HOUR)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}

//! Property-Based Tests for the Cache Backends
//!
//! Drives the in-process backend with random operation sequences and checks
//! it against a plain `HashMap` model.
//!
//! # Test Properties
//!
//! 1. **Last write wins**: `get` returns the value of the latest `set`
//! 2. **Deletion**: after `del`, `get` is a miss
//! 3. **Has/Get agreement**: `has` is true iff `get` succeeds
//! 4. **Key isolation**: operations on one key never disturb another

#![cfg(test)]

use std::collections::HashMap;
use std::time::Duration;

use proptest::prelude::*;

use super::{Cache, CacheValue, MemoryCache};

// =============================================================================
// Property Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Set { key: u8, value: Vec<u8>, forever: bool },
    Del { key: u8 },
    Get { key: u8 },
    Has { key: u8 },
}

/// Keys drawn from a small space so operations collide
fn key_strategy() -> impl Strategy<Value = u8> {
    0u8..6
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (key_strategy(), prop::collection::vec(any::<u8>(), 0..32), any::<bool>())
            .prop_map(|(key, value, forever)| Op::Set { key, value, forever }),
        key_strategy().prop_map(|key| Op::Del { key }),
        key_strategy().prop_map(|key| Op::Get { key }),
        key_strategy().prop_map(|key| Op::Has { key }),
    ]
}

fn key_name(key: u8) -> String {
    format!("key-{}", key)
}

// =============================================================================
// Model Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_memory_cache_matches_model(ops in prop::collection::vec(op_strategy(), 1..60)) {
        tokio_test::block_on(async {
            let cache = MemoryCache::new().unwrap();
            let mut model: HashMap<u8, Vec<u8>> = HashMap::new();

            for op in ops {
                match op {
                    Op::Set { key, value, forever } => {
                        let ttl = if forever { Duration::ZERO } else { Duration::from_secs(3600) };
                        cache
                            .set(&key_name(key), CacheValue::from(value.clone()), ttl)
                            .await
                            .unwrap();
                        model.insert(key, value);
                    }
                    Op::Del { key } => {
                        cache.del(&key_name(key)).await.unwrap();
                        model.remove(&key);
                    }
                    Op::Get { key } => {
                        match (cache.get(&key_name(key)).await, model.get(&key)) {
                            (Ok(got), Some(want)) => {
                                assert_eq!(got, CacheValue::from(want.clone()));
                            }
                            (Err(e), None) => assert!(e.is_not_found()),
                            (got, want) => panic!("cache {:?} vs model {:?}", got, want),
                        }
                    }
                    Op::Has { key } => {
                        let has = cache.has(&key_name(key)).await.unwrap();
                        assert_eq!(has, model.contains_key(&key));
                        assert_eq!(has, cache.get(&key_name(key)).await.is_ok());
                    }
                }
            }

            assert_eq!(cache.len(), model.len());
        });
    }
}

//! In-Process Cache Backend
//!
//! Entries live in a concurrent hashmap and are checked for expiry on every
//! read. A background sweeper removes expired entries that nobody reads.
//!
//! # Design
//!
//! - DashMap for lock-free concurrent access, no external lock
//! - Payloads are stored encoded, so a serializer sees every write
//! - "Never expire" is a deadline 99 years out
//! - Lazy removal only drops the entry it saw expire, never a fresh replacement

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, instrument};

use super::contract::Cache;
use super::serializer::Codec;
use super::sweeper::Sweeper;
use super::value::CacheValue;
use super::{DEFAULT_SWEEP_INTERVAL, NEVER_EXPIRE};
use crate::error::{Error, Result};

/// In-process cache configuration
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Name recorded in logs
    pub name: String,
    /// How often expired entries are reclaimed
    pub sweep_interval: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// A stored value and its deadline
#[derive(Debug, Clone)]
struct Entry {
    payload: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn new(payload: Bytes, ttl: Duration) -> Self {
        let ttl = if ttl.is_zero() {
            NEVER_EXPIRE
        } else {
            ttl.min(NEVER_EXPIRE)
        };

        Self {
            payload,
            expires_at: Instant::now() + ttl,
        }
    }

    #[inline]
    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counters shared with the sweeper
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    reclaimed: AtomicU64,
}

/// In-process cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCacheStats {
    /// Entries physically present, live or expired
    pub entries: usize,
    /// Successful lookups
    pub hits: u64,
    /// Lookups that found nothing live
    pub misses: u64,
    /// Expired entries removed by reads or sweeps
    pub reclaimed: u64,
}

/// In-process cache backend
pub struct MemoryCache {
    /// Entry storage
    entries: Arc<DashMap<String, Entry>>,
    /// Value encoding
    codec: Codec,
    /// Configuration
    config: MemoryCacheConfig,
    /// Hit/miss/reclaim counters
    counters: Arc<Counters>,
    /// Background reclamation task
    sweeper: Sweeper,
}

impl MemoryCache {
    /// Create a raw-bytes cache with default configuration.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new() -> Result<Self> {
        Self::with_config(MemoryCacheConfig::default(), Codec::Raw)
    }

    /// Create a cache with custom configuration and codec
    pub fn with_config(config: MemoryCacheConfig, codec: Codec) -> Result<Self> {
        let entries: Arc<DashMap<String, Entry>> = Arc::new(DashMap::new());
        let counters = Arc::new(Counters::default());

        let sweep_entries = Arc::clone(&entries);
        let sweep_counters = Arc::clone(&counters);
        let sweeper = Sweeper::spawn(&config.name, config.sweep_interval, move || {
            let reclaimed = purge(&sweep_entries, &sweep_counters);
            async move { Ok(reclaimed) }
        })?;

        debug!(cache = %config.name, raw = codec.is_raw(), "Created in-process cache");

        Ok(Self {
            entries,
            codec,
            config,
            counters,
            sweeper,
        })
    }

    /// Name of this cache
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Run one reclamation pass now and return how many entries it removed
    pub fn purge_expired(&self) -> u64 {
        purge(&self.entries, &self.counters)
    }

    /// Entries physically present, including expired ones not yet reclaimed
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> MemoryCacheStats {
        MemoryCacheStats {
            entries: self.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            reclaimed: self.counters.reclaimed.load(Ordering::Relaxed),
        }
    }

    /// Stop the background sweeper and wait for it to exit.
    ///
    /// The cache keeps serving requests with lazy expiry only.
    pub async fn shutdown(&self) {
        self.sweeper.stop().await;
        debug!(cache = %self.config.name, "In-process cache sweeper shut down");
    }

    /// True while the background sweeper is running
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.is_running()
    }

    fn encode(&self, key: &str, value: CacheValue) -> Result<Bytes> {
        match &self.codec {
            Codec::Serializer(s) => s.serialize(key, &value).map(Bytes::from),
            Codec::Raw => match value {
                CacheValue::Bytes(b) => Ok(b),
                other => Err(Error::Config(format!(
                    "cache serializer is not configured and value is {} rather than bytes",
                    other.kind()
                ))),
            },
        }
    }

    fn decode(&self, key: &str, payload: Bytes) -> Result<CacheValue> {
        match &self.codec {
            Codec::Serializer(s) => s.deserialize(key, &payload),
            Codec::Raw => Ok(CacheValue::Bytes(payload)),
        }
    }

    /// Look up a live payload, removing the entry if it has expired
    fn live_payload(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();

        let payload = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => Some(entry.payload.clone()),
            Some(_) => None,
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match payload {
            Some(payload) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(payload)
            }
            None => {
                if remove_if_expired(&self.entries, key, now) {
                    self.counters.reclaimed.fetch_add(1, Ordering::Relaxed);
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    #[instrument(skip(self), fields(cache = %self.config.name))]
    async fn get(&self, key: &str) -> Result<CacheValue> {
        let payload = self.live_payload(key).ok_or_else(|| Error::not_found(key))?;
        self.decode(key, payload)
    }

    #[instrument(skip(self, value), fields(cache = %self.config.name))]
    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<()> {
        let payload = self.encode(key, value)?;
        self.entries.insert(key.to_string(), Entry::new(payload, ttl));
        Ok(())
    }

    #[instrument(skip(self), fields(cache = %self.config.name))]
    async fn del(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    #[instrument(skip(self), fields(cache = %self.config.name))]
    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.live_payload(key).is_some())
    }
}

/// Remove `key` only if the stored entry is expired at `now`.
///
/// A concurrent `set` may have replaced the entry since it was seen expired;
/// the live replacement is kept.
fn remove_if_expired(entries: &DashMap<String, Entry>, key: &str, now: Instant) -> bool {
    entries.remove_if(key, |_, e| e.is_expired_at(now)).is_some()
}

/// Remove every expired entry
fn purge(entries: &DashMap<String, Entry>, counters: &Counters) -> u64 {
    let now = Instant::now();
    let mut reclaimed = 0u64;
    entries.retain(|_, e| {
        let live = !e.is_expired_at(now);
        if !live {
            reclaimed += 1;
        }
        live
    });
    counters.reclaimed.fetch_add(reclaimed, Ordering::Relaxed);
    reclaimed
}

// =============================================================================
// Tests
// =============================================================================

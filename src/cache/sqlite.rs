//! Persistent Cache Backend
//!
//! Stores entries in a single SQLite table so they survive restarts:
//!
//! ```text
//! cache(key TEXT PRIMARY KEY, value TEXT, expires_at INTEGER)
//! ```
//!
//! `expires_at` is Unix epoch seconds, `0` meaning the entry never expires.
//!
//! # Design
//!
//! - WAL journal mode and a small connection pool, so reads and the sweeper
//!   run alongside writers
//! - Each operation is a single SQL statement
//! - Deadlines are rounded up to whole seconds: an entry never expires early
//!   and is reported expired at most one second late
//! - `close` stops the sweeper before closing the pool; later operations fail
//!   with [`Error::Closed`]

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, instrument};

use super::contract::Cache;
use super::serializer::Codec;
use super::sweeper::Sweeper;
use super::value::CacheValue;
use super::DEFAULT_SWEEP_INTERVAL;
use crate::error::{Error, Result};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    value TEXT,
    expires_at INTEGER
)
"#;

const UPSERT: &str = "INSERT OR REPLACE INTO cache (key, value, expires_at) VALUES (?, ?, ?)";

const SELECT_ENTRY: &str =
    "SELECT CAST(value AS BLOB), typeof(value), expires_at FROM cache WHERE key = ?";

const SELECT_EXPIRY: &str = "SELECT expires_at FROM cache WHERE key = ? AND value IS NOT NULL";

const DELETE_KEY: &str = "DELETE FROM cache WHERE key = ?";

const DELETE_IF_EXPIRED: &str =
    "DELETE FROM cache WHERE key = ? AND expires_at != 0 AND expires_at <= ?";

const DELETE_EXPIRED: &str = "DELETE FROM cache WHERE expires_at != 0 AND expires_at <= ?";

const COUNT: &str = "SELECT COUNT(*) FROM cache";

/// Persistent cache configuration
#[derive(Debug, Clone)]
pub struct SqliteCacheConfig {
    /// Name recorded in logs
    pub name: String,
    /// Database file, created if missing
    pub path: PathBuf,
    /// How often expired rows are reclaimed
    pub sweep_interval: Duration,
    /// Connection pool size
    pub max_connections: u32,
    /// How long a statement waits on a locked database
    pub busy_timeout: Duration,
}

impl SqliteCacheConfig {
    /// Default configuration for the database at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl Default for SqliteCacheConfig {
    fn default() -> Self {
        Self {
            name: "sqlite".to_string(),
            path: PathBuf::from("kvcache.db"),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Row payload in the storage class it is written with
#[derive(Debug)]
enum Payload {
    Text(String),
    Blob(Vec<u8>),
}

/// SQLite-backed cache
pub struct SqliteCache {
    /// Connection pool
    pool: SqlitePool,
    /// Value encoding
    codec: Codec,
    /// Configuration
    config: SqliteCacheConfig,
    /// Background reclamation task
    sweeper: Sweeper,
}

impl SqliteCache {
    /// Open the store at `path` with default settings and no serializer
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(SqliteCacheConfig::new(path.as_ref()), Codec::Raw).await
    }

    /// Open a store with custom configuration and codec
    #[instrument(skip(codec), fields(cache = %config.name, path = %config.path.display()))]
    pub async fn open_with(config: SqliteCacheConfig, codec: Codec) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(Error::Config("max_connections must be at least 1".to_string()));
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;

        let sweep_pool = pool.clone();
        let sweeper = Sweeper::spawn(&config.name, config.sweep_interval, move || {
            let pool = sweep_pool.clone();
            async move { purge(&pool).await }
        })?;

        info!(raw = codec.is_raw(), "Opened persistent cache");

        Ok(Self {
            pool,
            codec,
            config,
            sweeper,
        })
    }

    /// Name of this cache
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Database file backing this cache
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Run one reclamation pass now and return how many rows it removed
    pub async fn purge_expired(&self) -> Result<u64> {
        purge(&self.pool).await
    }

    /// Rows physically present, including expired ones not yet reclaimed
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(COUNT).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    /// True when the table holds no rows
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// True while the background sweeper is running
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.is_running()
    }

    /// True once [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Stop the sweeper and release every connection.
    ///
    /// Operations after close fail with [`Error::Closed`].
    pub async fn close(&self) {
        self.sweeper.stop().await;
        self.pool.close().await;
        info!(cache = %self.config.name, "Closed persistent cache");
    }

    fn encode(&self, key: &str, value: CacheValue) -> Result<Payload> {
        match &self.codec {
            Codec::Serializer(s) => {
                let bytes = s.serialize(key, &value)?;
                Ok(match String::from_utf8(bytes) {
                    Ok(text) => Payload::Text(text),
                    Err(e) => Payload::Blob(e.into_bytes()),
                })
            }
            Codec::Raw => match value {
                CacheValue::Text(text) => Ok(Payload::Text(text)),
                CacheValue::Bytes(bytes) => Ok(Payload::Blob(bytes.to_vec())),
                CacheValue::Json(_) => Err(Error::Config(
                    "cache serializer is not configured and value is json".to_string(),
                )),
            },
        }
    }

    fn decode(&self, key: &str, bytes: Vec<u8>, storage_class: &str) -> Result<CacheValue> {
        match &self.codec {
            Codec::Serializer(s) => s.deserialize(key, &bytes),
            Codec::Raw if storage_class == "blob" => Ok(CacheValue::Bytes(Bytes::from(bytes))),
            Codec::Raw => String::from_utf8(bytes)
                .map(CacheValue::Text)
                .map_err(|e| Error::serialization(key, e)),
        }
    }

    /// Best-effort removal of `key` if it is still expired
    async fn remove_expired(&self, key: &str) {
        let result = sqlx::query(DELETE_IF_EXPIRED)
            .bind(key)
            .bind(now_secs())
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            debug!(cache = %self.config.name, key, error = %e, "Lazy removal failed");
        }
    }
}

#[async_trait]
impl Cache for SqliteCache {
    #[instrument(skip(self), fields(cache = %self.config.name))]
    async fn get(&self, key: &str) -> Result<CacheValue> {
        let row: Option<(Option<Vec<u8>>, String, Option<i64>)> = sqlx::query_as(SELECT_ENTRY)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let (value, storage_class, expires_at) = row.ok_or_else(|| Error::not_found(key))?;

        if is_expired(expires_at.unwrap_or(0)) {
            self.remove_expired(key).await;
            return Err(Error::not_found(key));
        }

        let bytes = value.ok_or_else(|| Error::serialization(key, "stored value is NULL"))?;
        self.decode(key, bytes, &storage_class)
    }

    #[instrument(skip(self, value), fields(cache = %self.config.name))]
    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<()> {
        let payload = self.encode(key, value)?;

        let query = sqlx::query(UPSERT).bind(key);
        let query = match payload {
            Payload::Text(text) => query.bind(text),
            Payload::Blob(blob) => query.bind(blob),
        };

        query.bind(deadline(ttl)).execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(cache = %self.config.name))]
    async fn del(&self, key: &str) -> Result<()> {
        sqlx::query(DELETE_KEY).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    /// Rows with a NULL value, which only a foreign writer produces, count as
    /// absent since `get` cannot decode them.
    #[instrument(skip(self), fields(cache = %self.config.name))]
    async fn has(&self, key: &str) -> Result<bool> {
        let expires_at: Option<Option<i64>> = sqlx::query_scalar(SELECT_EXPIRY)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match expires_at {
            None => Ok(false),
            Some(expires_at) if is_expired(expires_at.unwrap_or(0)) => {
                self.remove_expired(key).await;
                Ok(false)
            }
            Some(_) => Ok(true),
        }
    }
}

/// Delete every expired row
async fn purge(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(DELETE_EXPIRED)
        .bind(now_secs())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Current Unix time in whole seconds, rounded down
fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Stored deadline for `ttl`, rounded up to whole seconds; `0` for never
fn deadline(ttl: Duration) -> i64 {
    if ttl.is_zero() {
        return 0;
    }
    let ttl_micros = i64::try_from(ttl.as_micros()).unwrap_or(i64::MAX);
    let micros = Utc::now().timestamp_micros().saturating_add(ttl_micros);
    micros.saturating_add(999_999) / 1_000_000
}

#[inline]
fn is_expired(expires_at: i64) -> bool {
    expires_at != 0 && now_secs() >= expires_at
}

// =============================================================================
// Tests
// =============================================================================

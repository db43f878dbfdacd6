//! Cache Contract
//!
//! The operation set every backend implements. Backends are structurally
//! unrelated; callers pick one at construction time and talk to it through
//! `Arc<dyn Cache>`.
//!
//! Every operation is an `async fn`. Dropping the future, or wrapping it in
//! `tokio::time::timeout`, cancels it.

use std::time::Duration;

use async_trait::async_trait;

use super::value::CacheValue;
use crate::error::{BoxError, Error, Result};

/// Supplier invoked by [`Cache::set_with_func`]
pub type Supplier<'a> =
    Box<dyn FnOnce() -> std::result::Result<CacheValue, BoxError> + Send + 'a>;

/// Key-value cache with TTL expiry
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get the live value stored under `key`.
    ///
    /// Fails with [`Error::NotFound`] when the key is absent or expired. An
    /// expired entry is removed as part of the failed lookup.
    async fn get(&self, key: &str) -> Result<CacheValue>;

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// A zero `ttl` means the entry never expires.
    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn del(&self, key: &str) -> Result<()>;

    /// True when `get` would succeed at this instant. An expired entry seen
    /// here is removed.
    async fn has(&self, key: &str) -> Result<bool>;

    /// Run `supplier`, store its result under `key` and return it.
    ///
    /// The cache is not consulted first: every call computes and overwrites.
    /// A failing supplier aborts before anything is written.
    async fn set_with_func(
        &self,
        key: &str,
        supplier: Supplier<'_>,
        ttl: Duration,
    ) -> Result<CacheValue> {
        let value = supplier().map_err(Error::Compute)?;
        self.set(key, value.clone(), ttl).await?;
        Ok(value)
    }
}

/// Convenience operations available on every [`Cache`]
#[async_trait]
pub trait CacheExt: Cache {
    /// [`Cache::set_with_func`] taking any closure and error type
    async fn set_with<F, E>(&self, key: &str, supplier: F, ttl: Duration) -> Result<CacheValue>
    where
        F: FnOnce() -> std::result::Result<CacheValue, E> + Send,
        E: Into<BoxError>,
    {
        self.set_with_func(key, Box::new(move || supplier().map_err(Into::into)), ttl)
            .await
    }

    /// Return the live value under `key`, or compute, store and return it.
    ///
    /// Only a miss triggers the supplier; any other read failure is returned.
    async fn get_or_set_with<F, E>(
        &self,
        key: &str,
        supplier: F,
        ttl: Duration,
    ) -> Result<CacheValue>
    where
        F: FnOnce() -> std::result::Result<CacheValue, E> + Send,
        E: Into<BoxError>,
    {
        match self.get(key).await {
            Ok(value) => Ok(value),
            Err(Error::NotFound { .. }) => self.set_with(key, supplier, ttl).await,
            Err(e) => Err(e),
        }
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

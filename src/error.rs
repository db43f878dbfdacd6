//! Error types for kvcache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by caller-supplied value suppliers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in cache operations
#[derive(Error, Debug)]
pub enum Error {
    /// Key is absent or its entry has expired
    #[error("cache key not exists. key={key}")]
    NotFound { key: String },

    /// Value could not be encoded or decoded
    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    /// Underlying storage driver failure
    #[error("Storage error: {0}")]
    Storage(#[source] sqlx::Error),

    /// Supplier passed to a compute operation failed
    #[error("Compute error: {0}")]
    Compute(#[source] BoxError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted on a closed store
    #[error("Cache store is closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a not-found error for `key`
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Build a serialization error for `key`
    pub fn serialization(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Serialization {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// True for a cache miss, so callers can branch without treating it as a fault
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The key carried by a not-found or serialization error
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::NotFound { key } | Self::Serialization { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolClosed => Self::Closed,
            other => Self::Storage(other),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Process-wide key/value cache for derived state.
//!
//! The cache holds eventually-consistent projections such as the sold-out
//! announcement and per-speaker summaries. Entries can be recomputed at any
//! time; a missing entry is never an error.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`Cache`] methods.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Cache backend failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cache unavailable: {0}")]
pub struct CacheError(pub String);

/// String-valued cache with get/set/delete. Expiry is up to the backend.
pub trait Cache: Send + Sync {
    /// Read an entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend cannot be reached.
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>>;

    /// Write an entry, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend cannot be reached.
    fn set<'a>(&'a self, key: &'a str, value: String) -> CacheFuture<'a, ()>;

    /// Remove an entry. Removing a missing entry succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend cannot be reached.
    fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
}

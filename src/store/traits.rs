//! Store traits and error types
//!
//! This module defines the trait interface for document store backends and
//! associated error types.

use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store not found: {0}")]
    StoreNotFound(String),

    #[error("Store lock poisoned: {0}")]
    Poisoned(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A named keyed store
///
/// Implementations must be safe to share between threads (and, for durable
/// backends, between processes). Writes to one key are last-write-wins;
/// `save_if_absent` and `pop_first` are the only atomic compound operations.
pub trait DataStore: Send + Sync {
    /// Name of the store within its engine
    fn name(&self) -> &str;

    /// Inserts or replaces the value under `key`
    fn save(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Gets the value under `key`
    fn find(&self, key: &str) -> StoreResult<Option<String>>;

    /// Checks whether `key` is present
    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.find(key)?.is_some())
    }

    /// Removes `key`, returning true if it was present
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Inserts the value only if `key` is absent (test-and-set)
    ///
    /// # Returns
    ///
    /// * `None` - The value was inserted
    /// * `Some(existing)` - The key was already present; nothing was written
    fn save_if_absent(&self, key: &str, value: &str) -> StoreResult<Option<String>>;

    /// Atomically removes and returns the oldest entry (insertion order)
    fn pop_first(&self) -> StoreResult<Option<(String, String)>>;

    /// Counts the entries
    fn count(&self) -> StoreResult<u64>;

    /// Returns true if the store holds no entry
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.count()? == 0)
    }

    /// Gets every entry in insertion order
    fn entries(&self) -> StoreResult<Vec<(String, String)>>;

    /// Removes every entry
    fn clear(&self) -> StoreResult<()>;
}

/// Factory and lifecycle manager for named stores
pub trait DataStoreEngine: Send + Sync {
    /// Opens (creating if needed) the store with the given name
    fn open_store(&self, name: &str) -> StoreResult<Arc<dyn DataStore>>;

    /// Drops a store and all of its entries, returning true if it existed
    fn drop_store(&self, name: &str) -> StoreResult<bool>;

    /// Lists the names of existing stores
    fn store_names(&self) -> StoreResult<Vec<String>>;

    /// Drops every store
    fn clean(&self) -> StoreResult<()> {
        for name in self.store_names()? {
            self.drop_store(&name)?;
        }
        Ok(())
    }

    /// Releases engine resources
    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

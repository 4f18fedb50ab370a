//! Store module for persisting crawl state
//!
//! This module provides the document store used for queues, checksum caches,
//! dedup indexes, grace flags and grid coordination records:
//! - A backend-neutral `DataStore` / `DataStoreEngine` contract
//! - A SQLite engine, shareable between processes through one database file
//! - An in-memory engine for single-process crawls and tests
//! - A JSON-typed wrapper

mod memory;
mod schema;
mod sqlite;
mod traits;
mod typed;

pub use memory::{MemoryEngine, MemoryStore};
pub use sqlite::{SqliteEngine, SqliteStore};
pub use traits::{DataStore, DataStoreEngine, StoreError, StoreResult};
pub use typed::TypedStore;

use crate::config::{StoreBackend, StoreConfig};
use std::path::Path;
use std::sync::Arc;

/// Opens the store engine described by the configuration
///
/// # Arguments
///
/// * `config` - The store section of the crawler configuration
///
/// # Returns
///
/// * `Ok(engine)` - Successfully opened engine
/// * `Err(StoreError)` - Failed to open the backend
pub fn open_engine(config: &StoreConfig) -> StoreResult<Arc<dyn DataStoreEngine>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::debug!("Using in-memory document store");
            Ok(Arc::new(MemoryEngine::new()))
        }
        StoreBackend::Sqlite => {
            tracing::debug!("Using SQLite document store at {}", config.path);
            Ok(Arc::new(SqliteEngine::new(Path::new(&config.path))?))
        }
    }
}

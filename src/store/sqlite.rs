//! SQLite store implementation
//!
//! This module provides a SQLite-based implementation of the store traits.
//! Several processes may open the same database file; compound operations run
//! inside immediate transactions so they stay atomic across processes.

use crate::store::schema::initialize_schema;
use crate::store::traits::{DataStore, DataStoreEngine, StoreError, StoreResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type SharedConnection = Arc<Mutex<Connection>>;

fn lock(conn: &Mutex<Connection>) -> StoreResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::Poisoned(format!("sqlite connection: {}", e)))
}

/// SQLite store engine
pub struct SqliteEngine {
    conn: SharedConnection,
}

impl SqliteEngine {
    /// Opens or creates the database file at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteEngine)` - Successfully opened/created database
    /// * `Err(StoreError)` - Failed to open database
    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        // Other processes may hold the write lock while they pop or test-and-set
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl DataStoreEngine for SqliteEngine {
    fn open_store(&self, name: &str) -> StoreResult<Arc<dyn DataStore>> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
            params![name, Utc::now().to_rfc3339()],
        )?;
        Ok(Arc::new(SqliteStore {
            name: name.to_string(),
            conn: self.conn.clone(),
        }))
    }

    fn drop_store(&self, name: &str) -> StoreResult<bool> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM entries WHERE store = ?1", params![name])?;
        let removed = tx.execute("DELETE FROM stores WHERE name = ?1", params![name])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn store_names(&self) -> StoreResult<Vec<String>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

/// A named store backed by the shared connection
pub struct SqliteStore {
    name: String,
    conn: SharedConnection,
}

impl DataStore for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn save(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO entries (store, key, value, seq, updated_at)
             VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(seq), 0) + 1 FROM entries WHERE store = ?1), ?4)
             ON CONFLICT(store, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![self.name, key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn find(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = lock(&self.conn)?;
        let value = conn
            .query_row(
                "SELECT value FROM entries WHERE store = ?1 AND key = ?2",
                params![self.name, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM entries WHERE store = ?1 AND key = ?2",
            params![self.name, key],
        )?;
        Ok(removed > 0)
    }

    fn save_if_absent(&self, key: &str, value: &str) -> StoreResult<Option<String>> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO entries (store, key, value, seq, updated_at)
             VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(seq), 0) + 1 FROM entries WHERE store = ?1), ?4)",
            params![self.name, key, value, Utc::now().to_rfc3339()],
        )?;
        let existing = if inserted == 0 {
            tx.query_row(
                "SELECT value FROM entries WHERE store = ?1 AND key = ?2",
                params![self.name, key],
                |row| row.get(0),
            )
            .optional()?
        } else {
            None
        };
        tx.commit()?;
        Ok(existing)
    }

    fn pop_first(&self) -> StoreResult<Option<(String, String)>> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let first: Option<(String, String)> = tx
            .query_row(
                "SELECT key, value FROM entries WHERE store = ?1 ORDER BY seq ASC LIMIT 1",
                params![self.name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((key, _)) = &first {
            tx.execute(
                "DELETE FROM entries WHERE store = ?1 AND key = ?2",
                params![self.name, key],
            )?;
        }
        tx.commit()?;
        Ok(first)
    }

    fn count(&self) -> StoreResult<u64> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE store = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn entries(&self) -> StoreResult<Vec<(String, String)>> {
        let conn = lock(&self.conn)?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM entries WHERE store = ?1 ORDER BY seq ASC")?;
        let entries = stmt
            .query_map(params![self.name], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, String)>, _>>()?;
        Ok(entries)
    }

    fn clear(&self) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute("DELETE FROM entries WHERE store = ?1", params![self.name])?;
        Ok(())
    }
}

//! In-memory store implementation
//!
//! Every store of an engine lives behind one lock, so handles always resolve
//! their data by name and see drops made through the engine.

use crate::store::traits::{DataStore, DataStoreEngine, StoreError, StoreResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct StoreData {
    entries: HashMap<String, (u64, String)>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl StoreData {
    fn insert(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.1 = value.to_string();
            return;
        }
        self.next_seq += 1;
        self.entries
            .insert(key.to_string(), (self.next_seq, value.to_string()));
        self.order.insert(self.next_seq, key.to_string());
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        let (seq, value) = self.entries.remove(key)?;
        self.order.remove(&seq);
        Some(value)
    }
}

type Stores = Arc<Mutex<HashMap<String, StoreData>>>;

fn with_stores<T>(stores: &Stores, f: impl FnOnce(&mut HashMap<String, StoreData>) -> T) -> StoreResult<T> {
    let mut guard = stores
        .lock()
        .map_err(|e| StoreError::Poisoned(format!("memory stores: {}", e)))?;
    Ok(f(&mut guard))
}

/// Volatile store engine, used for single-process crawls and tests
#[derive(Clone, Default)]
pub struct MemoryEngine {
    stores: Stores,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataStoreEngine for MemoryEngine {
    fn open_store(&self, name: &str) -> StoreResult<Arc<dyn DataStore>> {
        with_stores(&self.stores, |stores| {
            stores.entry(name.to_string()).or_default();
        })?;
        Ok(Arc::new(MemoryStore {
            name: name.to_string(),
            stores: self.stores.clone(),
        }))
    }

    fn drop_store(&self, name: &str) -> StoreResult<bool> {
        with_stores(&self.stores, |stores| stores.remove(name).is_some())
    }

    fn store_names(&self) -> StoreResult<Vec<String>> {
        with_stores(&self.stores, |stores| {
            let mut names: Vec<String> = stores.keys().cloned().collect();
            names.sort();
            names
        })
    }
}

/// Handle to one named in-memory store
pub struct MemoryStore {
    name: String,
    stores: Stores,
}

impl MemoryStore {
    fn with_data<T>(&self, f: impl FnOnce(&mut StoreData) -> T) -> StoreResult<T> {
        with_stores(&self.stores, |stores| {
            f(stores.entry(self.name.clone()).or_default())
        })
    }
}

impl DataStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn save(&self, key: &str, value: &str) -> StoreResult<()> {
        self.with_data(|data| data.insert(key, value))
    }

    fn find(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_data(|data| data.entries.get(key).map(|(_, v)| v.clone()))
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        self.with_data(|data| data.remove(key).is_some())
    }

    fn save_if_absent(&self, key: &str, value: &str) -> StoreResult<Option<String>> {
        self.with_data(|data| match data.entries.get(key) {
            Some((_, existing)) => Some(existing.clone()),
            None => {
                data.insert(key, value);
                None
            }
        })
    }

    fn pop_first(&self) -> StoreResult<Option<(String, String)>> {
        self.with_data(|data| {
            let key = data.order.values().next().cloned()?;
            let value = data.remove(&key)?;
            Some((key, value))
        })
    }

    fn count(&self) -> StoreResult<u64> {
        self.with_data(|data| data.entries.len() as u64)
    }

    fn entries(&self) -> StoreResult<Vec<(String, String)>> {
        self.with_data(|data| {
            data.order
                .values()
                .filter_map(|key| data.entries.get(key).map(|(_, v)| (key.clone(), v.clone())))
                .collect()
        })
    }

    fn clear(&self) -> StoreResult<()> {
        self.with_data(|data| *data = StoreData::default())
    }
}

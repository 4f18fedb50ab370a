//! JSON-typed view over a raw store

use crate::store::traits::{DataStore, StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// A store whose values are serialized as JSON
pub struct TypedStore<T> {
    inner: Arc<dyn DataStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> TypedStore<T> {
    pub fn new(inner: Arc<dyn DataStore>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn save(&self, key: &str, value: &T) -> StoreResult<()> {
        self.inner.save(key, &serde_json::to_string(value)?)
    }

    pub fn find(&self, key: &str) -> StoreResult<Option<T>> {
        match self.inner.find(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key)
    }

    pub fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key)
    }

    /// Inserts only if absent; returns the existing value otherwise
    pub fn save_if_absent(&self, key: &str, value: &T) -> StoreResult<Option<T>> {
        match self.inner.save_if_absent(key, &serde_json::to_string(value)?)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn pop_first(&self) -> StoreResult<Option<(String, T)>> {
        match self.inner.pop_first()? {
            Some((key, json)) => Ok(Some((key, serde_json::from_str(&json)?))),
            None => Ok(None),
        }
    }

    pub fn count(&self) -> StoreResult<u64> {
        self.inner.count()
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.inner.is_empty()
    }

    pub fn values(&self) -> StoreResult<Vec<T>> {
        self.inner
            .entries()?
            .into_iter()
            .map(|(_, json)| serde_json::from_str(&json).map_err(StoreError::from))
            .collect()
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.inner.clear()
    }
}

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::error::StoreError;
use crate::key::StoreKey;
use crate::store::DocumentStore;

/// In-memory `DocumentStore` backed by an insertion-ordered map.
///
/// A single `RwLock` guards the whole map: there is only one column here
/// (no catalog of collections to juggle at this layer — that lives one
/// level up, in `lumedb-collection`), so one lock suffices. Readers take
/// a shared lock; every mutation takes an exclusive one — the reader/writer
/// split the collection layer relies on, with the store supplying the
/// primitive it's built on.
pub struct MemoryStore<V> {
    data: RwLock<IndexMap<StoreKey, V>>,
    next_key: AtomicU64,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self {
            data: RwLock::new(IndexMap::new()),
            next_key: AtomicU64::new(0),
        }
    }
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, IndexMap<StoreKey, V>>, StoreError> {
        self.data
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, IndexMap<StoreKey, V>>, StoreError> {
        self.data
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl<V: Send + Sync> DocumentStore<V> for MemoryStore<V> {
    fn insert(&self, value: V) -> Result<StoreKey, StoreError> {
        let key = StoreKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        self.write()?.insert(key, value);
        Ok(key)
    }

    fn get(&self, key: StoreKey) -> Result<Option<V>, StoreError>
    where
        V: Clone,
    {
        Ok(self.read()?.get(&key).cloned())
    }

    fn replace(&self, key: StoreKey, value: V) -> Result<(), StoreError> {
        let mut data = self.write()?;
        if !data.contains_key(&key) {
            return Err(StoreError::NotFound);
        }
        data.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<Option<V>, StoreError> {
        // `shift_remove` keeps the natural (insertion) order of the
        // remaining documents intact, matching MongoDB's "natural order"
        // semantics for an unindexed scan — at the cost of O(n) instead
        // of `swap_remove`'s O(1). Collections in this engine are
        // in-memory and modest in size, so the clearer ordering wins.
        Ok(self.write()?.shift_remove(&key))
    }

    fn scan(&self) -> Result<Vec<(StoreKey, V)>, StoreError>
    where
        V: Clone,
    {
        Ok(self
            .read()?
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }
}

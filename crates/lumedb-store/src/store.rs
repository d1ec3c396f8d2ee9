use crate::error::StoreError;
use crate::key::StoreKey;

/// Abstract document store: "insert blob → key" and "fetch by key".
///
/// `V` is opaque to the store — it never inspects the value, only holds
/// and returns it. The collection layer is responsible for everything
/// document-shaped (identifiers, indexes, query evaluation); the store
/// only needs to hand back exactly what it was given.
pub trait DocumentStore<V>: Send + Sync {
    /// Insert a new value, returning the key the store assigned it.
    fn insert(&self, value: V) -> Result<StoreKey, StoreError>;

    /// Fetch the value at `key`, if present.
    fn get(&self, key: StoreKey) -> Result<Option<V>, StoreError>
    where
        V: Clone;

    /// Overwrite the value at `key`. Fails with `NotFound` if the key is
    /// not live.
    fn replace(&self, key: StoreKey, value: V) -> Result<(), StoreError>;

    /// Remove and return the value at `key`, if present.
    fn remove(&self, key: StoreKey) -> Result<Option<V>, StoreError>;

    /// Snapshot every `(key, value)` pair, in the store's natural order.
    fn scan(&self) -> Result<Vec<(StoreKey, V)>, StoreError>
    where
        V: Clone;

    /// Number of live values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Index Set: an ordered list of secondary indexes kept coherent with
//! document state, answering "which candidate keys might match this
//! query" plus uniqueness checks on add/update.

mod field;
mod unique;

pub use field::FieldIndex;
pub use unique::UniqueIndex;

use bson::Document;
use lumedb_store::StoreKey;

use crate::error::EngineError;

/// A secondary index over a collection. `can_handle`/`keys` let the
/// collection narrow a query to candidate keys without a full scan;
/// `check_*`/`add`/`update_in_place`/`remove` keep the index coherent
/// with the document store. At minimum the identifier field is indexed
/// (unique) — see `UniqueIndex`.
pub trait Index: Send + Sync {
    /// Name of the indexed field (dotted path).
    fn name(&self) -> &str;

    /// Whether this index can narrow the given query document (i.e. the
    /// query has an equality or `$in` clause on this index's field).
    fn can_handle(&self, query: &Document) -> bool;

    /// Candidate store keys for a query this index can handle. Returns
    /// `None` if `can_handle` would have returned false.
    fn keys(&self, query: &Document) -> Option<Vec<StoreKey>>;

    /// Validate that inserting `doc` would not violate this index (e.g.
    /// uniqueness). Must not mutate. Takes no key: the store has not
    /// assigned one yet at check time (checks run before the write).
    fn check_add(&self, doc: &Document) -> Result<(), EngineError>;

    /// Record `doc` under `key`. Only called after `check_add` succeeds
    /// on every index in the set.
    fn add(&self, doc: &Document, key: StoreKey);

    /// Validate that replacing `old` with `new` (same `key`) would not
    /// violate this index.
    fn check_update(&self, old: &Document, new: &Document, key: StoreKey) -> Result<(), EngineError>;

    /// Apply the replacement of `old` with `new` under `key`. Only
    /// called after `check_update` succeeds on every index in the set.
    fn update_in_place(&self, old: &Document, new: &Document, key: StoreKey);

    /// Remove whatever entries this index holds for `doc`/`key`.
    fn remove(&self, doc: &Document, key: StoreKey);

    /// Number of entries currently tracked (informational, for `getStats`).
    fn count(&self) -> usize;

    /// Rough byte-size estimate of this index's storage (informational).
    fn data_size(&self) -> usize;
}

/// Ordered collection of indexes. Index updates within a single mutating
/// call occur in list order.
pub struct IndexSet {
    indexes: Vec<Box<dyn Index>>,
}

impl IndexSet {
    pub fn new(identifier_field: &str) -> Self {
        IndexSet {
            indexes: vec![Box::new(UniqueIndex::new(identifier_field))],
        }
    }

    pub fn add_index(&mut self, index: Box<dyn Index>) {
        self.indexes.push(index);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Index> {
        self.indexes.iter().map(|b| b.as_ref())
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Candidate keys a query can be narrowed to, if any index handles it.
    pub fn candidate_keys(&self, query: &Document) -> Option<Vec<StoreKey>> {
        self.indexes
            .iter()
            .find(|idx| idx.can_handle(query))
            .and_then(|idx| idx.keys(query))
    }

    pub fn check_add(&self, doc: &Document) -> Result<(), EngineError> {
        for idx in &self.indexes {
            idx.check_add(doc)?;
        }
        Ok(())
    }

    pub fn add(&self, doc: &Document, key: StoreKey) {
        for idx in &self.indexes {
            idx.add(doc, key);
        }
    }

    pub fn check_update(&self, old: &Document, new: &Document, key: StoreKey) -> Result<(), EngineError> {
        for idx in &self.indexes {
            idx.check_update(old, new, key)?;
        }
        Ok(())
    }

    pub fn update_in_place(&self, old: &Document, new: &Document, key: StoreKey) {
        for idx in &self.indexes {
            idx.update_in_place(old, new, key);
        }
    }

    pub fn remove(&self, doc: &Document, key: StoreKey) {
        for idx in &self.indexes {
            idx.remove(doc, key);
        }
    }
}

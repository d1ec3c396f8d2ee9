use std::collections::HashMap;
use std::sync::RwLock;

use bson::Document;
use lumedb_query::{MatchPosition, Path};
use lumedb_store::StoreKey;

use super::Index;
use crate::error::EngineError;
use crate::key::DocKey;

/// Enforces that no two live documents share a value at `field`. Used
/// for the mandatory identifier index, and available for any field the
/// caller declares unique via `addIndex`.
pub struct UniqueIndex {
    field: String,
    path: Path,
    entries: RwLock<HashMap<DocKey, StoreKey>>,
}

impl UniqueIndex {
    pub fn new(field: &str) -> Self {
        UniqueIndex {
            field: field.to_string(),
            path: Path::parse(field),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn key_for(&self, doc: &Document) -> Option<DocKey> {
        let ctx = MatchPosition::none();
        self.path.get(doc, &ctx).and_then(DocKey::from_bson)
    }
}

impl Index for UniqueIndex {
    fn name(&self) -> &str {
        &self.field
    }

    fn can_handle(&self, query: &Document) -> bool {
        query.get(&self.field).is_some()
    }

    fn keys(&self, query: &Document) -> Option<Vec<StoreKey>> {
        let val = query.get(&self.field)?;
        let target = DocKey::from_bson(val)?;
        let entries = self.entries.read().unwrap();
        Some(entries.get(&target).into_iter().copied().collect())
    }

    fn check_add(&self, doc: &Document) -> Result<(), EngineError> {
        let Some(dk) = self.key_for(doc) else {
            return Ok(());
        };
        let entries = self.entries.read().unwrap();
        if entries.contains_key(&dk) {
            return Err(EngineError::DuplicateKey(format!(
                "E11000 duplicate key error, field {} already exists with value {dk}",
                self.field
            )));
        }
        Ok(())
    }

    fn add(&self, doc: &Document, key: StoreKey) {
        if let Some(dk) = self.key_for(doc) {
            self.entries.write().unwrap().insert(dk, key);
        }
    }

    fn check_update(&self, old: &Document, new: &Document, key: StoreKey) -> Result<(), EngineError> {
        let (Some(old_dk), Some(new_dk)) = (self.key_for(old), self.key_for(new)) else {
            return Ok(());
        };
        if old_dk == new_dk {
            return Ok(());
        }
        let entries = self.entries.read().unwrap();
        if let Some(holder) = entries.get(&new_dk) {
            if *holder != key {
                return Err(EngineError::DuplicateKey(format!(
                    "E11000 duplicate key error, field {} already exists with value {new_dk}",
                    self.field
                )));
            }
        }
        Ok(())
    }

    fn update_in_place(&self, old: &Document, new: &Document, key: StoreKey) {
        let mut entries = self.entries.write().unwrap();
        if let Some(old_dk) = self.key_for(old) {
            entries.remove(&old_dk);
        }
        if let Some(new_dk) = self.key_for(new) {
            entries.insert(new_dk, key);
        }
    }

    fn remove(&self, doc: &Document, _key: StoreKey) {
        if let Some(dk) = self.key_for(doc) {
            self.entries.write().unwrap().remove(&dk);
        }
    }

    fn count(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    fn data_size(&self) -> usize {
        self.entries.read().unwrap().len() * std::mem::size_of::<(DocKey, StoreKey)>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use lumedb_store::{DocumentStore, MemoryStore};

    fn mint_keys(n: usize) -> Vec<StoreKey> {
        let store: MemoryStore<()> = MemoryStore::new();
        (0..n).map(|_| store.insert(()).unwrap()).collect()
    }

    #[test]
    fn duplicate_identifier_is_rejected() {
        let idx = UniqueIndex::new("_id");
        let keys = mint_keys(2);
        let a = doc! { "_id": 1 };
        idx.add(&a, keys[0]);
        let b = doc! { "_id": 1 };
        assert!(idx.check_add(&b).is_err());
    }

    #[test]
    fn distinct_identifiers_are_accepted() {
        let idx = UniqueIndex::new("_id");
        let keys = mint_keys(2);
        let a = doc! { "_id": 1 };
        idx.add(&a, keys[0]);
        let b = doc! { "_id": 2 };
        assert!(idx.check_add(&b).is_ok());
    }

    #[test]
    fn update_to_same_key_holder_is_allowed() {
        let idx = UniqueIndex::new("_id");
        let keys = mint_keys(1);
        let a = doc! { "_id": 1, "v": 1 };
        idx.add(&a, keys[0]);
        let b = doc! { "_id": 1, "v": 2 };
        assert!(idx.check_update(&a, &b, keys[0]).is_ok());
    }

    #[test]
    fn numeric_cross_type_values_collide() {
        let idx = UniqueIndex::new("n");
        let keys = mint_keys(2);
        let a = doc! { "n": 5i32 };
        idx.add(&a, keys[0]);
        let b = doc! { "n": 5i64 };
        assert!(idx.check_add(&b).is_err());
    }
}

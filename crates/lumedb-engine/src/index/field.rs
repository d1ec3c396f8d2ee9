use std::collections::HashMap;
use std::sync::RwLock;

use bson::{Bson, Document};
use lumedb_query::{MatchPosition, Path};
use lumedb_store::StoreKey;

use super::Index;
use crate::error::EngineError;
use crate::key::DocKey;

/// A non-unique secondary index. Indexes every element of an array field
/// (multikey), so a document with `tags: ["a", "b"]` produces candidate
/// entries under both `"a"` and `"b"`.
pub struct FieldIndex {
    field: String,
    path: Path,
    entries: RwLock<HashMap<DocKey, Vec<StoreKey>>>,
}

impl FieldIndex {
    pub fn new(field: &str) -> Self {
        FieldIndex {
            field: field.to_string(),
            path: Path::parse(field),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn keys_for(&self, doc: &Document) -> Vec<DocKey> {
        let ctx = MatchPosition::none();
        match self.path.get(doc, &ctx) {
            Some(Bson::Array(arr)) => arr.iter().filter_map(DocKey::from_bson).collect(),
            Some(v) => DocKey::from_bson(v).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

impl Index for FieldIndex {
    fn name(&self) -> &str {
        &self.field
    }

    fn can_handle(&self, query: &Document) -> bool {
        query.get(&self.field).map(|v| !matches!(v, Bson::Document(_))).unwrap_or(false)
    }

    fn keys(&self, query: &Document) -> Option<Vec<StoreKey>> {
        let val = query.get(&self.field)?;
        if matches!(val, Bson::Document(_)) {
            return None;
        }
        let target = DocKey::from_bson(val)?;
        let entries = self.entries.read().unwrap();
        Some(entries.get(&target).cloned().unwrap_or_default())
    }

    fn check_add(&self, _doc: &Document) -> Result<(), EngineError> {
        Ok(())
    }

    fn add(&self, doc: &Document, key: StoreKey) {
        let mut entries = self.entries.write().unwrap();
        for dk in self.keys_for(doc) {
            entries.entry(dk).or_default().push(key);
        }
    }

    fn check_update(&self, _old: &Document, _new: &Document, _key: StoreKey) -> Result<(), EngineError> {
        Ok(())
    }

    fn update_in_place(&self, old: &Document, new: &Document, key: StoreKey) {
        self.remove(old, key);
        self.add(new, key);
    }

    fn remove(&self, doc: &Document, key: StoreKey) {
        let mut entries = self.entries.write().unwrap();
        for dk in self.keys_for(doc) {
            if let Some(list) = entries.get_mut(&dk) {
                list.retain(|k| *k != key);
                if list.is_empty() {
                    entries.remove(&dk);
                }
            }
        }
    }

    fn count(&self) -> usize {
        self.entries.read().unwrap().values().map(|v| v.len()).sum()
    }

    fn data_size(&self) -> usize {
        self.count() * std::mem::size_of::<(DocKey, StoreKey)>()
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
    fn scalar_field_is_indexed() {
        let idx = FieldIndex::new("status");
        let keys = mint_keys(1);
        idx.add(&doc! { "status": "active" }, keys[0]);
        let found = idx.keys(&doc! { "status": "active" }).unwrap();
        assert_eq!(found, vec![keys[0]]);
    }

    #[test]
    fn array_field_indexes_every_element() {
        let idx = FieldIndex::new("tags");
        let keys = mint_keys(1);
        idx.add(&doc! { "tags": ["rust", "db"] }, keys[0]);
        assert_eq!(idx.keys(&doc! { "tags": "rust" }).unwrap(), vec![keys[0]]);
        assert_eq!(idx.keys(&doc! { "tags": "db" }).unwrap(), vec![keys[0]]);
    }

    #[test]
    fn removing_cleans_up_all_entries() {
        let idx = FieldIndex::new("tags");
        let keys = mint_keys(1);
        let d = doc! { "tags": ["rust", "db"] };
        idx.add(&d, keys[0]);
        idx.remove(&d, keys[0]);
        assert_eq!(idx.count(), 0);
    }

    #[test]
    fn multiple_documents_share_a_candidate_bucket() {
        let idx = FieldIndex::new("status");
        let keys = mint_keys(2);
        idx.add(&doc! { "status": "active" }, keys[0]);
        idx.add(&doc! { "status": "active" }, keys[1]);
        let mut found = idx.keys(&doc! { "status": "active" }).unwrap();
        found.sort();
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(found, expected);
    }
}

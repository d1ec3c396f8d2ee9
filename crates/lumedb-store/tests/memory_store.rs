use lumedb_store::{DocumentStore, MemoryStore};

#[test]
fn insert_and_get() {
    let store: MemoryStore<bson::Document> = MemoryStore::new();
    let key = store.insert(bson::doc! { "a": 1 }).unwrap();
    let fetched = store.get(key).unwrap().unwrap();
    assert_eq!(fetched.get_i32("a").unwrap(), 1);
}

#[test]
fn get_missing_key_returns_none() {
    let store: MemoryStore<bson::Document> = MemoryStore::new();
    let key = store.insert(bson::doc! {}).unwrap();
    store.remove(key).unwrap();
    assert!(store.get(key).unwrap().is_none());
}

#[test]
fn replace_overwrites_value() {
    let store: MemoryStore<bson::Document> = MemoryStore::new();
    let key = store.insert(bson::doc! { "a": 1 }).unwrap();
    store.replace(key, bson::doc! { "a": 2 }).unwrap();
    assert_eq!(store.get(key).unwrap().unwrap().get_i32("a").unwrap(), 2);
}

#[test]
fn replace_on_removed_key_errors() {
    let store: MemoryStore<bson::Document> = MemoryStore::new();
    let key = store.insert(bson::doc! {}).unwrap();
    store.remove(key).unwrap();
    assert!(store.replace(key, bson::doc! {}).is_err());
}

#[test]
fn scan_preserves_insertion_order_across_removal() {
    let store: MemoryStore<i32> = MemoryStore::new();
    let a = store.insert(1).unwrap();
    let b = store.insert(2).unwrap();
    let c = store.insert(3).unwrap();
    store.remove(b).unwrap();

    let scanned = store.scan().unwrap();
    assert_eq!(scanned, vec![(a, 1), (c, 3)]);
}

#[test]
fn len_reflects_inserts_and_removals() {
    let store: MemoryStore<i32> = MemoryStore::new();
    assert!(store.is_empty());
    let k1 = store.insert(1).unwrap();
    let _k2 = store.insert(2).unwrap();
    assert_eq!(store.len(), 2);
    store.remove(k1).unwrap();
    assert_eq!(store.len(), 1);
}

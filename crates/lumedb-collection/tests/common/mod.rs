use bson::doc;

use lumedb_collection::{Collection, CollectionConfig};

pub const DB: &str = "testdb";
pub const COLLECTION: &str = "accounts";

pub fn empty_collection() -> Collection {
    Collection::new(CollectionConfig::new(DB, COLLECTION))
}

/// Insert 5 seed records shared across the collection test suite.
pub fn seeded_collection() -> Collection {
    let c = empty_collection();
    c.insert_documents(vec![
        doc! { "_id": "acct-1", "name": "Acme Corp", "revenue": 50000.0, "status": "active", "active": true },
        doc! { "_id": "acct-2", "name": "Globex", "revenue": 80000.0, "status": "snoozed", "active": true },
        doc! { "_id": "acct-3", "name": "Initech", "revenue": 12000.0, "status": "rejected", "active": false },
        doc! { "_id": "acct-4", "name": "Umbrella", "revenue": 95000.0, "status": "active", "active": true },
        doc! { "_id": "acct-5", "name": "Stark Industries", "revenue": 200000.0, "status": "active", "active": false },
    ])
    .1
    .unwrap();
    c
}

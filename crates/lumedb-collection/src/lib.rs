//! Collection Core: the document collection API exposed to callers —
//! insert/query/update/delete/findAndModify/distinct plus index
//! management and diagnostics, layered over the Value Model, Path
//! Engine, Query Matcher, Update Engine, Index Set, and document store
//! from the lower crates.

mod collection;
mod config;
mod error;

pub use collection::Collection;
pub use config::CollectionConfig;
pub use error::CollectionError;

pub use lumedb_engine::{FieldIndex, Index, UniqueIndex};
pub use lumedb_query::Value;
pub use lumedb_store::{MemoryStore, StoreKey};

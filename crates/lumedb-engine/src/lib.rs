//! Index Set and Update Engine: the document-shaped layer between the
//! Query Matcher and the raw document store. Neither module here knows
//! about the store or the collection's locking discipline — they take
//! and return plain `bson::Document`s and leave commit ordering to the
//! caller.

mod error;
mod index;
mod key;
mod update;

pub use error::EngineError;
pub use index::{FieldIndex, Index, IndexSet, UniqueIndex};
pub use key::DocKey;
pub use update::{apply_update, is_all_operators};

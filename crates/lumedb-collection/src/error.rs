use std::fmt;

use lumedb_engine::EngineError;
use lumedb_query::QueryError;
use lumedb_store::StoreError;

/// Errors surfaced by collection-level operations, composing the update
/// engine / index set taxonomy with the query and store layers.
#[derive(Debug)]
pub enum CollectionError {
    Engine(EngineError),
    Store(StoreError),
    Query(QueryError),
    IdentifierIsArray,
    MissingField(String),
}

impl CollectionError {
    pub fn code(&self) -> i32 {
        match self {
            CollectionError::Engine(e) => e.code(),
            CollectionError::Store(_) => 1,
            CollectionError::Query(_) => 10065,
            CollectionError::IdentifierIsArray => 10148,
            CollectionError::MissingField(_) => 2,
        }
    }
}

impl fmt::Display for CollectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionError::Engine(e) => write!(f, "{e}"),
            CollectionError::Store(e) => write!(f, "store error: {e}"),
            CollectionError::Query(e) => write!(f, "query error: {e}"),
            CollectionError::IdentifierIsArray => write!(f, "identifier field cannot be an array"),
            CollectionError::MissingField(field) => write!(f, "missing required field: {field}"),
        }
    }
}

impl std::error::Error for CollectionError {}

impl From<EngineError> for CollectionError {
    fn from(e: EngineError) -> Self {
        CollectionError::Engine(e)
    }
}

impl From<StoreError> for CollectionError {
    fn from(e: StoreError) -> Self {
        CollectionError::Store(e)
    }
}

impl From<QueryError> for CollectionError {
    fn from(e: QueryError) -> Self {
        CollectionError::Query(e)
    }
}

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    NotFound,
    Poisoned(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "key not found in store"),
            StoreError::Poisoned(msg) => write!(f, "store lock poisoned: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

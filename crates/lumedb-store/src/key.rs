use std::fmt;

/// Opaque key assigned by a `DocumentStore` on insert.
///
/// Never constructed by callers; `StoreKey` values are handed back by
/// `DocumentStore::insert` and fed back into `get`/`replace`/`remove`.
/// Monotonically increasing, never reused — even after a document is
/// removed its key is retired, so a stale `StoreKey` reliably misses
/// rather than aliasing a newer document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey(pub(crate) u64);

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

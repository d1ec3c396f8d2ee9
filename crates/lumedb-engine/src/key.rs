//! Sortable, hashable encoding of BSON scalars for use as index keys.
//!
//! A `{ tag, bytes }` sortable-byte encoding (XOR-sign-bit trick so
//! big-endian byte comparison matches numeric comparison). It is fully
//! owned (no borrow into a source document, since index structures
//! outlive any single document), and the three numeric BSON kinds
//! collapse onto one `Number` tag so `Int32(5)`, `Int64(5)` and
//! `Double(5.0)` hash and compare identically — matching the value
//! comparator's numeric-promotion equality rule, which a unique index
//! must honor or it would let `5` and `5i64` coexist as "different" keys.
//!
//! Document values are accepted too, since an identifier may be any
//! non-array value, keyed by their serialized bytes; only `Array` is
//! rejected, since arrays are indexed per-element by `FieldIndex`
//! rather than as a single key.

use std::fmt;

use bson::Bson;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tag {
    Null,
    Number,
    String,
    Boolean,
    ObjectId,
    DateTime,
    Binary,
    Other,
}

/// Hashable, orderable stand-in for a `Bson` value used as an index or
/// uniqueness key. `DocKey::from_bson` returns `None` only for `Array` —
/// arrays are indexed per-element by `FieldIndex`, never as a single key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocKey {
    tag: Tag,
    bytes: Vec<u8>,
}

fn encode_i64_sortable(n: i64) -> [u8; 8] {
    ((n as u64) ^ 0x8000_0000_0000_0000).to_be_bytes()
}

fn encode_f64_sortable(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let encoded = if (bits & 0x8000_0000_0000_0000) != 0 {
        !bits
    } else {
        bits ^ 0x8000_0000_0000_0000
    };
    encoded.to_be_bytes()
}

impl DocKey {
    pub fn from_bson(v: &Bson) -> Option<DocKey> {
        let (tag, bytes) = match v {
            Bson::Null => (Tag::Null, Vec::new()),
            Bson::Int32(n) => (Tag::Number, encode_i64_sortable(*n as i64).to_vec()),
            Bson::Int64(n) => (Tag::Number, encode_i64_sortable(*n).to_vec()),
            Bson::Double(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    (Tag::Number, encode_i64_sortable(*f as i64).to_vec())
                } else {
                    (Tag::Number, encode_f64_sortable(*f).to_vec())
                }
            }
            Bson::String(s) => (Tag::String, s.as_bytes().to_vec()),
            Bson::Boolean(b) => (Tag::Boolean, vec![*b as u8]),
            Bson::ObjectId(oid) => (Tag::ObjectId, oid.bytes().to_vec()),
            Bson::DateTime(dt) => (Tag::DateTime, encode_i64_sortable(dt.timestamp_millis()).to_vec()),
            Bson::Binary(b) => (Tag::Binary, b.bytes.clone()),
            Bson::Array(_) => return None,
            Bson::Document(doc) => (Tag::Other, bson::to_vec(doc).ok()?),
            other => (Tag::Other, bson::to_vec(other).ok()?),
        };
        Some(DocKey { tag, bytes })
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Tag::String => write!(f, "{}", String::from_utf8_lossy(&self.bytes)),
            _ => write!(f, "{:?}:{:02x?}", self.tag, self.bytes),
        }
    }
}

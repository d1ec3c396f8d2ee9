//! Path Engine.
//!
//! Parses dotted field paths (`"a.b.2.c"`, `"items.$.qty"`) and resolves
//! them against a document for reading, presence-testing, writing, and
//! deleting. A path segment that looks like an integer is an array index
//! when the value at that point is an array, and an ordinary field name
//! when it's a document — the same segment text means different things
//! depending on what it's walking into, decided at resolution time, never
//! at parse time.

use std::borrow::Cow;
use std::fmt;

use bson::{Bson, Document};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Empty,
    PositionalWithoutMatch,
    NonArrayTarget(String),
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Empty => write!(f, "path has no segments"),
            PathError::PositionalWithoutMatch => {
                write!(f, "the positional operator did not find the match needed from the query")
            }
            PathError::NonArrayTarget(seg) => {
                write!(f, "cannot use the part ({seg}) of the path to traverse a non-array")
            }
        }
    }
}

impl std::error::Error for PathError {}

#[derive(Debug, Clone)]
enum Segment {
    Named(String),
    Positional,
}

/// Single-shot cell holding the array index the query matcher bound to
/// `$` for this update call. Owned by the caller's update call frame —
/// the first path that contains `$` consumes it via `take`; any later
/// path in the same update document that also contains `$` finds it
/// already empty and fails with `PositionalWithoutMatch`.
#[derive(Debug, Default)]
pub struct MatchPosition(std::cell::Cell<Option<usize>>);

impl MatchPosition {
    pub fn some(pos: usize) -> Self {
        MatchPosition(std::cell::Cell::new(Some(pos)))
    }

    pub fn none() -> Self {
        MatchPosition(std::cell::Cell::new(None))
    }

    fn take(&self) -> Option<usize> {
        self.0.take()
    }
}

#[derive(Debug, Clone)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub fn parse(s: &str) -> Self {
        let segments = s
            .split('.')
            .map(|seg| {
                if seg == "$" {
                    Segment::Positional
                } else {
                    Segment::Named(seg.to_string())
                }
            })
            .collect();
        Path { segments }
    }

    /// Binds any `$` segment to a concrete array index, consuming `ctx`
    /// exactly once, and returns a path with no positional segments left.
    /// Callers that need to both read and write the same path (`$inc`,
    /// `$push`, ...) resolve once up front rather than letting `get` and
    /// `set` each try to consume the single-shot match position — only
    /// the first would succeed, silently discarding the read.
    pub fn resolve(&self, ctx: &MatchPosition) -> Result<Path, PathError> {
        let segments = self
            .segments
            .iter()
            .map(|seg| Self::resolve_segment(seg, ctx).map(|s| Segment::Named(s.into_owned())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Path { segments })
    }

    fn resolve_segment<'s>(
        seg: &'s Segment,
        ctx: &MatchPosition,
    ) -> Result<Cow<'s, str>, PathError> {
        match seg {
            Segment::Named(s) => Ok(Cow::Borrowed(s.as_str())),
            Segment::Positional => {
                let idx = ctx.take().ok_or(PathError::PositionalWithoutMatch)?;
                Ok(Cow::Owned(idx.to_string()))
            }
        }
    }

    /// Reads the value at this path, or `None` if any segment is absent.
    /// A stored `null` is `Some(&Bson::Null)`, distinct from absence.
    pub fn get<'a>(&self, doc: &'a Document, ctx: &MatchPosition) -> Option<&'a Bson> {
        let (first, rest) = self.segments.split_first()?;
        let key = Self::resolve_segment(first, ctx).ok()?;
        let mut current = doc.get(key.as_ref())?;
        for seg in rest {
            let key = Self::resolve_segment(seg, ctx).ok()?;
            current = Self::step(current, &key)?;
        }
        Some(current)
    }

    fn step<'a>(current: &'a Bson, key: &str) -> Option<&'a Bson> {
        match current {
            Bson::Document(d) => d.get(key),
            Bson::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get(i)),
            _ => None,
        }
    }

    /// Whether the path resolves to anything, including a stored `null`.
    pub fn has(&self, doc: &Document, ctx: &MatchPosition) -> bool {
        self.get(doc, ctx).is_some()
    }

    /// Writes `value` at this path, autovivifying missing intermediate
    /// documents. If an intermediate segment exists but is neither a
    /// document nor an array, it is overwritten with a fresh document
    /// holding the remainder of the path.
    pub fn set(&self, doc: &mut Document, ctx: &MatchPosition, value: Bson) -> Result<(), PathError> {
        Self::set_at(doc, &self.segments, ctx, value)
    }

    fn set_at(
        doc: &mut Document,
        segs: &[Segment],
        ctx: &MatchPosition,
        value: Bson,
    ) -> Result<(), PathError> {
        let (head, rest) = segs.split_first().ok_or(PathError::Empty)?;
        let key = Self::resolve_segment(head, ctx)?.into_owned();
        if rest.is_empty() {
            doc.insert(key, value);
            return Ok(());
        }
        if !doc.contains_key(&key) {
            doc.insert(key.clone(), Bson::Document(Document::new()));
        }
        match doc.get_mut(&key) {
            Some(Bson::Document(sub)) => Self::set_at(sub, rest, ctx, value),
            Some(Bson::Array(arr)) => Self::set_array(arr, rest, ctx, value),
            Some(other) => {
                let mut fresh = Document::new();
                Self::set_at(&mut fresh, rest, ctx, value)?;
                *other = Bson::Document(fresh);
                Ok(())
            }
            None => unreachable!("just inserted or already present"),
        }
    }

    fn set_array(
        arr: &mut Vec<Bson>,
        segs: &[Segment],
        ctx: &MatchPosition,
        value: Bson,
    ) -> Result<(), PathError> {
        let (head, rest) = segs.split_first().ok_or(PathError::Empty)?;
        let text = Self::resolve_segment(head, ctx)?;
        let idx: usize = text
            .parse()
            .map_err(|_| PathError::NonArrayTarget(text.clone().into_owned()))?;
        while arr.len() <= idx {
            arr.push(Bson::Null);
        }
        if rest.is_empty() {
            arr[idx] = value;
            return Ok(());
        }
        match &mut arr[idx] {
            Bson::Document(sub) => Self::set_at(sub, rest, ctx, value),
            Bson::Array(sub) => Self::set_array(sub, rest, ctx, value),
            other => {
                let mut fresh = Document::new();
                Self::set_at(&mut fresh, rest, ctx, value)?;
                *other = Bson::Document(fresh);
                Ok(())
            }
        }
    }

    /// Removes the value at this path. Array terminals are spliced out
    /// (remaining elements shift left); document terminals are deleted.
    /// Returns whether anything was actually removed.
    pub fn remove(&self, doc: &mut Document, ctx: &MatchPosition) -> Result<bool, PathError> {
        Self::remove_at(doc, &self.segments, ctx)
    }

    fn remove_at(doc: &mut Document, segs: &[Segment], ctx: &MatchPosition) -> Result<bool, PathError> {
        let (head, rest) = segs.split_first().ok_or(PathError::Empty)?;
        let key = Self::resolve_segment(head, ctx)?.into_owned();
        if rest.is_empty() {
            return Ok(doc.remove(&key).is_some());
        }
        match doc.get_mut(&key) {
            Some(Bson::Document(sub)) => Self::remove_at(sub, rest, ctx),
            Some(Bson::Array(arr)) => Self::remove_array(arr, rest, ctx),
            _ => Ok(false),
        }
    }

    fn remove_array(arr: &mut Vec<Bson>, segs: &[Segment], ctx: &MatchPosition) -> Result<bool, PathError> {
        let (head, rest) = segs.split_first().ok_or(PathError::Empty)?;
        let text = Self::resolve_segment(head, ctx)?;
        let idx: usize = match text.parse() {
            Ok(i) => i,
            Err(_) => return Ok(false),
        };
        if idx >= arr.len() {
            return Ok(false);
        }
        if rest.is_empty() {
            arr.remove(idx);
            return Ok(true);
        }
        match &mut arr[idx] {
            Bson::Document(sub) => Self::remove_at(sub, rest, ctx),
            Bson::Array(sub) => Self::remove_array(sub, rest, ctx),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn get_simple_field() {
        let d = doc! { "a": 1 };
        let p = Path::parse("a");
        assert_eq!(p.get(&d, &MatchPosition::none()), Some(&Bson::Int32(1)));
    }

    #[test]
    fn get_missing_field_is_none() {
        let d = doc! { "a": 1 };
        let p = Path::parse("b");
        assert_eq!(p.get(&d, &MatchPosition::none()), None);
    }

    #[test]
    fn get_stored_null_is_distinct_from_absent() {
        let d = doc! { "a": Bson::Null };
        let p = Path::parse("a");
        assert!(p.has(&d, &MatchPosition::none()));
        assert_eq!(p.get(&d, &MatchPosition::none()), Some(&Bson::Null));
    }

    #[test]
    fn get_nested_document() {
        let d = doc! { "a": { "b": { "c": 7 } } };
        let p = Path::parse("a.b.c");
        assert_eq!(p.get(&d, &MatchPosition::none()), Some(&Bson::Int32(7)));
    }

    #[test]
    fn get_array_index() {
        let d = doc! { "items": [10, 20, 30] };
        let p = Path::parse("items.1");
        assert_eq!(p.get(&d, &MatchPosition::none()), Some(&Bson::Int32(20)));
    }

    #[test]
    fn get_array_as_map_with_non_numeric_segment_is_none() {
        let d = doc! { "items": [{ "x": 1 }] };
        let p = Path::parse("items.x");
        assert_eq!(p.get(&d, &MatchPosition::none()), None);
    }

    #[test]
    fn get_positional_resolves_through_match_position() {
        let d = doc! { "items": [{ "qty": 1 }, { "qty": 2 }] };
        let p = Path::parse("items.$.qty");
        let ctx = MatchPosition::some(1);
        assert_eq!(p.get(&d, &ctx), Some(&Bson::Int32(2)));
    }

    #[test]
    fn positional_without_match_yields_none_on_get() {
        let d = doc! { "items": [1, 2] };
        let p = Path::parse("items.$");
        assert_eq!(p.get(&d, &MatchPosition::none()), None);
    }

    #[test]
    fn positional_is_single_shot() {
        let ctx = MatchPosition::some(0);
        assert_eq!(ctx.take(), Some(0));
        assert_eq!(ctx.take(), None);
    }

    #[test]
    fn set_autovivifies_intermediate_documents() {
        let mut d = doc! {};
        let p = Path::parse("a.b.c");
        p.set(&mut d, &MatchPosition::none(), Bson::Int32(5)).unwrap();
        assert_eq!(d, doc! { "a": { "b": { "c": 5 } } });
    }

    #[test]
    fn set_overwrites_non_container_intermediate() {
        let mut d = doc! { "a": 1 };
        let p = Path::parse("a.b");
        p.set(&mut d, &MatchPosition::none(), Bson::Int32(2)).unwrap();
        assert_eq!(d, doc! { "a": { "b": 2 } });
    }

    #[test]
    fn set_array_index_pads_with_null() {
        let mut d = doc! { "items": [1] };
        let p = Path::parse("items.2");
        p.set(&mut d, &MatchPosition::none(), Bson::Int32(9)).unwrap();
        assert_eq!(d, doc! { "items": [1, Bson::Null, 9] });
    }

    #[test]
    fn set_positional_without_match_errors() {
        let mut d = doc! { "items": [1, 2] };
        let p = Path::parse("items.$");
        let err = p.set(&mut d, &MatchPosition::none(), Bson::Int32(9)).unwrap_err();
        assert_eq!(err, PathError::PositionalWithoutMatch);
    }

    #[test]
    fn remove_document_field() {
        let mut d = doc! { "a": 1, "b": 2 };
        let p = Path::parse("a");
        assert!(p.remove(&mut d, &MatchPosition::none()).unwrap());
        assert_eq!(d, doc! { "b": 2 });
    }

    #[test]
    fn remove_array_element_shifts_left() {
        let mut d = doc! { "items": [1, 2, 3] };
        let p = Path::parse("items.1");
        assert!(p.remove(&mut d, &MatchPosition::none()).unwrap());
        assert_eq!(d, doc! { "items": [1, 3] });
    }

    #[test]
    fn resolve_binds_positional_once_for_reuse_across_get_and_set() {
        let mut d = doc! { "items": [{ "count": 5 }, { "count": 9 }] };
        let raw = Path::parse("items.$.count");
        let ctx = MatchPosition::some(1);
        let resolved = raw.resolve(&ctx).unwrap();
        assert_eq!(resolved.get(&d, &MatchPosition::none()), Some(&Bson::Int32(9)));
        resolved.set(&mut d, &MatchPosition::none(), Bson::Int32(99)).unwrap();
        assert_eq!(d, doc! { "items": [{ "count": 5 }, { "count": 99 }] });
    }

    #[test]
    fn resolve_without_match_errors() {
        let raw = Path::parse("items.$.count");
        assert_eq!(raw.resolve(&MatchPosition::none()).unwrap_err(), PathError::PositionalWithoutMatch);
    }

    #[test]
    fn remove_missing_path_returns_false() {
        let mut d = doc! { "a": 1 };
        let p = Path::parse("z");
        assert!(!p.remove(&mut d, &MatchPosition::none()).unwrap());
    }
}

//! Query Matcher.
//!
//! Parses a MongoDB-style query document into a `Predicate` tree and
//! evaluates it against a document. A successful match on a path that
//! descended into an array records the first matching element's index
//! as a "match position" — the Update Engine binds that to `$` when a
//! query and an update are applied together (`findAndModify`, positional
//! `updateDocuments`).

use std::fmt;

use bson::{Bson, Document};
use regex::Regex;

use crate::value::{cmp_values, values_equal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    UnknownOperator(String),
    BadOperatorValue { op: String, reason: String },
    DollarInFieldPosition(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::UnknownOperator(op) => write!(f, "unknown operator: {op}"),
            QueryError::BadOperatorValue { op, reason } => {
                write!(f, "bad value for operator {op}: {reason}")
            }
            QueryError::DollarInFieldPosition(s) => {
                write!(f, "unexpected operator in field position: {s}")
            }
        }
    }
}

impl std::error::Error for QueryError {}

#[derive(Debug, Clone)]
enum Cmp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone)]
enum Leaf {
    Cmp(Cmp, Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Exists(bool),
    All(Vec<Bson>),
    Size(i64),
    Regex(Regex),
    Type(String),
    Mod { divisor: i64, remainder: i64 },
    ElemMatch(ElemMatchKind),
    Not(Box<Leaf>),
}

#[derive(Debug, Clone)]
enum ElemMatchKind {
    Document(Box<Predicate>),
    Scalar(Vec<Leaf>),
}

#[derive(Debug, Clone)]
enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Nor(Vec<Predicate>),
    Field(String, Vec<Leaf>),
}

/// Parses a query document into a `Query`, ready to evaluate with `matches`.
#[derive(Debug, Clone)]
pub struct Query {
    predicate: Predicate,
}

fn bson_type_name(v: &Bson) -> &'static str {
    match v {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::Undefined => "undefined",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::DbPointer(_) => "dbPointer",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::Symbol(_) => "symbol",
        Bson::JavaScriptCodeWithScope(_) => "javascriptWithScope",
        Bson::Int32(_) => "int",
        Bson::Timestamp(_) => "timestamp",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
    }
}

fn parse_leaves(op_doc: &Document) -> Result<Vec<Leaf>, QueryError> {
    let mut leaves = Vec::new();
    for (op, val) in op_doc.iter() {
        let leaf = match op.as_str() {
            "$eq" => Leaf::Cmp(Cmp::Eq, val.clone()),
            "$ne" => Leaf::Cmp(Cmp::Ne, val.clone()),
            "$gt" => Leaf::Cmp(Cmp::Gt, val.clone()),
            "$gte" => Leaf::Cmp(Cmp::Gte, val.clone()),
            "$lt" => Leaf::Cmp(Cmp::Lt, val.clone()),
            "$lte" => Leaf::Cmp(Cmp::Lte, val.clone()),
            "$in" => Leaf::In(as_array(op, val)?),
            "$nin" => Leaf::Nin(as_array(op, val)?),
            "$exists" => Leaf::Exists(matches!(val, Bson::Boolean(true))),
            "$all" => Leaf::All(as_array(op, val)?),
            "$size" => {
                let n = val.as_i64().or_else(|| val.as_i32().map(i64::from)).ok_or_else(|| {
                    QueryError::BadOperatorValue {
                        op: op.clone(),
                        reason: "expected an integer".into(),
                    }
                })?;
                Leaf::Size(n)
            }
            "$regex" => {
                let pattern = val.as_str().ok_or_else(|| QueryError::BadOperatorValue {
                    op: op.clone(),
                    reason: "expected a string pattern".into(),
                })?;
                let flags = op_doc.get_str("$options").unwrap_or("");
                let inline = if flags.is_empty() {
                    pattern.to_string()
                } else {
                    format!("(?{flags}){pattern}")
                };
                let re = Regex::new(&inline).map_err(|e| QueryError::BadOperatorValue {
                    op: op.clone(),
                    reason: e.to_string(),
                })?;
                Leaf::Regex(re)
            }
            "$options" => continue,
            "$type" => {
                let name = val.as_str().ok_or_else(|| QueryError::BadOperatorValue {
                    op: op.clone(),
                    reason: "expected a type name string".into(),
                })?;
                Leaf::Type(name.to_string())
            }
            "$mod" => {
                let arr = as_array(op, val)?;
                if arr.len() != 2 {
                    return Err(QueryError::BadOperatorValue {
                        op: op.clone(),
                        reason: "expected [divisor, remainder]".into(),
                    });
                }
                let divisor = arr[0].as_i64().or_else(|| arr[0].as_i32().map(i64::from));
                let remainder = arr[1].as_i64().or_else(|| arr[1].as_i32().map(i64::from));
                match (divisor, remainder) {
                    (Some(divisor), Some(remainder)) => Leaf::Mod { divisor, remainder },
                    _ => {
                        return Err(QueryError::BadOperatorValue {
                            op: op.clone(),
                            reason: "divisor and remainder must be integers".into(),
                        })
                    }
                }
            }
            "$not" => {
                let inner_doc = val.as_document().ok_or_else(|| QueryError::BadOperatorValue {
                    op: op.clone(),
                    reason: "expected an operator document".into(),
                })?;
                let inner = parse_leaves(inner_doc)?;
                let inner = inner.into_iter().next().ok_or_else(|| QueryError::BadOperatorValue {
                    op: op.clone(),
                    reason: "empty operator document".into(),
                })?;
                Leaf::Not(Box::new(inner))
            }
            "$elemMatch" => {
                let inner_doc = val.as_document().ok_or_else(|| QueryError::BadOperatorValue {
                    op: op.clone(),
                    reason: "expected a document".into(),
                })?;
                if is_operator_document(inner_doc) {
                    Leaf::ElemMatch(ElemMatchKind::Scalar(parse_leaves(inner_doc)?))
                } else {
                    Leaf::ElemMatch(ElemMatchKind::Document(Box::new(parse_query_document(inner_doc)?)))
                }
            }
            other => {
                return Err(QueryError::UnknownOperator(other.to_string()));
            }
        };
        leaves.push(leaf);
    }
    Ok(leaves)
}

fn as_array(op: &str, val: &Bson) -> Result<Vec<Bson>, QueryError> {
    val.as_array().cloned().ok_or_else(|| QueryError::BadOperatorValue {
        op: op.to_string(),
        reason: "expected an array".into(),
    })
}

fn parse_query_document(doc: &Document) -> Result<Predicate, QueryError> {
    let mut clauses = Vec::new();
    for (field, val) in doc.iter() {
        match field.as_str() {
            "$and" => clauses.push(Predicate::And(parse_predicate_array(val)?)),
            "$or" => clauses.push(Predicate::Or(parse_predicate_array(val)?)),
            "$nor" => clauses.push(Predicate::Nor(parse_predicate_array(val)?)),
            f if f.starts_with('$') => {
                return Err(QueryError::DollarInFieldPosition(f.to_string()));
            }
            f => {
                let leaves = match val {
                    Bson::Document(d) if is_operator_document(d) => parse_leaves(d)?,
                    other => vec![Leaf::Cmp(Cmp::Eq, other.clone())],
                };
                clauses.push(Predicate::Field(f.to_string(), leaves));
            }
        }
    }
    Ok(Predicate::And(clauses))
}

fn is_operator_document(d: &Document) -> bool {
    d.keys().next().map(|k| k.starts_with('$')).unwrap_or(false)
}

fn parse_predicate_array(val: &Bson) -> Result<Vec<Predicate>, QueryError> {
    let arr = val.as_array().ok_or_else(|| QueryError::BadOperatorValue {
        op: "$and/$or/$nor".into(),
        reason: "expected an array of query documents".into(),
    })?;
    arr.iter()
        .map(|v| {
            v.as_document()
                .ok_or_else(|| QueryError::BadOperatorValue {
                    op: "$and/$or/$nor".into(),
                    reason: "expected a query document".into(),
                })
                .and_then(parse_query_document)
        })
        .collect()
}

pub fn parse_query(doc: &Document) -> Result<Query, QueryError> {
    Ok(Query {
        predicate: parse_query_document(doc)?,
    })
}

/// Evaluates `query` against `doc`. On a match through an array field,
/// returns the index of the first array element that satisfied the
/// clause — this is what `$` binds to for a subsequent update.
pub fn match_document(query: &Query, doc: &Document) -> Option<Option<usize>> {
    let mut match_pos = None;
    if eval_predicate(&query.predicate, doc, &mut match_pos) {
        Some(match_pos)
    } else {
        None
    }
}

fn eval_predicate(pred: &Predicate, doc: &Document, match_pos: &mut Option<usize>) -> bool {
    match pred {
        Predicate::And(clauses) => clauses.iter().all(|c| eval_predicate(c, doc, match_pos)),
        Predicate::Or(clauses) => clauses.iter().any(|c| eval_predicate(c, doc, match_pos)),
        Predicate::Nor(clauses) => !clauses.iter().any(|c| {
            let mut discard = None;
            eval_predicate(c, doc, &mut discard)
        }),
        Predicate::Field(field, leaves) => eval_field(field, leaves, doc, match_pos),
    }
}

/// Evaluates `leaves` against every value `field` can resolve to. A dotted
/// segment that meets an array whose next segment isn't an index maps the
/// rest of the path over each element, so `"arr.x"` against an array of
/// documents checks `x` on every element rather than failing outright.
fn eval_field(field: &str, leaves: &[Leaf], doc: &Document, match_pos: &mut Option<usize>) -> bool {
    let segments: Vec<&str> = field.split('.').collect();
    let (first, rest) = match segments.split_first() {
        Some(parts) => parts,
        None => return false,
    };
    let candidates = match doc.get(*first) {
        Some(v) => resolve_values(v, rest),
        None => vec![(None, None)],
    };
    for (value, array_pos) in candidates {
        let mut elem_pos = None;
        if leaves.iter().all(|leaf| eval_leaf(leaf, value, &mut elem_pos)) {
            if match_pos.is_none() {
                *match_pos = array_pos.or(elem_pos);
            }
            return true;
        }
    }
    false
}

/// Walks `segments` from `value`, returning every terminal value reached
/// together with the array index (if any) a non-numeric segment mapped
/// over. Stepping off a document or a numeric array index never contributes
/// a position; only the implicit per-element array traversal does.
fn resolve_values<'a>(value: &'a Bson, segments: &[&str]) -> Vec<(Option<&'a Bson>, Option<usize>)> {
    let (seg, rest) = match segments.split_first() {
        None => return vec![(Some(value), None)],
        Some(parts) => parts,
    };
    match value {
        Bson::Document(d) => match d.get(*seg) {
            Some(v) => resolve_values(v, rest),
            None => vec![(None, None)],
        },
        Bson::Array(arr) => match seg.parse::<usize>() {
            Ok(idx) => match arr.get(idx) {
                Some(v) => resolve_values(v, rest),
                None => vec![(None, None)],
            },
            Err(_) => {
                let mut out = Vec::new();
                for (i, el) in arr.iter().enumerate() {
                    for (v, inner_pos) in resolve_values(el, segments) {
                        out.push((v, inner_pos.or(Some(i))));
                    }
                }
                if out.is_empty() {
                    vec![(None, None)]
                } else {
                    out
                }
            }
        },
        _ => vec![(None, None)],
    }
}

fn eval_leaf(leaf: &Leaf, value: Option<&Bson>, match_pos: &mut Option<usize>) -> bool {
    match leaf {
        Leaf::Exists(want) => value.is_some() == *want,
        Leaf::Cmp(op, rhs) => match value {
            Some(Bson::Array(arr)) if !matches!(op, Cmp::Ne) => {
                for (i, el) in arr.iter().enumerate() {
                    if cmp_leaf(op, el, rhs) {
                        if match_pos.is_none() {
                            *match_pos = Some(i);
                        }
                        return true;
                    }
                }
                cmp_leaf(op, &Bson::Array(arr.clone()), rhs)
            }
            Some(v) => cmp_leaf(op, v, rhs),
            None => cmp_leaf(op, &Bson::Null, rhs),
        },
        Leaf::In(set) => match value {
            Some(Bson::Array(arr)) => {
                for (i, el) in arr.iter().enumerate() {
                    if set.iter().any(|s| values_equal(s, el)) {
                        if match_pos.is_none() {
                            *match_pos = Some(i);
                        }
                        return true;
                    }
                }
                set.iter().any(|s| values_equal(s, &Bson::Array(arr.clone())))
            }
            Some(v) => set.iter().any(|s| values_equal(s, v)),
            None => set.iter().any(|s| matches!(s, Bson::Null)),
        },
        Leaf::Nin(set) => !eval_leaf(&Leaf::In(set.clone()), value, &mut None),
        Leaf::All(required) => match value {
            Some(Bson::Array(arr)) => required.iter().all(|r| arr.iter().any(|e| values_equal(e, r))),
            _ => required.is_empty(),
        },
        Leaf::Size(n) => match value {
            Some(Bson::Array(arr)) => arr.len() as i64 == *n,
            _ => false,
        },
        Leaf::Regex(re) => match value {
            Some(Bson::String(s)) => re.is_match(s),
            Some(Bson::Array(arr)) => arr.iter().any(|e| matches!(e, Bson::String(s) if re.is_match(s))),
            _ => false,
        },
        Leaf::Type(name) => match value {
            Some(v) => bson_type_name(v) == name,
            None => false,
        },
        Leaf::Mod { divisor, remainder } => match value.and_then(|v| v.as_i64().or_else(|| v.as_i32().map(i64::from))) {
            Some(n) => divisor != &0 && n % divisor == *remainder,
            None => false,
        },
        Leaf::Not(inner) => !eval_leaf(inner, value, &mut None),
        Leaf::ElemMatch(kind) => match value {
            Some(Bson::Array(arr)) => {
                for (i, el) in arr.iter().enumerate() {
                    let matched = match (kind, el) {
                        (ElemMatchKind::Document(pred), Bson::Document(d)) => {
                            let mut discard = None;
                            eval_predicate(pred, d, &mut discard)
                        }
                        (ElemMatchKind::Scalar(leaves), scalar) => {
                            let mut discard = None;
                            leaves.iter().all(|leaf| eval_leaf(leaf, Some(scalar), &mut discard))
                        }
                        _ => false,
                    };
                    if matched {
                        if match_pos.is_none() {
                            *match_pos = Some(i);
                        }
                        return true;
                    }
                }
                false
            }
            _ => false,
        },
    }
}

fn cmp_leaf(op: &Cmp, a: &Bson, b: &Bson) -> bool {
    match op {
        Cmp::Eq => values_equal(a, b),
        Cmp::Ne => !values_equal(a, b),
        Cmp::Gt => cmp_values(a, b) == std::cmp::Ordering::Greater,
        Cmp::Gte => cmp_values(a, b) != std::cmp::Ordering::Less,
        Cmp::Lt => cmp_values(a, b) == std::cmp::Ordering::Less,
        Cmp::Lte => cmp_values(a, b) != std::cmp::Ordering::Greater,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(query: &Document, doc: &Document) -> bool {
        match_document(&parse_query(query).unwrap(), doc).is_some()
    }

    #[test]
    fn implicit_equality() {
        let q = doc! { "a": 1 };
        assert!(matches(&q, &doc! { "a": 1 }));
        assert!(!matches(&q, &doc! { "a": 2 }));
    }

    #[test]
    fn equality_on_array_field_matches_element_or_whole_array() {
        let q = doc! { "tags": "x" };
        assert!(matches(&q, &doc! { "tags": ["x", "y"] }));
        let q2 = doc! { "tags": ["x", "y"] };
        assert!(matches(&q2, &doc! { "tags": ["x", "y"] }));
    }

    #[test]
    fn comparison_operators() {
        assert!(matches(&doc! { "a": { "$gt": 5 } }, &doc! { "a": 6 }));
        assert!(!matches(&doc! { "a": { "$gt": 5 } }, &doc! { "a": 5 }));
        assert!(matches(&doc! { "a": { "$lte": 5 } }, &doc! { "a": 5 }));
    }

    #[test]
    fn exists_distinguishes_absent_from_null() {
        assert!(matches(&doc! { "a": { "$exists": true } }, &doc! { "a": Bson::Null }));
        assert!(!matches(&doc! { "a": { "$exists": true } }, &doc! { "b": 1 }));
    }

    #[test]
    fn in_and_nin() {
        assert!(matches(&doc! { "a": { "$in": [1, 2, 3] } }, &doc! { "a": 2 }));
        assert!(matches(&doc! { "a": { "$nin": [1, 2, 3] } }, &doc! { "a": 9 }));
    }

    #[test]
    fn all_requires_every_element_present() {
        assert!(matches(&doc! { "tags": { "$all": ["a", "b"] } }, &doc! { "tags": ["a", "b", "c"] }));
        assert!(!matches(&doc! { "tags": { "$all": ["a", "z"] } }, &doc! { "tags": ["a", "b"] }));
    }

    #[test]
    fn size_operator() {
        assert!(matches(&doc! { "tags": { "$size": 2 } }, &doc! { "tags": ["a", "b"] }));
        assert!(!matches(&doc! { "tags": { "$size": 3 } }, &doc! { "tags": ["a", "b"] }));
    }

    #[test]
    fn regex_operator() {
        assert!(matches(&doc! { "name": { "$regex": "^jo" } }, &doc! { "name": "john" }));
        assert!(!matches(&doc! { "name": { "$regex": "^jo" } }, &doc! { "name": "amy" }));
    }

    #[test]
    fn type_operator() {
        assert!(matches(&doc! { "a": { "$type": "int" } }, &doc! { "a": 1i32 }));
        assert!(matches(&doc! { "a": { "$type": "string" } }, &doc! { "a": "x" }));
    }

    #[test]
    fn mod_operator() {
        assert!(matches(&doc! { "a": { "$mod": [4, 1] } }, &doc! { "a": 9 }));
        assert!(!matches(&doc! { "a": { "$mod": [4, 1] } }, &doc! { "a": 8 }));
    }

    #[test]
    fn not_operator_negates() {
        assert!(matches(&doc! { "a": { "$not": { "$gt": 5 } } }, &doc! { "a": 3 }));
        assert!(!matches(&doc! { "a": { "$not": { "$gt": 5 } } }, &doc! { "a": 6 }));
    }

    #[test]
    fn elem_match_requires_single_element_to_satisfy_all_clauses() {
        let q = doc! { "items": { "$elemMatch": { "qty": { "$gt": 5 }, "name": "nuts" } } };
        assert!(matches(&q, &doc! { "items": [{ "qty": 3, "name": "nuts" }, { "qty": 10, "name": "nuts" }] }));
        assert!(!matches(&q, &doc! { "items": [{ "qty": 3, "name": "nuts" }, { "qty": 10, "name": "bolts" }] }));
    }

    #[test]
    fn logical_and_or_nor() {
        assert!(matches(&doc! { "$and": [{ "a": 1 }, { "b": 2 }] }, &doc! { "a": 1, "b": 2 }));
        assert!(matches(&doc! { "$or": [{ "a": 1 }, { "a": 2 }] }, &doc! { "a": 2 }));
        assert!(matches(&doc! { "$nor": [{ "a": 1 }, { "a": 2 }] }, &doc! { "a": 3 }));
    }

    #[test]
    fn match_position_recorded_for_array_field_predicate() {
        let q = parse_query(&doc! { "items.qty": { "$gt": 5 } }).unwrap();
        let d = doc! { "items": [{ "qty": 1 }] };
        assert!(match_document(&q, &d).is_none());

        let q2 = parse_query(&doc! { "qty": { "$gt": 5 } }).unwrap();
        assert_eq!(match_document(&q2, &doc! { "qty": [1, 9, 2] }), Some(Some(1)));
    }

    #[test]
    fn dotted_path_through_array_of_documents_matches_element_field() {
        let q = parse_query(&doc! { "arr.x": 2 }).unwrap();
        let d = doc! { "arr": [{ "x": 1 }, { "x": 2 }, { "x": 3 }] };
        assert_eq!(match_document(&q, &d), Some(Some(1)));

        let q2 = parse_query(&doc! { "arr.x": { "$gt": 5 } }).unwrap();
        assert!(match_document(&q2, &d).is_none());
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert!(parse_query(&doc! { "a": { "$bogus": 1 } }).is_err());
    }
}

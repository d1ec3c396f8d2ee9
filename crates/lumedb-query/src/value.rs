//! Value Comparator & Arithmetic.
//!
//! Total ordering across heterogeneous BSON kinds, numeric promotion for
//! `$inc`/`$mul`, and structural (not byte-level) equality with numeric
//! cross-type coercion — `Bson::Int32(5)` and `Bson::Int64(5)` compare and
//! hash the same way, generalized across all three numeric kinds.

use std::cmp::Ordering;
use std::fmt;

use bson::Bson;

#[derive(Debug, Clone, PartialEq)]
pub struct ArithmeticError(pub String);

impl fmt::Display for ArithmeticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ArithmeticError {}

fn is_numeric(v: &Bson) -> bool {
    matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

/// Cross-kind tie-break rank:
/// null < number < string < document < array < binary < object-id < bool
/// < datetime < timestamp. BSON kinds the core never produces or accepts
/// as stored values (regex, symbol, decimal128, min/max key, ...) sort
/// after everything named above — they can only appear via a query-only
/// predicate value, never as a matched value, so their relative order
/// among themselves is unobseruable and left unspecified.
fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::Null => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 1,
        Bson::String(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Binary(_) => 5,
        Bson::ObjectId(_) => 6,
        Bson::Boolean(_) => 7,
        Bson::DateTime(_) => 8,
        Bson::Timestamp(_) => 9,
        _ => 10,
    }
}

fn cmp_numeric(a: &Bson, b: &Bson) -> Ordering {
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => x.cmp(y),
        (Bson::Int64(x), Bson::Int64(y)) => x.cmp(y),
        (Bson::Int32(x), Bson::Int64(y)) => (*x as i64).cmp(y),
        (Bson::Int64(x), Bson::Int32(y)) => x.cmp(&(*y as i64)),
        (Bson::Double(x), Bson::Double(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Bson::Int32(x), Bson::Double(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
        (Bson::Double(x), Bson::Int32(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
        (Bson::Int64(x), Bson::Double(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
        (Bson::Double(x), Bson::Int64(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
        _ => unreachable!("cmp_numeric called with non-numeric operand"),
    }
}

fn cmp_arrays(a: &[Bson], b: &[Bson]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = cmp_values(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn cmp_documents(a: &bson::Document, b: &bson::Document) -> Ordering {
    for ((k1, v1), (k2, v2)) in a.iter().zip(b.iter()) {
        let ord = k1.cmp(k2).then_with(|| cmp_values(v1, v2));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Total order over `Bson` values. `null` compares
/// equal to `null`; callers resolve "missing field" to `Bson::Null`
/// before calling this (the Path Engine does that for matcher/sort use).
pub fn cmp_values(a: &Bson, b: &Bson) -> Ordering {
    if is_numeric(a) && is_numeric(b) {
        return cmp_numeric(a, b);
    }
    match (a, b) {
        (Bson::Null, Bson::Null) => Ordering::Equal,
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Document(x), Bson::Document(y)) => cmp_documents(x, y),
        (Bson::Array(x), Bson::Array(y)) => cmp_arrays(x, y),
        (Bson::Binary(x), Bson::Binary(y)) => x.bytes.cmp(&y.bytes),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Deep, order-sensitive structural equality with numeric cross-type
/// coercion (`Int32(5)` equals `Int64(5)` equals `Double(5.0)`).
/// Documents compare field-by-field in iteration order — two documents
/// with the same fields in different order are *not* equal.
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    if is_numeric(a) && is_numeric(b) {
        return cmp_numeric(a, b) == Ordering::Equal;
    }
    match (a, b) {
        (Bson::Null, Bson::Null) => true,
        (Bson::String(x), Bson::String(y)) => x == y,
        (Bson::Boolean(x), Bson::Boolean(y)) => x == y,
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x == y,
        (Bson::DateTime(x), Bson::DateTime(y)) => x == y,
        (Bson::Timestamp(x), Bson::Timestamp(y)) => x == y,
        (Bson::Binary(x), Bson::Binary(y)) => x == y,
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| values_equal(p, q))
        }
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|((k1, v1), (k2, v2))| k1 == k2 && values_equal(v1, v2))
        }
        _ => false,
    }
}

/// `$inc` / arithmetic `+`. Missing left operand is handled by the caller
/// (treated as zero of the right operand's kind).
pub fn add_values(a: &Bson, b: &Bson) -> Result<Bson, ArithmeticError> {
    arith(a, b, "increment", |x, y| x.checked_add(y), |x, y| x.checked_add(y), |x, y| x + y)
}

/// `$mul` / arithmetic `*`.
pub fn mul_values(a: &Bson, b: &Bson) -> Result<Bson, ArithmeticError> {
    arith(a, b, "multiply", |x, y| x.checked_mul(y), |x, y| x.checked_mul(y), |x, y| x * y)
}

fn arith(
    a: &Bson,
    b: &Bson,
    verb: &str,
    checked_i32: fn(i32, i32) -> Option<i32>,
    checked_i64: fn(i64, i64) -> Option<i64>,
    f: fn(f64, f64) -> f64,
) -> Result<Bson, ArithmeticError> {
    if !is_numeric(a) || !is_numeric(b) {
        let culprit = if !is_numeric(a) { a } else { b };
        return Err(ArithmeticError(format!(
            "cannot {verb} value of non-numeric type: {culprit:?}"
        )));
    }
    Ok(match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => match checked_i32(*x, *y) {
            Some(sum) => Bson::Int32(sum),
            None => match checked_i64(*x as i64, *y as i64) {
                Some(sum) => Bson::Int64(sum),
                None => Bson::Double(f(*x as f64, *y as f64)),
            },
        },
        (Bson::Int32(x), Bson::Int64(y)) | (Bson::Int64(y), Bson::Int32(x)) => {
            match checked_i64(*x as i64, *y) {
                Some(sum) => Bson::Int64(sum),
                None => Bson::Double(f(*x as f64, *y as f64)),
            }
        }
        (Bson::Int64(x), Bson::Int64(y)) => match checked_i64(*x, *y) {
            Some(sum) => Bson::Int64(sum),
            None => Bson::Double(f(*x as f64, *y as f64)),
        },
        (Bson::Double(x), Bson::Double(y)) => Bson::Double(f(*x, *y)),
        (Bson::Int32(x), Bson::Double(y)) | (Bson::Double(y), Bson::Int32(x)) => {
            Bson::Double(f(*x as f64, *y))
        }
        (Bson::Int64(x), Bson::Double(y)) | (Bson::Double(y), Bson::Int64(x)) => {
            Bson::Double(f(*x as f64, *y))
        }
        _ => unreachable!("is_numeric guarded above"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn numeric_order_crosses_kinds() {
        assert_eq!(cmp_values(&Bson::Int32(1), &Bson::Int64(2)), Ordering::Less);
        assert_eq!(
            cmp_values(&Bson::Double(1.5), &Bson::Int32(1)),
            Ordering::Greater
        );
    }

    #[test]
    fn type_rank_table_matches_spec() {
        assert_eq!(cmp_values(&Bson::Null, &Bson::Int32(0)), Ordering::Less);
        assert_eq!(
            cmp_values(&Bson::Int32(0), &Bson::String("".into())),
            Ordering::Less
        );
        assert_eq!(
            cmp_values(&Bson::String("z".into()), &Bson::Document(doc! {})),
            Ordering::Less
        );
        assert_eq!(
            cmp_values(&Bson::Document(doc! {}), &Bson::Array(vec![])),
            Ordering::Less
        );
        assert_eq!(
            cmp_values(&Bson::Array(vec![]), &Bson::Boolean(false)),
            Ordering::Less
        );
        assert_eq!(
            cmp_values(&Bson::ObjectId(bson::oid::ObjectId::new()), &Bson::Boolean(false)),
            Ordering::Less
        );
        assert_eq!(
            cmp_values(&Bson::Boolean(true), &Bson::DateTime(bson::DateTime::now())),
            Ordering::Less
        );
    }

    #[test]
    fn null_equals_null() {
        assert_eq!(cmp_values(&Bson::Null, &Bson::Null), Ordering::Equal);
        assert!(values_equal(&Bson::Null, &Bson::Null));
    }

    #[test]
    fn numeric_equality_crosses_kinds() {
        assert!(values_equal(&Bson::Int32(5), &Bson::Int64(5)));
        assert!(values_equal(&Bson::Int32(5), &Bson::Double(5.0)));
        assert!(!values_equal(&Bson::Int32(5), &Bson::Double(5.5)));
    }

    #[test]
    fn document_equality_is_order_sensitive() {
        let a = doc! { "a": 1, "b": 2 };
        let b = doc! { "b": 2, "a": 1 };
        assert!(!values_equal(&Bson::Document(a), &Bson::Document(b)));
    }

    #[test]
    fn array_equality_is_order_sensitive() {
        let a = Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]);
        let b = Bson::Array(vec![Bson::Int32(2), Bson::Int32(1)]);
        assert!(!values_equal(&a, &b));
    }

    #[test]
    fn add_i32_overflow_promotes_to_i64() {
        let r = add_values(&Bson::Int32(i32::MAX), &Bson::Int32(1)).unwrap();
        assert_eq!(r, Bson::Int64(i32::MAX as i64 + 1));
    }

    #[test]
    fn add_i64_overflow_promotes_to_double() {
        let r = add_values(&Bson::Int64(i64::MAX), &Bson::Int64(1)).unwrap();
        assert!(matches!(r, Bson::Double(_)));
    }

    #[test]
    fn add_with_double_promotes_to_double() {
        let r = add_values(&Bson::Int32(10), &Bson::Double(2.5)).unwrap();
        assert_eq!(r, Bson::Double(12.5));
    }

    #[test]
    fn add_non_numeric_errors() {
        assert!(add_values(&Bson::String("x".into()), &Bson::Int32(1)).is_err());
    }

    #[test]
    fn mul_basic() {
        let r = mul_values(&Bson::Int32(3), &Bson::Int32(4)).unwrap();
        assert_eq!(r, Bson::Int32(12));
    }

    #[test]
    fn mul_i32_overflow_promotes() {
        let r = mul_values(&Bson::Int32(i32::MAX), &Bson::Int32(2)).unwrap();
        assert_eq!(r, Bson::Int64(i32::MAX as i64 * 2));
    }
}

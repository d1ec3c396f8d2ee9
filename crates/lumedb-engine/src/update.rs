//! Update Engine: applies either a full replacement document or an
//! operator document to a snapshot of the current document, returning
//! the new document. Does not touch indexes or the document store —
//! the collection layer runs `IndexSet::check_update` against the
//! result before committing it.

use bson::{Bson, Document};

use lumedb_query::{add_values, cmp_values, mul_values, values_equal, MatchPosition, Path};

use crate::error::EngineError;

enum UpdateMode {
    Replacement,
    Operators,
}

fn classify(update: &Document) -> Result<UpdateMode, EngineError> {
    let mut saw_dollar = false;
    let mut saw_plain = false;
    for k in update.keys() {
        if k.starts_with('$') {
            saw_dollar = true;
        } else {
            saw_plain = true;
        }
    }
    if saw_dollar && saw_plain {
        return Err(EngineError::IllegalUpdate);
    }
    Ok(if saw_dollar {
        UpdateMode::Operators
    } else {
        UpdateMode::Replacement
    })
}

/// Whether every top-level key of `update` is a `$` operator. A multi
/// document update is only legal in operator form; `Collection::update_documents`
/// uses this to reject a multi update given a replacement document before
/// touching any document.
pub fn is_all_operators(update: &Document) -> bool {
    !update.is_empty() && update.keys().all(|k| k.starts_with('$'))
}

/// Applies `update` to `old`, returning the new document. `match_pos` is
/// the array index the query matcher bound to `$`, if any. `upsert_inserting`
/// is true only when this call is synthesizing a brand-new document via
/// upsert (it gates `$setOnInsert`).
pub fn apply_update(
    old: &Document,
    update: &Document,
    match_pos: Option<usize>,
    identifier_field: &str,
    upsert_inserting: bool,
) -> Result<Document, EngineError> {
    match classify(update)? {
        UpdateMode::Replacement => apply_replacement(old, update, identifier_field),
        UpdateMode::Operators => {
            apply_operators(old, update, match_pos, identifier_field, upsert_inserting)
        }
    }
}

fn apply_replacement(
    old: &Document,
    update: &Document,
    identifier_field: &str,
) -> Result<Document, EngineError> {
    let mut new_doc = update.clone();
    if let Some(old_id) = old.get(identifier_field) {
        if let Some(new_id) = new_doc.get(identifier_field) {
            if !matches!(new_id, Bson::Null) && !values_equal(old_id, new_id) {
                return Err(EngineError::CannotChangeId);
            }
        }
        new_doc.insert(identifier_field, old_id.clone());
    }
    Ok(new_doc)
}

fn validate_field_name(op: &str, field: &str, val: &Bson) -> Result<(), EngineError> {
    if op == "$unset" {
        return Ok(());
    }
    for seg in field.split('.') {
        if seg != "$" && seg.starts_with('$') {
            return Err(EngineError::DollarInFieldName(field.to_string()));
        }
    }
    validate_value_keys(field, val)
}

/// Recursively rejects `$`-prefixed keys in an embedded document or array
/// of documents being assigned, not just in the field path itself.
fn validate_value_keys(field: &str, val: &Bson) -> Result<(), EngineError> {
    match val {
        Bson::Document(d) => {
            for (k, v) in d.iter() {
                if k.starts_with('$') {
                    return Err(EngineError::DollarInFieldName(field.to_string()));
                }
                validate_value_keys(field, v)?;
            }
            Ok(())
        }
        Bson::Array(arr) => arr.iter().try_for_each(|v| validate_value_keys(field, v)),
        _ => Ok(()),
    }
}

fn apply_operators(
    old: &Document,
    update: &Document,
    match_pos: Option<usize>,
    identifier_field: &str,
    upsert_inserting: bool,
) -> Result<Document, EngineError> {
    let mut new_doc = old.clone();
    let ctx = match match_pos {
        Some(p) => MatchPosition::some(p),
        None => MatchPosition::none(),
    };

    for (op, args) in update.iter() {
        let args_doc = args.as_document().ok_or_else(|| {
            EngineError::InvalidModifier(format!("{op}: expected a document of field mutations"))
        })?;

        for (field, val) in args_doc.iter() {
            validate_field_name(op, field, val)?;
            if field == identifier_field {
                return Err(EngineError::ModOnIdNotAllowed);
            }
            // Bind `$` to a concrete index once per field: several
            // operators (`$inc`, `$push`, ...) read the current value
            // before writing the new one, and `MatchPosition` is
            // single-shot — resolving twice would silently drop the read.
            let path = Path::parse(field).resolve(&ctx)?;
            apply_one(op, &path, field, val, &mut new_doc, upsert_inserting)?;
        }
    }

    Ok(new_doc)
}

/// Dispatches one `{field: value}` mutation for one operator. `path` has
/// already been resolved (any `$` bound to a concrete index) by the
/// caller, so every helper below is free to read then write it through
/// plain `MatchPosition::none()` calls without racing the single-shot
/// positional cell.
fn apply_one(
    op: &str,
    path: &Path,
    field: &str,
    val: &Bson,
    doc: &mut Document,
    upsert_inserting: bool,
) -> Result<(), EngineError> {
    match op {
        "$set" => {
            path.set(doc, &MatchPosition::none(), val.clone())?;
            Ok(())
        }
        "$setOnInsert" => {
            if upsert_inserting {
                path.set(doc, &MatchPosition::none(), val.clone())?;
            }
            Ok(())
        }
        "$unset" => {
            path.remove(doc, &MatchPosition::none())?;
            Ok(())
        }
        "$inc" => arith_op(path, val, doc, add_values),
        "$mul" => arith_op(path, val, doc, mul_values),
        "$min" => extreme_op(path, val, doc, std::cmp::Ordering::Less),
        "$max" => extreme_op(path, val, doc, std::cmp::Ordering::Greater),
        "$push" => push_op(path, field, val, doc),
        "$pushAll" => {
            let items = expect_array(op, val)?;
            push_all(path, field, items, doc)
        }
        "$addToSet" => add_to_set_op(path, field, val, doc),
        "$pull" => pull_op(path, field, val, doc),
        "$pullAll" => {
            let items = expect_array(op, val)?;
            pull_all(path, field, &items, doc)
        }
        "$pop" => pop_op(path, field, val, doc),
        "$currentDate" => current_date_op(path, val, doc),
        other => Err(EngineError::InvalidModifier(other.to_string())),
    }
}

fn expect_array(op: &str, val: &Bson) -> Result<Vec<Bson>, EngineError> {
    val.as_array()
        .cloned()
        .ok_or_else(|| EngineError::NonArrayTarget(format!("{op} requires an array operand")))
}

fn as_numeric_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn arith_op(
    path: &Path,
    val: &Bson,
    doc: &mut Document,
    f: fn(&Bson, &Bson) -> Result<Bson, lumedb_query::ArithmeticError>,
) -> Result<(), EngineError> {
    let current = path.get(doc, &MatchPosition::none()).cloned().unwrap_or(Bson::Int32(0));
    let result = f(&current, val)?;
    path.set(doc, &MatchPosition::none(), result)?;
    Ok(())
}

fn extreme_op(path: &Path, val: &Bson, doc: &mut Document, want: std::cmp::Ordering) -> Result<(), EngineError> {
    let should_assign = match path.get(doc, &MatchPosition::none()) {
        None => true,
        Some(current) => cmp_values(val, current) == want,
    };
    if should_assign {
        path.set(doc, &MatchPosition::none(), val.clone())?;
    }
    Ok(())
}

fn push_op(path: &Path, field: &str, val: &Bson, doc: &mut Document) -> Result<(), EngineError> {
    let items = match val.as_document().and_then(|d| d.get("$each")) {
        Some(each) => each.as_array().cloned().ok_or_else(|| {
            EngineError::NonArrayTarget(format!("{field}: $each requires an array"))
        })?,
        None => vec![val.clone()],
    };
    push_all(path, field, items, doc)
}

fn push_all(path: &Path, field: &str, items: Vec<Bson>, doc: &mut Document) -> Result<(), EngineError> {
    let mut arr = match path.get(doc, &MatchPosition::none()) {
        None => Vec::new(),
        Some(Bson::Array(a)) => a.clone(),
        Some(_) => {
            return Err(EngineError::NonArrayTarget(format!(
                "cannot push onto non-array field {field}"
            )))
        }
    };
    arr.extend(items);
    path.set(doc, &MatchPosition::none(), Bson::Array(arr))?;
    Ok(())
}

fn add_to_set_op(path: &Path, field: &str, val: &Bson, doc: &mut Document) -> Result<(), EngineError> {
    let items = match val.as_document().and_then(|d| d.get("$each")) {
        Some(each) => each.as_array().cloned().ok_or_else(|| {
            EngineError::NonArrayTarget(format!("{field}: $each requires an array"))
        })?,
        None => vec![val.clone()],
    };
    let mut arr = match path.get(doc, &MatchPosition::none()) {
        None => Vec::new(),
        Some(Bson::Array(a)) => a.clone(),
        Some(_) => {
            return Err(EngineError::NonArrayTarget(format!(
                "cannot addToSet onto non-array field {field}"
            )))
        }
    };
    for item in items {
        if !arr.iter().any(|existing| values_equal(existing, &item)) {
            arr.push(item);
        }
    }
    path.set(doc, &MatchPosition::none(), Bson::Array(arr))?;
    Ok(())
}

fn pull_op(path: &Path, field: &str, val: &Bson, doc: &mut Document) -> Result<(), EngineError> {
    let arr = match path.get(doc, &MatchPosition::none()) {
        None => return Ok(()),
        Some(Bson::Array(a)) => a.clone(),
        Some(_) => {
            return Err(EngineError::NonArrayTarget(format!(
                "cannot pull from non-array field {field}"
            )))
        }
    };
    let filtered: Vec<Bson> = arr.into_iter().filter(|e| !values_equal(e, val)).collect();
    path.set(doc, &MatchPosition::none(), Bson::Array(filtered))?;
    Ok(())
}

fn pull_all(path: &Path, field: &str, targets: &[Bson], doc: &mut Document) -> Result<(), EngineError> {
    let arr = match path.get(doc, &MatchPosition::none()) {
        None => return Ok(()),
        Some(Bson::Array(a)) => a.clone(),
        Some(_) => {
            return Err(EngineError::NonArrayTarget(format!(
                "cannot pullAll from non-array field {field}"
            )))
        }
    };
    let filtered: Vec<Bson> = arr
        .into_iter()
        .filter(|e| !targets.iter().any(|t| values_equal(t, e)))
        .collect();
    path.set(doc, &MatchPosition::none(), Bson::Array(filtered))?;
    Ok(())
}

fn pop_op(path: &Path, field: &str, val: &Bson, doc: &mut Document) -> Result<(), EngineError> {
    let mut arr = match path.get(doc, &MatchPosition::none()) {
        None => return Ok(()),
        Some(Bson::Array(a)) => a.clone(),
        Some(_) => {
            return Err(EngineError::ArrayOnlyModifier(format!(
                "$pop can only be applied to an array, not field {field}"
            )))
        }
    };
    if arr.is_empty() {
        return Ok(());
    }
    let from_front = as_numeric_f64(val).map(|n| n == -1.0).unwrap_or(false);
    if from_front {
        arr.remove(0);
    } else {
        arr.pop();
    }
    path.set(doc, &MatchPosition::none(), Bson::Array(arr))?;
    Ok(())
}

fn current_date_op(path: &Path, val: &Bson, doc: &mut Document) -> Result<(), EngineError> {
    let new_value = match val {
        Bson::Boolean(true) => Bson::DateTime(bson::DateTime::now()),
        Bson::Document(spec) => match spec.get_str("$type") {
            Ok("date") => Bson::DateTime(bson::DateTime::now()),
            Ok("timestamp") => {
                let secs = bson::DateTime::now().timestamp_millis() / 1000;
                Bson::Timestamp(bson::Timestamp {
                    time: secs as u32,
                    increment: 1,
                })
            }
            other => {
                return Err(EngineError::InvalidCurrentDateType(
                    other.map(str::to_string).unwrap_or_else(|_| "unknown".to_string()),
                ))
            }
        },
        other => {
            return Err(EngineError::InvalidCurrentDateType(format!("{other:?}")));
        }
    };
    path.set(doc, &MatchPosition::none(), new_value)?;
    Ok(())
}

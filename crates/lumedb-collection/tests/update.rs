mod common;
use common::*;

use bson::doc;

// ── Update tests ────────────────────────────────────────────────

#[test]
fn s1_set_autovivifies_dotted_path() {
    let c = empty_collection();
    c.insert_documents(vec![doc! { "_id": 1, "a": { "b": 2 } }]).1.unwrap();
    c.update_documents(&doc! { "_id": 1 }, &doc! { "$set": { "a.c.d": 7 } }, false, false)
        .unwrap();
    let found = c.handle_query(&doc! { "_id": 1 }, 0, 0, None).unwrap();
    assert_eq!(found[0], doc! { "_id": 1, "a": { "b": 2, "c": { "d": 7 } } });
}

#[test]
fn s2_inc_missing_then_double_promotion() {
    let c = empty_collection();
    c.insert_documents(vec![doc! { "_id": 1 }]).1.unwrap();
    c.update_documents(&doc! { "_id": 1 }, &doc! { "$inc": { "n": 5 } }, false, false).unwrap();
    let found = c.handle_query(&doc! { "_id": 1 }, 0, 0, None).unwrap();
    assert_eq!(found[0], doc! { "_id": 1, "n": 5 });

    c.update_documents(&doc! { "_id": 1 }, &doc! { "$inc": { "n": 2.5 } }, false, false).unwrap();
    let found = c.handle_query(&doc! { "_id": 1 }, 0, 0, None).unwrap();
    assert_eq!(found[0], doc! { "_id": 1, "n": 7.5 });
}

#[test]
fn s3_positional_update_binds_to_matched_array_element() {
    let c = empty_collection();
    c.insert_documents(vec![doc! { "_id": 1, "arr": [{ "x": 1 }, { "x": 2 }, { "x": 3 }] }]).1.unwrap();
    c.update_documents(&doc! { "arr.x": 2 }, &doc! { "$set": { "arr.$.x": 20 } }, false, false)
        .unwrap();
    let found = c.handle_query(&doc! { "_id": 1 }, 0, 0, None).unwrap();
    assert_eq!(found[0], doc! { "_id": 1, "arr": [{ "x": 1 }, { "x": 20 }, { "x": 3 }] });
}

#[test]
fn s4_pull_removes_all_occurrences() {
    let c = empty_collection();
    c.insert_documents(vec![doc! { "_id": 1, "t": [1, 2, 1, 3, 1] }]).1.unwrap();
    c.update_documents(&doc! { "_id": 1 }, &doc! { "$pull": { "t": 1 } }, false, false).unwrap();
    let found = c.handle_query(&doc! { "_id": 1 }, 0, 0, None).unwrap();
    assert_eq!(found[0], doc! { "_id": 1, "t": [2, 3] });
}

#[test]
fn s5_add_to_set_is_a_no_op_when_already_present() {
    let c = empty_collection();
    c.insert_documents(vec![doc! { "_id": 1, "s": [1, 2, 3] }]).1.unwrap();
    c.update_documents(&doc! { "_id": 1 }, &doc! { "$addToSet": { "s": 2 } }, false, false).unwrap();
    let found = c.handle_query(&doc! { "_id": 1 }, 0, 0, None).unwrap();
    assert_eq!(found[0], doc! { "_id": 1, "s": [1, 2, 3] });
}

#[test]
fn s6_upsert_derives_id_from_in_clause() {
    let c = empty_collection();
    let result = c
        .update_documents(&doc! { "_id": { "$in": [42, 43] } }, &doc! { "$set": { "v": 1 } }, false, true)
        .unwrap();
    assert_eq!(result.get_i64("n").unwrap(), 1);
    assert!(!result.get_bool("updatedExisting").unwrap());
    assert_eq!(result.get_i32("upserted").unwrap(), 42);

    let found = c.handle_query(&doc! { "_id": 42 }, 0, 0, None).unwrap();
    assert_eq!(found[0], doc! { "_id": 42, "v": 1 });
}

#[test]
fn s7_forbidden_id_mod_leaves_document_untouched() {
    let c = empty_collection();
    c.insert_documents(vec![doc! { "_id": 1, "v": 0 }]).1.unwrap();
    let err = c.update_documents(&doc! { "_id": 1 }, &doc! { "$set": { "_id": 2 } }, false, false).unwrap_err();
    assert!(err.to_string().contains("_id"));

    let found = c.handle_query(&doc! { "_id": 1 }, 0, 0, None).unwrap();
    assert_eq!(found[0], doc! { "_id": 1, "v": 0 });
}

#[test]
fn multi_update_applies_to_every_match() {
    let c = seeded_collection();
    let result = c
        .update_documents(&doc! { "status": "active" }, &doc! { "$set": { "reviewed": true } }, true, false)
        .unwrap();
    assert_eq!(result.get_i64("n").unwrap(), 3);

    let found = c.handle_query(&doc! { "reviewed": true }, 0, 0, None).unwrap();
    assert_eq!(found.len(), 3);
}

#[test]
fn multi_update_with_replacement_document_is_rejected() {
    let c = seeded_collection();
    let err = c.update_documents(&doc! {}, &doc! { "status": "closed" }, true, false).unwrap_err();
    assert!(err.to_string().to_lowercase().contains("operator"));
}

#[test]
fn replacement_preserves_identifier() {
    let c = empty_collection();
    c.insert_documents(vec![doc! { "_id": 1, "a": 1 }]).1.unwrap();
    c.update_documents(&doc! { "_id": 1 }, &doc! { "a": 99 }, false, false).unwrap();
    let found = c.handle_query(&doc! { "_id": 1 }, 0, 0, None).unwrap();
    assert_eq!(found[0], doc! { "a": 99, "_id": 1 });
}

#[test]
fn update_with_no_match_and_no_upsert_reports_zero() {
    let c = empty_collection();
    let result = c.update_documents(&doc! { "_id": 404 }, &doc! { "$set": { "v": 1 } }, false, false).unwrap();
    assert_eq!(result.get_i64("n").unwrap(), 0);
    assert!(!result.get_bool("updatedExisting").unwrap());
}

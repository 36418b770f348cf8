use serde_json::json;

use super::*;
use crate::store::Mdb;

#[test]
fn test_view_name() {
    let db = Mdb::new("users");

    let view = View::open(&db, "by_age", Some("_sum"), false).unwrap();
    assert!(view.to_name().starts_with("users-mrview-"), "{}", view.to_name());
    let hex = view.to_name().rsplit('-').next().unwrap().to_string();
    assert_eq!(hex.len(), 7);

    // byte-equal definitions share an index, others do not.
    let again = View::open(&db, "by_age", Some("_sum"), false).unwrap();
    assert_eq!(view.to_name(), again.to_name());
    let other = View::open(&db, "by_age", Some("_count"), false).unwrap();
    assert_ne!(view.to_name(), other.to_name());
    let other = View::open(&db, "by_age", None, false).unwrap();
    assert_ne!(view.to_name(), other.to_name());

    // temporary views live in their own name-space.
    let temp = View::open(&db, "by_age", Some("_sum"), true).unwrap();
    assert!(temp.to_name().starts_with("users-mrtemp-"), "{}", temp.to_name());
}

#[test]
fn test_view_seqno() {
    let db = Mdb::new("test_view_seqno");

    let view = View::open(&db, "vmap", None, false).unwrap();
    assert_eq!(view.to_seqno(), 0);

    let doc = view.to_seq_doc(7);
    assert_eq!(doc.id, SEQ_DOC_ID);
    assert_eq!(doc.body, json!({"seq": 7}));
    view.store.bulk_docs(vec![doc]).unwrap();

    let view = View::open(&db, "vmap", None, false).unwrap();
    assert_eq!(view.to_seqno(), 7);
}

#[test]
fn test_meta_keys() {
    let db = Mdb::new("test_meta_keys");
    let view = View::open(&db, "vmap", None, false).unwrap();

    assert_eq!(view.to_meta_keys("a").unwrap(), Vec::<String>::new());

    let doc = Doc::new(&meta_doc_id("a"), json!({"keys": ["k1", "k2"]}));
    view.store.bulk_docs(vec![doc]).unwrap();
    assert_eq!(view.to_meta_keys("a").unwrap(), vec!["k1".to_string(), "k2".to_string()]);

    // a malformed meta record degrades to no keys.
    let doc = Doc::new(&meta_doc_id("b"), json!({"keys": 42}));
    view.store.bulk_docs(vec![doc]).unwrap();
    assert_eq!(view.to_meta_keys("b").unwrap(), Vec::<String>::new());
}

#[test]
fn test_view_destroy() {
    let db = Mdb::new("test_view_destroy");

    let view = View::open(&db, "vmap", None, false).unwrap();
    view.store.bulk_docs(vec![view.to_seq_doc(3)]).unwrap();

    let view = View::open(&db, "vmap", None, false).unwrap();
    assert_eq!(view.to_seqno(), 3);
    view.destroy().unwrap();

    let view = View::open(&db, "vmap", None, false).unwrap();
    assert_eq!(view.to_seqno(), 0);
}

use serde_json::{json, Value};

use super::*;
use crate::store::{Doc, Mdb};

// emit(doc._id, doc.n) over the {a:1, b:2, c:3} fixture.
fn nums_db(name: &str) -> Mdb {
    register_map("mt_nums", |doc, emitter| {
        emitter.emit(json!(doc.id), doc.body["n"].clone());
        Ok(())
    });

    let db = Mdb::new(name);
    db.bulk_docs(vec![
        Doc::new("a", json!({"n": 1})),
        Doc::new("b", json!({"n": 2})),
        Doc::new("c", json!({"n": 3})),
        Doc::new(
            "_design/nums",
            json!({
                "views": {
                    "sum": {"map": "mt_nums", "reduce": "_sum"},
                    "raw": {"map": "mt_nums"},
                }
            }),
        ),
    ])
    .unwrap();
    db
}

fn raw_row(id: &str, value: Value) -> Row {
    Row { id: Some(id.to_string()), key: json!(id), value, doc: None }
}

fn reduced_row(key: Value, value: Value) -> Row {
    Row { id: None, key, value, doc: None }
}

#[test]
fn test_scenario_simple_sum() {
    let db = nums_db("mt_simple_sum");

    let page = query(&db, &ViewSpec::design("nums/sum"), QueryOptions::default()).unwrap();
    assert_eq!(page.total_rows, None);
    assert_eq!(page.offset, None);
    assert_eq!(page.rows, vec![reduced_row(json!(null), json!(6))]);
}

#[test]
fn test_scenario_range() {
    let db = nums_db("mt_range");

    let mut opts = QueryOptions::default();
    opts.set_startkey(json!("a")).set_endkey(json!("b"));
    let page = query(&db, &ViewSpec::design("nums/raw"), opts).unwrap();
    assert_eq!(page.total_rows, Some(3));
    assert_eq!(page.offset, Some(0));
    assert_eq!(page.rows, vec![raw_row("a", json!(1)), raw_row("b", json!(2))]);
}

#[test]
fn test_scenario_descending_limit() {
    let db = nums_db("mt_descending");

    let mut opts = QueryOptions::default();
    opts.set_descending(true).set_limit(2);
    let page = query(&db, &ViewSpec::design("nums/raw"), opts).unwrap();
    assert_eq!(page.rows, vec![raw_row("c", json!(3)), raw_row("b", json!(2))]);
}

#[test]
fn test_scenario_keys_duplicate() {
    let db = nums_db("mt_keys");

    let mut opts = QueryOptions::default();
    opts.set_keys(vec![json!("a"), json!("a"), json!("z")]);
    let page = query(&db, &ViewSpec::design("nums/raw"), opts).unwrap();

    // two copies of the `a` row, the unknown key contributes nothing,
    // and total_rows counts the index, not the result.
    assert_eq!(page.total_rows, Some(3));
    assert_eq!(page.rows, vec![raw_row("a", json!(1)), raw_row("a", json!(1))]);
}

#[test]
fn test_scenario_delete_then_update() {
    let db = nums_db("mt_delete");

    let page = query(&db, &ViewSpec::design("nums/sum"), QueryOptions::default()).unwrap();
    assert_eq!(page.rows, vec![reduced_row(json!(null), json!(6))]);

    db.bulk_docs(vec![Doc::new_deleted("b")]).unwrap();
    let page = query(&db, &ViewSpec::design("nums/sum"), QueryOptions::default()).unwrap();
    assert_eq!(page.rows, vec![reduced_row(json!(null), json!(4))]);

    // the deleted doc holds no live keys in the index.
    let view = View::open(&db, "mt_nums", Some("_sum"), false).unwrap();
    assert_eq!(view.to_meta_keys("b").unwrap(), Vec::<String>::new());
}

#[test]
fn test_scenario_grouped_stats() {
    register_map("mt_stats", |doc, emitter| {
        emitter.emit(doc.body["t"].clone(), doc.body["v"].clone());
        Ok(())
    });
    let db = Mdb::new("mt_grouped_stats");
    db.bulk_docs(vec![
        Doc::new("x", json!({"t": "a", "v": 1})),
        Doc::new("y", json!({"t": "a", "v": 3})),
        Doc::new("z", json!({"t": "b", "v": 5})),
    ])
    .unwrap();

    let spec = ViewSpec::temp("mt_stats", Some("_stats"));
    let mut opts = QueryOptions::default();
    opts.set_group(true);
    let page = query(&db, &spec, opts).unwrap();

    let want = vec![
        reduced_row(
            json!("a"),
            json!({"sum": 4, "min": 1, "max": 3, "count": 2, "sumsqr": 10}),
        ),
        reduced_row(
            json!("b"),
            json!({"sum": 5, "min": 5, "max": 5, "count": 1, "sumsqr": 25}),
        ),
    ];
    assert_eq!(page.rows, want);
}

#[test]
fn test_design_not_found() {
    let db = nums_db("mt_not_found");

    let err = query(&db, &ViewSpec::design("nope/x"), QueryOptions::default()).unwrap_err();
    assert_eq!(err.to_name(), "not_found");
    assert_eq!(err.to_status(), 404);

    let err = query(&db, &ViewSpec::design("nums/nope"), QueryOptions::default()).unwrap_err();
    assert_eq!(err.to_name(), "not_found");

    // a view naming an unregistered map function is equally missing.
    let spec = ViewSpec::temp("mt_no_such_map", None);
    let err = query(&db, &spec, QueryOptions::default()).unwrap_err();
    assert_eq!(err.to_name(), "not_found");
}

#[test]
fn test_temp_view_lifecycle() {
    let db = nums_db("mt_temp");
    let spec = ViewSpec::temp("mt_nums", Some("_sum"));

    let page = query(&db, &spec, QueryOptions::default()).unwrap();
    assert_eq!(page.rows, vec![reduced_row(json!(null), json!(6))]);

    // temporary indexes are rebuilt fresh, every query observes the
    // current source state.
    db.bulk_docs(vec![Doc::new("d", json!({"n": 10}))]).unwrap();
    let page = query(&db, &spec, QueryOptions::default()).unwrap();
    assert_eq!(page.rows, vec![reduced_row(json!(null), json!(16))]);

    // and the backing store is dropped after each run.
    let view = View::open(&db, "mt_nums", Some("_sum"), true).unwrap();
    assert_eq!(view.to_seqno(), 0);
}

#[test]
fn test_stale() {
    let db = nums_db("mt_stale");
    let spec = ViewSpec::design("nums/raw");

    // nothing indexed yet, a stale query sees an empty view.
    let mut opts = QueryOptions::default();
    opts.set_stale(Stale::Ok);
    let page = query(&db, &spec, opts.clone()).unwrap();
    assert_eq!(page.total_rows, Some(0));
    assert_eq!(page.rows, vec![]);

    // default staleness drains the feed first.
    let page = query(&db, &spec, QueryOptions::default()).unwrap();
    assert_eq!(page.rows.len(), 3);

    db.bulk_docs(vec![Doc::new("d", json!({"n": 10}))]).unwrap();
    let page = query(&db, &spec, opts.clone()).unwrap();
    assert_eq!(page.rows.len(), 3);

    // update_after serves the stale page, then catches the index up.
    let mut ua = QueryOptions::default();
    ua.set_stale(Stale::UpdateAfter);
    let page = query(&db, &spec, ua).unwrap();
    assert_eq!(page.rows.len(), 3);
    queue::task_queue().request("barrier", || Ok(())).unwrap();
    let page = query(&db, &spec, opts).unwrap();
    assert_eq!(page.rows.len(), 4);
}

#[test]
fn test_remove_index() {
    let db = nums_db("mt_remove");
    let spec = ViewSpec::design("nums/raw");

    let page = query(&db, &spec, QueryOptions::default()).unwrap();
    assert_eq!(page.rows.len(), 3);

    remove_index(&db, &spec).unwrap();

    let mut opts = QueryOptions::default();
    opts.set_stale(Stale::Ok);
    let page = query(&db, &spec, opts).unwrap();
    assert_eq!(page.rows, vec![]);

    // a default query simply rebuilds from sequence number ZERO.
    let page = query(&db, &spec, QueryOptions::default()).unwrap();
    assert_eq!(page.rows.len(), 3);
}

// queries racing a writer must observe some consistent prefix of the
// source history, never a half-applied batch.
#[test]
fn test_serialized_snapshots() {
    register_map("mt_serial", |doc, emitter| {
        emitter.emit(json!(doc.id), doc.body["n"].clone());
        Ok(())
    });
    let db = Mdb::new("mt_serialized_snapshots");
    let spec = ViewSpec::temp("mt_serial", Some("_sum"));

    let writer = {
        let db = db.clone();
        std::thread::spawn(move || {
            for n in 1..=50i64 {
                db.bulk_docs(vec![Doc::new(&format!("d{:02}", n), json!({ "n": n }))])
                    .unwrap();
            }
        })
    };

    for _i in 0..20 {
        let page = query(&db, &spec, QueryOptions::default()).unwrap();
        match page.rows.as_slice() {
            [] => (),
            [row] => {
                // sum over some prefix 1..=k is triangular.
                let sum = row.value.as_i64().unwrap();
                let k = (((8 * sum + 1) as f64).sqrt() as i64 - 1) / 2;
                assert_eq!(k * (k + 1) / 2, sum, "sum:{}", sum);
            }
            rows => panic!("unexpected rows {:?}", rows),
        }
    }
    writer.join().unwrap();

    let page = query(&db, &spec, QueryOptions::default()).unwrap();
    assert_eq!(page.rows[0].value, json!(50 * 51 / 2));
}

#[test]
fn test_reduce_false() {
    let db = nums_db("mt_reduce_false");

    let mut opts = QueryOptions::default();
    opts.set_reduce(false);
    let page = query(&db, &ViewSpec::design("nums/sum"), opts).unwrap();
    assert_eq!(page.total_rows, Some(3));
    assert_eq!(page.rows.len(), 3);
    assert_eq!(page.rows[0], raw_row("a", json!(1)));
}

#[test]
fn test_include_docs_join() {
    let db = nums_db("mt_include_docs");

    let mut opts = QueryOptions::default();
    opts.set_include_docs(true).set_key(json!("a"));
    let page = query(&db, &ViewSpec::design("nums/raw"), opts).unwrap();
    assert_eq!(page.rows[0].doc, Some(db.get("a").unwrap()));

    // include_docs cannot combine with an effective reduce.
    let mut opts = QueryOptions::default();
    opts.set_include_docs(true);
    let err = query(&db, &ViewSpec::design("nums/sum"), opts).unwrap_err();
    assert_eq!(err.to_name(), "query_parse_error");
}

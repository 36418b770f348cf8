use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};
use serde_json::json;

use super::*;

fn row(id: &str, key: Value, value: Value, reduce_out: Option<Value>) -> ScanRow {
    ScanRow { id: id.to_string(), key, value, reduce_out }
}

#[test]
fn test_sum() {
    let reducer = Reducer::Sum;

    let values = vec![json!(1), json!(2.5), json!(3)];
    assert_eq!(reducer.reduce(&[], &values, false).unwrap(), json!(6.5));
    assert_eq!(reducer.reduce(&[], &values, true).unwrap(), json!(6.5));
    assert_eq!(reducer.reduce(&[], &[], false).unwrap(), json!(0));

    // arrays sum component-wise, shorter arrays pad with zero.
    let values = vec![json!([1, 2]), json!([3, 4, 5])];
    assert_eq!(reducer.reduce(&[], &values, false).unwrap(), json!([4, 6, 5]));

    let values = vec![json!(1), json!("x")];
    let err = reducer.reduce(&[], &values, false).unwrap_err();
    assert_eq!(err.to_name(), "invalid_value");
    assert_eq!(err.to_status(), 500);

    let values = vec![json!(1), json!([1])];
    assert!(reducer.reduce(&[], &values, false).is_err());
}

#[test]
fn test_count() {
    let reducer = Reducer::Count;

    let values = vec![json!("a"), json!({"x": 1}), json!(null)];
    assert_eq!(reducer.reduce(&[], &values, false).unwrap(), json!(3));

    // re-reduce sums the partial counts.
    let partials = vec![json!(3), json!(4)];
    assert_eq!(reducer.reduce(&[], &partials, true).unwrap(), json!(7));
}

#[test]
fn test_stats() {
    let reducer = Reducer::Stats;

    let values = vec![json!(1), json!(3)];
    let want = json!({"sum": 4, "min": 1, "max": 3, "count": 2, "sumsqr": 10});
    assert_eq!(reducer.reduce(&[], &values, false).unwrap(), want);

    let partials = vec![
        json!({"sum": 4, "min": 1, "max": 3, "count": 2, "sumsqr": 10}),
        json!({"sum": 5, "min": 5, "max": 5, "count": 1, "sumsqr": 25}),
    ];
    let want = json!({"sum": 9, "min": 1, "max": 5, "count": 3, "sumsqr": 35});
    assert_eq!(reducer.reduce(&[], &partials, true).unwrap(), want);

    let err = reducer.reduce(&[], &[json!("x")], false).unwrap_err();
    assert_eq!(err.to_name(), "invalid_value");
    let err = reducer.reduce(&[], &[json!({"sum": 1})], true).unwrap_err();
    assert_eq!(err.to_name(), "invalid_value");
}

// for any partition V = V1 + V2, rereduce([reduce(V1), reduce(V2)]) must
// equal reduce(V). Integer-valued inputs keep f64 arithmetic exact.
#[test]
fn test_reduce_rereduce_commute() {
    let seed: u64 = random();
    println!("test_reduce_rereduce_commute seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    for reducer in [Reducer::Sum, Reducer::Count, Reducer::Stats].iter() {
        for _i in 0..100 {
            let n = rng.gen_range(2..50);
            let values: Vec<Value> =
                (0..n).map(|_| json!(rng.gen::<i16>() as i64)).collect();
            let at = rng.gen_range(1..n);
            let (v1, v2) = values.split_at(at);

            let whole = reducer.reduce(&[], &values, false).unwrap();
            let partials =
                vec![reducer.reduce(&[], v1, false).unwrap(), reducer.reduce(&[], v2, false).unwrap()];
            let merged = reducer.reduce(&[], &partials, true).unwrap();
            assert_eq!(merged, whole, "n:{} at:{}", n, at);
        }
    }
}

#[test]
fn test_grouping() {
    let rows = vec![
        row("x", json!("a"), json!(1), None),
        row("y", json!("a"), json!(3), None),
        row("z", json!("b"), json!(5), None),
    ];

    let groups = reduce_rows(&Reducer::Sum, &rows, Grouping::None).unwrap();
    assert_eq!(groups, vec![(json!(null), json!(9))]);

    let groups = reduce_rows(&Reducer::Sum, &rows, Grouping::Exact).unwrap();
    assert_eq!(groups, vec![(json!("a"), json!(4)), (json!("b"), json!(5))]);

    assert_eq!(reduce_rows(&Reducer::Sum, &[], Grouping::Exact).unwrap(), vec![]);
}

#[test]
fn test_grouping_levels() {
    let rows = vec![
        row("w", json!(["a", 1]), json!(1), None),
        row("x", json!(["a", 2]), json!(2), None),
        row("y", json!(["b", 1]), json!(4), None),
        row("z", json!("c"), json!(8), None),
    ];

    let groups = reduce_rows(&Reducer::Sum, &rows, Grouping::Level(1)).unwrap();
    let want = vec![
        (json!(["a"]), json!(3)),
        (json!(["b"]), json!(4)),
        (json!("c"), json!(8)),
    ];
    assert_eq!(groups, want);

    let groups = reduce_rows(&Reducer::Sum, &rows, Grouping::Level(2)).unwrap();
    assert_eq!(groups.len(), 4);

    // level ZERO behaves like no grouping at all.
    let groups = reduce_rows(&Reducer::Sum, &rows, Grouping::from_opts(true, Some(0))).unwrap();
    assert_eq!(groups, vec![(json!(null), json!(15))]);
}

#[test]
fn test_stored_reduce_out() {
    // a single-member group short-circuits to its stored output.
    let rows = vec![row("x", json!("a"), json!(1), Some(json!(999)))];
    let groups = reduce_rows(&Reducer::Sum, &rows, Grouping::Exact).unwrap();
    assert_eq!(groups, vec![(json!("a"), json!(999))]);

    // all members stored, re-reduce over the stored outputs.
    let rows = vec![
        row("x", json!("a"), json!(1), Some(json!(10))),
        row("y", json!("a"), json!(2), Some(json!(20))),
    ];
    let groups = reduce_rows(&Reducer::Sum, &rows, Grouping::Exact).unwrap();
    assert_eq!(groups, vec![(json!("a"), json!(30))]);

    // mixed, fall back to a first-level reduce over raw values.
    let rows = vec![
        row("x", json!("a"), json!(1), Some(json!(10))),
        row("y", json!("a"), json!(2), None),
    ];
    let groups = reduce_rows(&Reducer::Sum, &rows, Grouping::Exact).unwrap();
    assert_eq!(groups, vec![(json!("a"), json!(3))]);
}

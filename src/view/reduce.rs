//! Module `reduce` implement grouping and reduction over scan rows.
//!
//! Rows arrive from the executor in index order, that is, sorted by
//! collation over their emitted keys. Grouping walks that sequence once,
//! a row extends the current group while its (possibly level-truncated)
//! key collates equal to the group's key, ungrouped reduction folds every
//! row into a single group keyed `null`. Per group, reduction prefers the
//! `reduce_out` values stored by the updater, re-reducing them, and only
//! falls back to a first-level reduce when stored outputs are missing.

use serde_json::{Map, Number, Value};

use std::cmp::Ordering;

use crate::{
    collate,
    view::evaluator::{self, ReduceFn},
    Error, Result,
};

// materialized row out of an index scan.
#[derive(Clone, Debug)]
pub(crate) struct ScanRow {
    pub(crate) id: String,
    pub(crate) key: Value,
    pub(crate) value: Value,
    pub(crate) reduce_out: Option<Value>,
}

// how query options collapse rows into groups.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Grouping {
    None,
    Exact,
    Level(usize),
}

impl Grouping {
    pub(crate) fn from_opts(group: bool, group_level: Option<usize>) -> Grouping {
        match (group, group_level) {
            (_, Some(0)) => Grouping::None,
            (_, Some(level)) => Grouping::Level(level),
            (true, None) => Grouping::Exact,
            (false, None) => Grouping::None,
        }
    }

    fn to_group_key(&self, key: &Value) -> Value {
        match self {
            Grouping::None => Value::Null,
            Grouping::Exact => key.clone(),
            Grouping::Level(level) => match key {
                Value::Array(items) => {
                    Value::Array(items.iter().take(*level).cloned().collect())
                }
                _ => key.clone(),
            },
        }
    }
}

/// Reducer configured on a view, one of the built-ins or a registered
/// native function.
pub(crate) enum Reducer {
    Sum,
    Count,
    Stats,
    User(ReduceFn),
}

impl Reducer {
    pub(crate) fn from_src(src: &str) -> Result<Reducer> {
        match src {
            "_sum" => Ok(Reducer::Sum),
            "_count" => Ok(Reducer::Count),
            "_stats" => Ok(Reducer::Stats),
            src => Ok(Reducer::User(evaluator::reduce_fn(src)?)),
        }
    }

    pub(crate) fn reduce(
        &self,
        keys: &[Value],
        values: &[Value],
        rereduce: bool,
    ) -> Result<Value> {
        match self {
            // summing partial sums is summing, same code both levels.
            Reducer::Sum => builtin_sum(values),
            Reducer::Count => match rereduce {
                false => Ok(Value::from(values.len() as u64)),
                true => builtin_sum(values),
            },
            Reducer::Stats => builtin_stats(values, rereduce),
            Reducer::User(reducef) => reducef(keys, values, rereduce),
        }
    }
}

/// Group `rows` and reduce each group, returning `(key, value)` pairs in
/// scan order.
pub(crate) fn reduce_rows(
    reducer: &Reducer,
    rows: &[ScanRow],
    grouping: Grouping,
) -> Result<Vec<(Value, Value)>> {
    let mut out: Vec<(Value, Value)> = vec![];
    let mut group: Vec<&ScanRow> = vec![];
    let mut group_key = Value::Null;

    for row in rows.iter() {
        let key = grouping.to_group_key(&row.key);
        if group.is_empty() || collate::collate(&group_key, &key) == Ordering::Equal {
            group_key = key;
            group.push(row);
            continue;
        }
        out.push((group_key, reduce_group(reducer, &group)?));
        group_key = key;
        group = vec![row];
    }
    if !group.is_empty() {
        out.push((group_key, reduce_group(reducer, &group)?));
    }

    Ok(out)
}

fn reduce_group(reducer: &Reducer, group: &[&ScanRow]) -> Result<Value> {
    if let [row] = group {
        if let Some(out) = &row.reduce_out {
            return Ok(out.clone());
        }
    }

    let outs: Vec<Value> =
        group.iter().filter_map(|row| row.reduce_out.clone()).collect();
    if outs.len() == group.len() {
        return reducer.reduce(&[], &outs, true);
    }

    let keys: Vec<Value> = group
        .iter()
        .map(|row| Value::Array(vec![row.key.clone(), Value::String(row.id.clone())]))
        .collect();
    let values: Vec<Value> = group.iter().map(|row| row.value.clone()).collect();
    reducer.reduce(&keys, &values, false)
}

// `_sum` and the re-reduce side of `_count`. Numbers sum numerically,
// arrays of numbers sum component-wise, padded with zero, anything else
// is an InvalidValue error.
fn builtin_sum(values: &[Value]) -> Result<Value> {
    enum Acc {
        Unset,
        Scalar(f64),
        Vector(Vec<f64>),
    }

    let mut acc = Acc::Unset;
    for value in values.iter() {
        acc = match (acc, value) {
            (Acc::Unset, Value::Number(_)) => Acc::Scalar(to_number(value)?),
            (Acc::Scalar(sum), Value::Number(_)) => Acc::Scalar(sum + to_number(value)?),
            (Acc::Unset, Value::Array(items)) => Acc::Vector(to_numbers(items)?),
            (Acc::Vector(mut sums), Value::Array(items)) => {
                let items = to_numbers(items)?;
                if items.len() > sums.len() {
                    sums.resize(items.len(), 0.0);
                }
                for (i, item) in items.into_iter().enumerate() {
                    sums[i] += item;
                }
                Acc::Vector(sums)
            }
            (_, _) => err_at!(InvalidValue, msg: "_sum cannot add {:?}", value)?,
        };
    }

    match acc {
        Acc::Unset => Ok(Value::from(0)),
        Acc::Scalar(sum) => Ok(number_value(sum)),
        Acc::Vector(sums) => {
            Ok(Value::Array(sums.into_iter().map(number_value).collect()))
        }
    }
}

fn builtin_stats(values: &[Value], rereduce: bool) -> Result<Value> {
    let mut acc: Option<Stats> = None;
    for value in values.iter() {
        let stats = match rereduce {
            false => Stats::from_number(to_number(value)?),
            true => Stats::from_value(value)?,
        };
        acc = Some(match acc {
            Some(acc) => acc.merge(&stats),
            None => stats,
        });
    }

    match acc {
        Some(acc) => Ok(acc.to_value()),
        None => Ok(Value::Null),
    }
}

// aggregate carried by `_stats`, combines point-wise on re-reduce.
struct Stats {
    sum: f64,
    min: f64,
    max: f64,
    count: f64,
    sumsqr: f64,
}

impl Stats {
    fn from_number(n: f64) -> Stats {
        Stats { sum: n, min: n, max: n, count: 1.0, sumsqr: n * n }
    }

    fn from_value(value: &Value) -> Result<Stats> {
        let field = |name: &str| -> Result<f64> {
            match value.get(name) {
                Some(field) => to_number(field),
                None => err_at!(InvalidValue, msg: "_stats re-reduce missing {}", name),
            }
        };
        let val = Stats {
            sum: field("sum")?,
            min: field("min")?,
            max: field("max")?,
            count: field("count")?,
            sumsqr: field("sumsqr")?,
        };
        Ok(val)
    }

    fn merge(self, other: &Stats) -> Stats {
        Stats {
            sum: self.sum + other.sum,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            count: self.count + other.count,
            sumsqr: self.sumsqr + other.sumsqr,
        }
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("sum".to_string(), number_value(self.sum));
        map.insert("min".to_string(), number_value(self.min));
        map.insert("max".to_string(), number_value(self.max));
        map.insert("count".to_string(), number_value(self.count));
        map.insert("sumsqr".to_string(), number_value(self.sumsqr));
        Value::Object(map)
    }
}

const MAX_SAFE_INTEGER: f64 = 9007199254740991.0; // 2^53 - 1

// render integral results as JSON integers, keeps aggregate output in
// the same shape users emitted.
fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        Value::from(f as i64)
    } else {
        match Number::from_f64(f) {
            Some(num) => Value::Number(num),
            None => Value::Null,
        }
    }
}

fn to_number(value: &Value) -> Result<f64> {
    match value {
        Value::Number(num) => Ok(num.as_f64().unwrap_or(0.0)),
        value => err_at!(InvalidValue, msg: "not a number {:?}", value),
    }
}

fn to_numbers(items: &[Value]) -> Result<Vec<f64>> {
    items.iter().map(to_number).collect()
}

#[cfg(test)]
#[path = "reduce_test.rs"]
mod reduce_test;

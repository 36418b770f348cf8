//! Module `evaluator` implement the map/reduce evaluation capability.
//!
//! The engine treats map and reduce sources as opaque strings. Here they
//! are names of native functions registered up front via [register_map]
//! and [register_reduce], the registered name is the canonical source
//! representation, two views naming the same functions share an index.
//! The built-in reducers `_sum`, `_count` and `_stats` need no
//! registration.

use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde_json::Value;

use std::{collections::HashMap, sync::Arc};

use crate::{collate, store::Doc, Error, Result};

/// Map function. Called once per live source document, emitting zero or
/// more rows through the [Emitter].
pub type MapFn = Arc<dyn Fn(&Doc, &mut Emitter) -> Result<()> + Send + Sync>;

/// Reduce function, `(keys, values, rereduce)`. On first-level reduction
/// `keys` holds one `[key, doc-id]` pair per value. On re-reduction `keys`
/// is empty and `values` holds previously reduced outputs.
pub type ReduceFn = Arc<dyn Fn(&[Value], &[Value], bool) -> Result<Value> + Send + Sync>;

lazy_static! {
    static ref MAPS: RwLock<HashMap<String, MapFn>> = RwLock::new(HashMap::new());
    static ref REDUCES: RwLock<HashMap<String, ReduceFn>> = RwLock::new(HashMap::new());
}

/// Collects the rows emitted by one map invocation. Keys are normalized
/// on the way in, refer [collate::normalize_key].
pub struct Emitter {
    rows: Vec<(Value, Value)>,
}

impl Emitter {
    pub fn emit(&mut self, key: Value, value: Value) {
        self.rows.push((collate::normalize_key(&key), value));
    }

    pub(crate) fn new() -> Emitter {
        Emitter { rows: Vec::default() }
    }

    pub(crate) fn into_rows(self) -> Vec<(Value, Value)> {
        self.rows
    }
}

/// Register a native map function under `name`. Re-registering a name
/// replaces the function, the index hash only covers the name, so replace
/// with care.
pub fn register_map<F>(name: &str, mapf: F)
where
    F: Fn(&Doc, &mut Emitter) -> Result<()> + Send + Sync + 'static,
{
    MAPS.write().insert(name.to_string(), Arc::new(mapf));
}

/// Register a native reduce function under `name`. Names beginning with
/// `_` are reserved for the built-in reducers.
pub fn register_reduce<F>(name: &str, reducef: F)
where
    F: Fn(&[Value], &[Value], bool) -> Result<Value> + Send + Sync + 'static,
{
    REDUCES.write().insert(name.to_string(), Arc::new(reducef));
}

pub(crate) fn map_fn(src: &str) -> Result<MapFn> {
    match MAPS.read().get(src) {
        Some(mapf) => Ok(Arc::clone(mapf)),
        None => err_at!(KeyNotFound, msg: "unknown map function {}", src),
    }
}

pub(crate) fn reduce_fn(src: &str) -> Result<ReduceFn> {
    match REDUCES.read().get(src) {
        Some(reducef) => Ok(Arc::clone(reducef)),
        None => err_at!(KeyNotFound, msg: "unknown reduce function {}", src),
    }
}

//! Module `view` implement map/reduce views, secondary indexes derived
//! from a map function, an optional reduce function, and a source store.
//!
//! [query] and [remove_index] are the public entry points. Both serialize
//! through a process wide task queue, refer [queue], so that index updates
//! and queries never interleave their store writes. A query with default
//! staleness first drains the source's change feed into the index, refer
//! [update], then plans and executes scans over the index, refer
//! [self::query] module, grouping and reducing rows when a reducer is
//! configured, refer [reduce].
//!
//! Map and reduce functions are pre-registered native functions, keyed by
//! name, refer [evaluator]. The registered names are the canonical source
//! representation, they identify the view and feed the index-name hash.

use crate::{store::DocStore, Error, Result};

pub mod evaluator;
mod index;
mod query;
mod queue;
mod reduce;
mod update;

pub use evaluator::{register_map, register_reduce, Emitter};
pub use index::View;
pub use query::{Page, QueryOptions, Row, Stale};

use reduce::Reducer;

/// View specification accepted by [query] and [remove_index].
#[derive(Clone, Debug)]
pub enum ViewSpec {
    /// Inline definition. The index is built from scratch, queried once
    /// and dropped again.
    Temp { map: String, reduce: Option<String> },
    /// Reference to a view declared in a design document, as
    /// `"<design>/<view>"`. The index persists across queries.
    Design(String),
}

impl ViewSpec {
    pub fn temp(map: &str, reduce: Option<&str>) -> ViewSpec {
        ViewSpec::Temp {
            map: map.to_string(),
            reduce: reduce.map(|s| s.to_string()),
        }
    }

    pub fn design(name: &str) -> ViewSpec {
        ViewSpec::Design(name.to_string())
    }

    // resolve to (map-source, reduce-source, is-temporary). Design
    // references incur a design-document fetch on the source store.
    fn resolve<D>(&self, source: &D) -> Result<(String, Option<String>, bool)>
    where
        D: DocStore,
    {
        match self {
            ViewSpec::Temp { map, reduce } => Ok((map.clone(), reduce.clone(), true)),
            ViewSpec::Design(name) => {
                let (ddoc, vname) = match name.split_once('/') {
                    Some(parts) => parts,
                    None => err_at!(KeyNotFound, msg: "bad view reference {}", name)?,
                };
                let doc = source.get(&format!("_design/{}", ddoc))?;
                let spec = match doc.body.get("views").and_then(|vs| vs.get(vname)) {
                    Some(spec) => spec,
                    None => err_at!(KeyNotFound, msg: "missing view {}", name)?,
                };
                let map = match spec.get("map").and_then(|m| m.as_str()) {
                    Some(map) => map.to_string(),
                    None => err_at!(KeyNotFound, msg: "view {} has no map", name)?,
                };
                let reduce = spec
                    .get("reduce")
                    .and_then(|r| r.as_str())
                    .map(|r| r.to_string());
                Ok((map, reduce, false))
            }
        }
    }
}

/// Query a view, returning one page of rows.
///
/// Unless `opts.stale` says otherwise the view is first brought up to date
/// with the source store's change feed. Temporary views are always built
/// fully, queried, and dropped before returning.
pub fn query<D>(source: &D, spec: &ViewSpec, opts: QueryOptions) -> Result<Page>
where
    D: DocStore,
{
    let (map_src, reduce_src, temp) = spec.resolve(source)?;

    // fail fast on unknown functions and invalid options, before any
    // task is queued and before any store i/o on the view side.
    evaluator::map_fn(&map_src)?;
    let has_reducer = match &reduce_src {
        Some(src) => {
            Reducer::from_src(src)?;
            true
        }
        None => false,
    };
    let reducing = has_reducer && opts.reduce != Some(false);
    query::validate(&opts, reducing)?;

    let job = {
        let (source, opts) = (source.clone(), opts.clone());
        let (map_src, reduce_src) = (map_src.clone(), reduce_src.clone());
        move || -> Result<Page> {
            let mut view = View::open(&source, &map_src, reduce_src.as_deref(), temp)?;
            match (temp, opts.stale) {
                (true, _) | (false, Stale::No) => update::run(&mut view)?,
                (false, Stale::Ok) | (false, Stale::UpdateAfter) => (),
            }
            let page = query::execute(&view, &opts);
            if temp {
                view.destroy()?;
            }
            page
        }
    };
    let page = queue::task_queue().request("query", job)?;

    if !temp && opts.stale == Stale::UpdateAfter {
        let source = source.clone();
        queue::task_queue().post(Box::new(move || {
            let res = View::open(&source, &map_src, reduce_src.as_deref(), false)
                .and_then(|mut view| update::run(&mut view));
            if let Err(err) = res {
                log::debug!(target: "mrview", "stale update_after: {}", err);
            }
        }))?;
    }

    Ok(page)
}

/// Delete a view's index from the adapter. The next query rebuilds it
/// from sequence number ZERO.
pub fn remove_index<D>(source: &D, spec: &ViewSpec) -> Result<()>
where
    D: DocStore,
{
    let (map_src, reduce_src, temp) = spec.resolve(source)?;

    let job = {
        let source = source.clone();
        move || -> Result<()> {
            let view = View::open(&source, &map_src, reduce_src.as_deref(), temp)?;
            view.destroy()
        }
    };
    queue::task_queue().request("remove-index", job)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;

//! Module `query` implement the planner and executor for view queries.
//!
//! Planning turns logical key bounds into composite-key bounds on the
//! view store. A lower bound `k` becomes `[k]`, which collates before
//! every row keyed `k`, an upper bound becomes `[k, {}, {}, {}]`, which
//! collates after every row keyed `k` since row ids are strings and
//! objects are the top type class. `descending` swaps which side of the
//! scan receives which encoding. When no reducer participates, `limit`
//! and `skip` push down into the store scan, reduction needs the whole
//! range and paginates after grouping.

use serde_json::Value;

use crate::{
    collate,
    store::{AllDocsOptions, Doc, DocStore},
    view::{
        reduce::{reduce_rows, Grouping, Reducer, ScanRow},
        View,
    },
    Error, Result,
};

/// Staleness of the index a query is willing to observe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stale {
    /// Drain the source change feed into the index, then query.
    No,
    /// Query whatever is indexed, skip the update.
    Ok,
    /// Query whatever is indexed, then queue an update behind the query.
    UpdateAfter,
}

impl Default for Stale {
    fn default() -> Stale {
        Stale::No
    }
}

/// Options for [crate::view::query]. All keys are logical, emitted keys,
/// bounds are inclusive, and `startkey`/`endkey` follow the scan
/// direction, with `descending` set the scan runs from `startkey` down
/// to `endkey`.
#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    pub startkey: Option<Value>,
    pub endkey: Option<Value>,
    pub key: Option<Value>,
    pub keys: Option<Vec<Value>>,
    pub descending: bool,
    pub limit: Option<usize>,
    pub skip: usize,
    pub include_docs: bool,
    pub reduce: Option<bool>,
    pub group: bool,
    pub group_level: Option<usize>,
    pub stale: Stale,
}

impl QueryOptions {
    pub fn set_startkey(&mut self, key: Value) -> &mut Self {
        self.startkey = Some(collate::normalize_key(&key));
        self
    }

    pub fn set_endkey(&mut self, key: Value) -> &mut Self {
        self.endkey = Some(collate::normalize_key(&key));
        self
    }

    /// Equality shorthand, `startkey = endkey = key`.
    pub fn set_key(&mut self, key: Value) -> &mut Self {
        self.key = Some(collate::normalize_key(&key));
        self
    }

    /// Discrete key lookup. The result holds one run of rows per key
    /// occurrence, duplicates included, in the supplied order.
    pub fn set_keys(&mut self, keys: Vec<Value>) -> &mut Self {
        self.keys = Some(keys.iter().map(|k| collate::normalize_key(k)).collect());
        self
    }

    pub fn set_descending(&mut self, descending: bool) -> &mut Self {
        self.descending = descending;
        self
    }

    pub fn set_limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn set_skip(&mut self, skip: usize) -> &mut Self {
        self.skip = skip;
        self
    }

    pub fn set_include_docs(&mut self, include_docs: bool) -> &mut Self {
        self.include_docs = include_docs;
        self
    }

    /// `false` suppresses a configured reducer for this query.
    pub fn set_reduce(&mut self, reduce: bool) -> &mut Self {
        self.reduce = Some(reduce);
        self
    }

    pub fn set_group(&mut self, group: bool) -> &mut Self {
        self.group = group;
        self
    }

    /// Group array keys on their first `group_level` elements. ZERO
    /// behaves like no grouping at all.
    pub fn set_group_level(&mut self, group_level: usize) -> &mut Self {
        self.group_level = Some(group_level);
        self
    }

    pub fn set_stale(&mut self, stale: Stale) -> &mut Self {
        self.stale = stale;
        self
    }
}

/// One result row. Reduced rows carry no `id` and no `doc`.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub id: Option<String>,
    pub key: Value,
    pub value: Value,
    pub doc: Option<Doc>,
}

/// One page of query output. `total_rows` and `offset` are present iff
/// the query did not reduce.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub total_rows: Option<u64>,
    pub offset: Option<u64>,
    pub rows: Vec<Row>,
}

// reject invalid option combinations before any store i/o.
pub(crate) fn validate(opts: &QueryOptions, reducing: bool) -> Result<()> {
    if reducing && opts.include_docs {
        err_at!(Invalid, msg: "include_docs is invalid within a reduce")?
    }
    if let (Some(startkey), Some(endkey)) = (&opts.startkey, &opts.endkey) {
        use std::cmp::Ordering::{Greater, Less};

        let ord = collate::collate(startkey, endkey);
        let inverted = match opts.descending {
            false => ord == Greater,
            true => ord == Less,
        };
        if inverted {
            err_at!(Invalid, msg: "startkey collates after endkey")?
        }
    }
    Ok(())
}

pub(crate) fn execute<D>(view: &View<D>, opts: &QueryOptions) -> Result<Page>
where
    D: DocStore,
{
    let reducer = match (&view.reduce_src, opts.reduce) {
        (Some(_), Some(false)) | (None, _) => None,
        (Some(src), _) => Some(Reducer::from_src(src)?),
    };

    match &opts.keys {
        Some(keys) => execute_keys(view, opts, keys, reducer),
        None => execute_range(view, opts, reducer),
    }
}

fn execute_range<D>(
    view: &View<D>,
    opts: &QueryOptions,
    reducer: Option<Reducer>,
) -> Result<Page>
where
    D: DocStore,
{
    let (startkey, endkey) = match &opts.key {
        Some(key) => (Some(key), Some(key)),
        None => (opts.startkey.as_ref(), opts.endkey.as_ref()),
    };

    // in composite-key space the scan-start side takes the low sentinel
    // on an ascending scan and the high sentinel on a descending one.
    let (low, high) = (collate::key_scan_low, collate::key_scan_high);
    let (start, end) = match opts.descending {
        false => (startkey.map(low), endkey.map(high)),
        true => (startkey.map(high), endkey.map(low)),
    };

    let mut sopts = AllDocsOptions::default();
    sopts.set_descending(opts.descending);
    if let Some(start) = &start {
        sopts.set_startkey(start);
    }
    if let Some(end) = &end {
        sopts.set_endkey(end);
    }
    if reducer.is_none() {
        sopts.set_skip(opts.skip);
        if let Some(limit) = opts.limit {
            sopts.set_limit(limit);
        }
    }

    let (rows, total_rows) = scan(view, sopts)?;

    match reducer {
        None => {
            let rows = materialize(view, opts, rows)?;
            let val = Page {
                total_rows: Some(total_rows),
                offset: Some(opts.skip as u64),
                rows,
            };
            Ok(val)
        }
        Some(reducer) => {
            let grouping = Grouping::from_opts(opts.group, opts.group_level);
            let groups = reduce_rows(&reducer, &rows, grouping)?;
            Ok(paginate_groups(opts, groups))
        }
    }
}

fn execute_keys<D>(
    view: &View<D>,
    opts: &QueryOptions,
    keys: &[Value],
    reducer: Option<Reducer>,
) -> Result<Page>
where
    D: DocStore,
{
    // one scan per distinct key, shared across duplicate occurrences.
    let mut fetched: Vec<(String, Vec<ScanRow>)> = vec![];
    let mut total_rows = 0;
    for key in keys.iter() {
        let enc = collate::to_indexable_string(key);
        if fetched.iter().any(|(e, _)| *e == enc) {
            continue;
        }
        let mut sopts = AllDocsOptions::default();
        sopts
            .set_startkey(&collate::key_scan_low(key))
            .set_endkey(&collate::key_scan_high(key));
        let (rows, total) = scan(view, sopts)?;
        total_rows = total;
        fetched.push((enc, rows));
    }
    if keys.is_empty() {
        let mut sopts = AllDocsOptions::default();
        sopts.set_limit(0);
        total_rows = scan(view, sopts)?.1;
    }

    match reducer {
        None => {
            let mut rows: Vec<ScanRow> = vec![];
            for key in keys.iter() {
                rows.extend(rows_of(&fetched, key).iter().cloned());
            }
            let rows = apply_limit(opts, rows);
            let rows = materialize(view, opts, rows)?;
            let val = Page {
                total_rows: Some(total_rows),
                offset: Some(opts.skip as u64),
                rows,
            };
            Ok(val)
        }
        Some(reducer) => {
            // each key occurrence reduces on its own, duplicate keys
            // duplicate their groups.
            let grouping = Grouping::from_opts(opts.group, opts.group_level);
            let mut groups: Vec<(Value, Value)> = vec![];
            for key in keys.iter() {
                groups.extend(reduce_rows(&reducer, rows_of(&fetched, key), grouping)?);
            }
            Ok(paginate_groups(opts, groups))
        }
    }
}

fn rows_of<'a>(fetched: &'a [(String, Vec<ScanRow>)], key: &Value) -> &'a [ScanRow] {
    let enc = collate::to_indexable_string(key);
    match fetched.iter().find(|(e, _)| *e == enc) {
        Some((_, rows)) => rows,
        None => &[],
    }
}

// run one store scan and parse the records into scan rows.
fn scan<D>(view: &View<D>, sopts: AllDocsOptions) -> Result<(Vec<ScanRow>, u64)>
where
    D: DocStore,
{
    let page = view.store.all_docs(sopts)?;

    let mut rows: Vec<ScanRow> = Vec::with_capacity(page.rows.len());
    for doc in page.rows.into_iter() {
        let id = match doc.body.get("id").and_then(|id| id.as_str()) {
            Some(id) => id.to_string(),
            None => err_at!(Fatal, msg: "corrupted index record {:?}", doc.id)?,
        };
        let key = match doc.body.get("key") {
            Some(key) => key.clone(),
            None => err_at!(Fatal, msg: "corrupted index record {:?}", doc.id)?,
        };
        let value = doc.body.get("value").cloned().unwrap_or(Value::Null);
        let reduce_out = doc.body.get("reduce_out").cloned();
        rows.push(ScanRow { id, key, value, reduce_out });
    }

    Ok((rows, page.total_rows))
}

fn apply_limit(opts: &QueryOptions, rows: Vec<ScanRow>) -> Vec<ScanRow> {
    let limit = opts.limit.unwrap_or(usize::MAX);
    rows.into_iter().skip(opts.skip).take(limit).collect()
}

// scan rows into result rows, joining source documents when asked to.
fn materialize<D>(
    view: &View<D>,
    opts: &QueryOptions,
    rows: Vec<ScanRow>,
) -> Result<Vec<Row>>
where
    D: DocStore,
{
    let mut out: Vec<Row> = Vec::with_capacity(rows.len());
    for row in rows.into_iter() {
        let doc = match opts.include_docs {
            true => join_doc(view, &row)?,
            false => None,
        };
        out.push(Row {
            id: Some(row.id),
            key: row.key,
            value: row.value,
            doc,
        });
    }
    Ok(out)
}

// join on `value._id` when the emitted value names one, else on the
// emitting document itself. A missing target is not an error, the row
// simply carries no doc.
fn join_doc<D>(view: &View<D>, row: &ScanRow) -> Result<Option<Doc>>
where
    D: DocStore,
{
    let target = match row.value.get("_id").and_then(|id| id.as_str()) {
        Some(id) => id,
        None => row.id.as_str(),
    };
    match view.source.get(target) {
        Ok(doc) => Ok(Some(doc)),
        Err(Error::KeyNotFound(_, _)) => Ok(None),
        Err(err) => Err(err),
    }
}

fn paginate_groups(opts: &QueryOptions, groups: Vec<(Value, Value)>) -> Page {
    let limit = opts.limit.unwrap_or(usize::MAX);
    let rows: Vec<Row> = groups
        .into_iter()
        .skip(opts.skip)
        .take(limit)
        .map(|(key, value)| Row { id: None, key, value, doc: None })
        .collect();

    Page { total_rows: None, offset: None, rows }
}

#[cfg(test)]
#[path = "query_test.rs"]
mod query_test;

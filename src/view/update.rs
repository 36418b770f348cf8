//! Module `update` implement the incremental updater.
//!
//! One run drains every source change with `seq > view.seqno`, diffs each
//! document's previously emitted rows against its fresh map output, and
//! folds the resulting tombstones, rewrites and inserts into atomic batch
//! writes on the view store. The sequence record rides along as the last
//! document of every batch, so a crash can only leave the persisted seqno
//! lagging reality, never ahead of it, the next run simply replays.

use log::debug;
use serde_json::{json, Map, Value};

use std::{cmp, collections::HashSet, slice};

use crate::{
    collate,
    store::{Change, Doc, DocStore},
    view::{
        evaluator::{self, Emitter, MapFn},
        index::meta_doc_id,
        reduce::Reducer,
        View,
    },
    Result,
};

// number of changes folded into one atomic batch write.
const BATCH_SIZE: usize = 50;

/// Bring `view` up to date with its source store.
pub(crate) fn run<D>(view: &mut View<D>) -> Result<()>
where
    D: DocStore,
{
    let mapf = evaluator::map_fn(&view.map_src)?;
    let reducer = match &view.reduce_src {
        Some(src) => Some(Reducer::from_src(src)?),
        None => None,
    };

    let changes = view.source.changes(view.seqno)?;
    if changes.is_empty() {
        return Ok(());
    }

    let mut n_changes = 0;
    for batch in changes.chunks(BATCH_SIZE) {
        let mut docs: Vec<Doc> = vec![];
        let mut batch_seqno = view.seqno;
        for change in batch.iter() {
            if change.seq <= view.seqno {
                continue; // replay safety
            }
            batch_seqno = cmp::max(batch_seqno, change.seq);
            if change.id.starts_with('_') {
                continue; // reserved name-space, never indexed
            }
            apply_change(view, &mapf, reducer.as_ref(), change, &mut docs)?;
            n_changes += 1;
        }
        docs.push(view.to_seq_doc(batch_seqno));
        view.store.bulk_docs(docs)?;
        view.seqno = batch_seqno;
    }

    debug!(
        target: "mrview",
        "{:?} applied {} changes, seqno {}", view.name, n_changes, view.seqno
    );
    Ok(())
}

// fold one change into `docs`, emission order is data records, then the
// meta record, the caller appends the sequence record after the batch.
fn apply_change<D>(
    view: &View<D>,
    mapf: &MapFn,
    reducer: Option<&Reducer>,
    change: &Change,
    docs: &mut Vec<Doc>,
) -> Result<()>
where
    D: DocStore,
{
    let emitted: Vec<(Value, Value)> = match change.deleted {
        true => vec![],
        false => {
            let mut emitter = Emitter::new();
            mapf(&change.doc, &mut emitter)?;
            emitter.into_rows()
        }
    };

    let mut live: Vec<String> = vec![];
    let mut fresh: HashSet<String> = HashSet::new();
    for (emit_index, (key, value)) in emitted.iter().enumerate() {
        let ck = collate::composite_key(key, &change.id, value, emit_index);

        let mut body = Map::new();
        body.insert("id".to_string(), Value::String(change.id.clone()));
        body.insert("key".to_string(), key.clone());
        body.insert("value".to_string(), value.clone());
        if let Some(reducer) = reducer {
            let keys = [json!([key, change.id])];
            let out = reducer.reduce(&keys, slice::from_ref(value), false)?;
            body.insert("reduce_out".to_string(), out);
        }

        docs.push(Doc::new(&ck, Value::Object(body)));
        fresh.insert(ck.clone());
        live.push(ck);
    }

    // rows emitted by the previous version of this document, and no
    // longer emitted, are tombstoned.
    for old in view.to_meta_keys(&change.id)?.into_iter() {
        if !fresh.contains(&old) {
            docs.push(Doc::new_deleted(&old));
        }
    }

    let meta_id = meta_doc_id(&change.id);
    match live.is_empty() {
        true => docs.push(Doc::new_deleted(&meta_id)),
        false => {
            live.sort();
            docs.push(Doc::new(&meta_id, json!({ "keys": live })));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "update_test.rs"]
mod update_test;

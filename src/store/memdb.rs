//! Module implement [Mdb], an in-memory document store.
//!
//! [Mdb] keeps its documents in an ordered map behind a copy-on-write
//! snapshot, writers build a fresh snapshot and swap it in while readers
//! keep iterating the old one. Named stores live in a registry shared by
//! every handle cloned or [opened][crate::store::DocStore::open] from the
//! same environment, which is what stands in for on-disk persistence, a
//! store opened twice under one name observes the same data.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use std::{
    collections::HashMap,
    collections::BTreeMap,
    ops::Bound,
    sync::Arc,
};

use crate::{
    store::{AllDocs, AllDocsOptions, Change, Doc, DocStore, LOCAL_PREFIX},
    Error, Result,
};

type Snapshot = Arc<RwLock<Arc<Inner>>>;

/// In-memory document store, the reference [DocStore] adapter.
#[derive(Clone)]
pub struct Mdb {
    name: String,
    registry: Arc<Mutex<HashMap<String, Snapshot>>>,
    inner: Snapshot,
}

#[derive(Clone, Default)]
struct Inner {
    seqno: u64,
    docs: BTreeMap<String, Slot>,
    by_seq: BTreeMap<u64, String>,
}

#[derive(Clone)]
struct Slot {
    seq: u64,
    deleted: bool,
    body: Value,
}

impl Mdb {
    /// Create a new store environment with a single store named `name`.
    pub fn new(name: &str) -> Mdb {
        let inner: Snapshot = Arc::new(RwLock::new(Arc::new(Inner::default())));

        let mut registry = HashMap::new();
        registry.insert(name.to_string(), Arc::clone(&inner));

        Mdb {
            name: name.to_string(),
            registry: Arc::new(Mutex::new(registry)),
            inner,
        }
    }

    /// Number of live, non-local documents.
    pub fn len(&self) -> usize {
        let inner = Arc::clone(&self.inner.read());
        inner.docs.values().filter(|slot| slot.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_snapshot(&self) -> Arc<Inner> {
        Arc::clone(&self.inner.read())
    }
}

impl Slot {
    fn is_live(&self) -> bool {
        !self.deleted
    }
}

impl DocStore for Mdb {
    fn to_name(&self) -> String {
        self.name.to_string()
    }

    fn open(&self, name: &str) -> Result<Mdb> {
        let mut registry = self.registry.lock();
        let inner = registry
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Arc::new(Inner::default()))));

        Ok(Mdb {
            name: name.to_string(),
            registry: Arc::clone(&self.registry),
            inner: Arc::clone(inner),
        })
    }

    fn destroy(&self) -> Result<()> {
        self.registry.lock().remove(&self.name);
        // existing handles to this store shall observe an empty store.
        *self.inner.write() = Arc::new(Inner::default());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Doc> {
        let inner = self.to_snapshot();
        match inner.docs.get(id) {
            Some(slot) if slot.is_live() => Ok(Doc::new(id, slot.body.clone())),
            Some(_) | None => err_at!(KeyNotFound, msg: "missing {}", id),
        }
    }

    fn bulk_docs(&self, docs: Vec<Doc>) -> Result<()> {
        let mut locked = self.inner.write();

        let mut inner: Inner = locked.as_ref().clone();
        for doc in docs.into_iter() {
            if doc.is_local() {
                // local documents never enter the change feed.
                match doc.deleted {
                    true => {
                        inner.docs.remove(&doc.id);
                    }
                    false => {
                        let slot = Slot { seq: 0, deleted: false, body: doc.body };
                        inner.docs.insert(doc.id, slot);
                    }
                }
                continue;
            }

            inner.seqno += 1;
            if let Some(old) = inner.docs.get(&doc.id) {
                inner.by_seq.remove(&old.seq);
            }
            inner.by_seq.insert(inner.seqno, doc.id.clone());
            let slot = Slot {
                seq: inner.seqno,
                deleted: doc.deleted,
                body: doc.body,
            };
            inner.docs.insert(doc.id, slot);
        }

        *locked = Arc::new(inner);
        Ok(())
    }

    fn all_docs(&self, opts: AllDocsOptions) -> Result<AllDocs> {
        let inner = self.to_snapshot();

        let total_rows: u64 = inner
            .docs
            .iter()
            .filter(|(id, slot)| !id.starts_with(LOCAL_PREFIX) && slot.is_live())
            .count() as u64;

        if let Some(keys) = &opts.keys {
            let mut rows = vec![];
            for key in keys.iter() {
                if let Some(slot) = inner.docs.get(key) {
                    if slot.is_live() && !key.starts_with(LOCAL_PREFIX) {
                        rows.push(Doc::new(key, slot.body.clone()));
                    }
                }
            }
            return Ok(AllDocs { rows, total_rows });
        }

        // startkey/endkey follow scan direction, normalize to map order.
        let (low, high) = match opts.descending {
            false => (opts.startkey.clone(), opts.endkey.clone()),
            true => (opts.endkey.clone(), opts.startkey.clone()),
        };
        if let (Some(low), Some(high)) = (&low, &high) {
            if low > high {
                return Ok(AllDocs { rows: vec![], total_rows });
            }
        }
        let low = low.map_or(Bound::Unbounded, Bound::Included);
        let high = high.map_or(Bound::Unbounded, Bound::Included);

        let iter = inner
            .docs
            .range((low, high))
            .filter(|(id, slot)| !id.starts_with(LOCAL_PREFIX) && slot.is_live())
            .map(|(id, slot)| Doc::new(id, slot.body.clone()));

        let limit = opts.limit.unwrap_or(usize::MAX);
        let rows: Vec<Doc> = match opts.descending {
            false => iter.skip(opts.skip).take(limit).collect(),
            true => iter.rev().skip(opts.skip).take(limit).collect(),
        };

        Ok(AllDocs { rows, total_rows })
    }

    fn changes(&self, since: u64) -> Result<Vec<Change>> {
        let inner = self.to_snapshot();

        let changes = inner
            .by_seq
            .range((Bound::Excluded(since), Bound::Unbounded))
            .map(|(seq, id)| {
                let slot = &inner.docs[id];
                let doc = match slot.deleted {
                    true => Doc::new_deleted(id),
                    false => Doc::new(id, slot.body.clone()),
                };
                Change {
                    id: id.clone(),
                    seq: *seq,
                    deleted: slot.deleted,
                    doc,
                }
            })
            .collect();

        Ok(changes)
    }

    fn to_seqno(&self) -> u64 {
        self.to_snapshot().seqno
    }
}

#[cfg(test)]
#[path = "memdb_test.rs"]
mod memdb_test;

//! Module `store` define the adapter contract expected from document
//! stores, and supply [Mdb], an in-memory reference adapter.
//!
//! The view engine sits on top of two stores, both speaking [DocStore]:
//!
//! * the _source_ store, holding application documents, read-only to the
//!   engine, supplying the change feed that drives incremental updates.
//! * the _view_ store, holding one document per emitted row keyed by its
//!   composite indexable key, owned exclusively by the engine.
//!
//! View stores are opened through [DocStore::open] on the source handle, so
//! both ends always share the same adapter.

use serde_json::Value;

use crate::Result;

mod memdb;

pub use memdb::Mdb;

/// Reserved id prefix for store-local book-keeping documents. Local
/// documents are readable and writable like any other but never show up
/// in [DocStore::all_docs], [DocStore::changes] or the document count.
pub const LOCAL_PREFIX: &str = "_local/";

/// A single document. `body` is expected to be a JSON object for
/// application documents, though the store does not enforce shape.
#[derive(Clone, Debug, PartialEq)]
pub struct Doc {
    pub id: String,
    pub body: Value,
    pub deleted: bool,
}

impl Doc {
    pub fn new(id: &str, body: Value) -> Doc {
        Doc {
            id: id.to_string(),
            body,
            deleted: false,
        }
    }

    /// Create a tombstone for `id`. Writing it through
    /// [DocStore::bulk_docs] deletes the document.
    pub fn new_deleted(id: &str) -> Doc {
        Doc {
            id: id.to_string(),
            body: Value::Null,
            deleted: true,
        }
    }

    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_PREFIX)
    }
}

/// A single record from the change feed. Feeds deliver at most one change
/// per document, the latest, in ascending `seq` order.
#[derive(Clone, Debug)]
pub struct Change {
    pub id: String,
    pub seq: u64,
    pub doc: Doc,
    pub deleted: bool,
}

/// Options for [DocStore::all_docs]. `startkey`/`endkey` are inclusive and
/// follow the scan direction, that is, with `descending` set the scan runs
/// from `startkey` down to `endkey`.
#[derive(Clone, Debug, Default)]
pub struct AllDocsOptions {
    pub keys: Option<Vec<String>>,
    pub startkey: Option<String>,
    pub endkey: Option<String>,
    pub descending: bool,
    pub limit: Option<usize>,
    pub skip: usize,
}

impl AllDocsOptions {
    pub fn set_keys(&mut self, keys: Vec<String>) -> &mut Self {
        self.keys = Some(keys);
        self
    }

    pub fn set_startkey(&mut self, key: &str) -> &mut Self {
        self.startkey = Some(key.to_string());
        self
    }

    pub fn set_endkey(&mut self, key: &str) -> &mut Self {
        self.endkey = Some(key.to_string());
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
}

/// One page of ordered scan output. `total_rows` counts every live,
/// non-local document in the store, independent of the requested range.
#[derive(Clone, Debug)]
pub struct AllDocs {
    pub rows: Vec<Doc>,
    pub total_rows: u64,
}

/// Adapter contract for document stores.
///
/// Handles are cheap to clone and clones share the underlying data. All
/// mutations go through [DocStore::bulk_docs], which applies its batch
/// atomically, either every document in the batch becomes visible or none
/// does.
pub trait DocStore: Clone + Send + Sync + 'static {
    /// Name uniquely identifying this store within its adapter.
    fn to_name(&self) -> String;

    /// Open a sibling store under `name`, sharing the adapter. Opening the
    /// same name twice observes the same data.
    fn open(&self, name: &str) -> Result<Self>;

    /// Delete this store's backing data. Subsequent [DocStore::open] on the
    /// same name starts fresh.
    fn destroy(&self) -> Result<()>;

    /// Fetch a single document. Missing and deleted documents come back as
    /// `Error::KeyNotFound`.
    fn get(&self, id: &str) -> Result<Doc>;

    /// Atomically apply a batch of writes, in batch order. Documents with
    /// the `deleted` flag are tombstoned.
    fn bulk_docs(&self, docs: Vec<Doc>) -> Result<()>;

    /// Ordered scan over live documents, by id.
    fn all_docs(&self, opts: AllDocsOptions) -> Result<AllDocs>;

    /// Return every change with `seq > since`, ascending, one per document.
    fn changes(&self, since: u64) -> Result<Vec<Change>>;

    /// Highest sequence number issued by this store so far.
    fn to_seqno(&self) -> u64;
}

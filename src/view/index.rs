//! Module `index` implement the view handle and its naming scheme.

use log::{debug, info};
use serde_json::{json, Value};
use xxhash_rust::xxh3::xxh3_64;

use crate::{
    store::{Doc, DocStore},
    Error, Result,
};

/// Document id, inside the view store, persisting the highest source
/// sequence number fully applied to the index.
pub(crate) const SEQ_DOC_ID: &str = "_local/lastSeq";

/// Document id, inside the view store, listing the composite keys
/// currently attributable to one source document.
pub(crate) fn meta_doc_id(doc_id: &str) -> String {
    format!("_local/doc_{}", doc_id)
}

/// Handle to one view's index.
///
/// Opening a handle is cheap, the adapter's named-store registry carries
/// the persistent state, all the handle holds is the resolved stores, the
/// view definition and a cache of the persisted sequence number.
pub struct View<D>
where
    D: DocStore,
{
    pub(crate) name: String,
    pub(crate) source: D,
    pub(crate) store: D,
    pub(crate) map_src: String,
    pub(crate) reduce_src: Option<String>,
    pub(crate) seqno: u64,
}

impl<D> View<D>
where
    D: DocStore,
{
    /// Open, or create, the index for `(source, map_src, reduce_src)`.
    /// Temporary views live under a separate name-space so they never
    /// clobber a persisted index for the same definition.
    pub fn open(source: &D, map_src: &str, reduce_src: Option<&str>, temp: bool) -> Result<View<D>> {
        let infix = if temp { "mrtemp" } else { "mrview" };
        let hash = hash28(map_src, reduce_src);
        let name = format!("{}-{}-{:07x}", source.to_name(), infix, hash);

        let store = source.open(&name)?;
        let seqno = match store.get(SEQ_DOC_ID) {
            Ok(doc) => doc.body.get("seq").and_then(|s| s.as_u64()).unwrap_or(0),
            Err(Error::KeyNotFound(_, _)) => 0,
            Err(err) => return Err(err),
        };
        debug!(target: "mrview", "open {:?} at seqno {}", name, seqno);

        let val = View {
            name,
            source: source.clone(),
            store,
            map_src: map_src.to_string(),
            reduce_src: reduce_src.map(|s| s.to_string()),
            seqno,
        };

        Ok(val)
    }

    pub fn to_name(&self) -> String {
        self.name.to_string()
    }

    /// Highest source sequence number fully applied to this index.
    pub fn to_seqno(&self) -> u64 {
        self.seqno
    }

    /// Delete the index's backing store.
    pub fn destroy(self) -> Result<()> {
        info!(target: "mrview", "destroy {:?} at seqno {}", self.name, self.seqno);
        self.store.destroy()
    }

    // the sequence record, appended last to every update batch.
    pub(crate) fn to_seq_doc(&self, seqno: u64) -> Doc {
        Doc::new(SEQ_DOC_ID, json!({ "seq": seqno }))
    }

    // composite keys currently attributed to `doc_id`, empty when the
    // meta record is absent.
    pub(crate) fn to_meta_keys(&self, doc_id: &str) -> Result<Vec<String>> {
        let keys = match self.store.get(&meta_doc_id(doc_id)) {
            Ok(doc) => match doc.body.get("keys") {
                Some(Value::Array(keys)) => keys
                    .iter()
                    .filter_map(|k| k.as_str().map(|k| k.to_string()))
                    .collect(),
                Some(_) | None => vec![],
            },
            Err(Error::KeyNotFound(_, _)) => vec![],
            Err(err) => return Err(err),
        };
        Ok(keys)
    }
}

// 28-bit hash over the view definition, rendered as seven hex digits in
// the index name. Not cryptographic, distinct definitions may collide,
// in which case they also share an index.
fn hash28(map_src: &str, reduce_src: Option<&str>) -> u64 {
    let mut src = map_src.to_string();
    if let Some(reduce_src) = reduce_src {
        src.push_str(reduce_src);
    }
    xxh3_64(src.as_bytes()) & 0x0FFF_FFFF
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;

//! Package implement an incremental map/reduce view engine for document
//! stores.
//!
//! A _view_ is a secondary index derived from a user supplied `map` function,
//! and an optional `reduce` function, applied over a source collection of
//! JSON documents. Views are maintained incrementally, driven by the source
//! store's change sequence, and queried with CouchDB compatible semantics,
//! like `startkey`/`endkey` range scans, multi `keys` lookup, grouping and
//! re-reduction.
//!
//! Components of this package:
//!
//! * [collate] module, total ordering over JSON values and the indexable
//!   key codec whose byte order matches collation order.
//! * [store] module, the [store::DocStore] adapter contract expected from
//!   the source database, along with [store::Mdb], an in-memory reference
//!   adapter.
//! * [view] module, index life-cycle, the incremental updater, the query
//!   planner/executor, grouping/reduction and the task queue serializing
//!   all of it.
//!
//! Sequence numbers
//! ----------------
//!
//! Every mutation ingested by the source store carries a sequence number,
//! starting from ONE. A view remembers the highest sequence number it has
//! fully applied, as `last_seq`, persisted inside the view's own store.
//! Draining the change feed from `last_seq` and diffing each document's
//! previously emitted rows against its fresh ones is what makes maintenance
//! incremental.

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// err_at!(Invalid, msg: "inverted key range")
/// ```
///
/// ```ignore
/// err_at!(IPCFail, tx.send(msg))
/// ```
///
/// ```ignore
/// err_at!(ThreadFail, handle.join(), "view-updater")
/// ```
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

pub mod collate;
pub mod store;
pub mod view;

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically the file location where the
/// error was composed, and a human readable message. Refer to individual
/// methods for relevant error variants.
pub enum Error {
    /// Invalid query options, rejected before touching the store.
    Invalid(String, String),
    /// Requested document, design document or view is missing.
    KeyNotFound(String, String),
    /// Reducer received values it cannot aggregate.
    InvalidValue(String, String),
    /// Inter-process-communication failure with the task-queue thread.
    IPCFail(String, String),
    /// Task-queue thread failure.
    ThreadFail(String, String),
    /// Irrecoverable failure, typically a broken store invariant.
    Fatal(String, String),
}

impl Error {
    /// Canonical wire name for this error, as surfaced by the original
    /// HTTP facing engine.
    pub fn to_name(&self) -> &'static str {
        match self {
            Error::Invalid(_, _) => "query_parse_error",
            Error::KeyNotFound(_, _) => "not_found",
            Error::InvalidValue(_, _) => "invalid_value",
            Error::IPCFail(_, _) => "internal_error",
            Error::ThreadFail(_, _) => "internal_error",
            Error::Fatal(_, _) => "internal_error",
        }
    }

    /// HTTP-ish status code paired with [Error::to_name].
    pub fn to_status(&self) -> u16 {
        match self {
            Error::Invalid(_, _) => 400,
            Error::KeyNotFound(_, _) => 404,
            _ => 500,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::{Fatal, IPCFail, Invalid, InvalidValue, KeyNotFound, ThreadFail};

        match self {
            Invalid(p, msg) => write!(f, "{} Invalid: {}", p, msg),
            KeyNotFound(p, msg) => write!(f, "{} KeyNotFound: {}", p, msg),
            InvalidValue(p, msg) => write!(f, "{} InvalidValue: {}", p, msg),
            IPCFail(p, msg) => write!(f, "{} IPCFail: {}", p, msg),
            ThreadFail(p, msg) => write!(f, "{} ThreadFail: {}", p, msg),
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}

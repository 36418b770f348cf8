//! Module `collate` implement total ordering over JSON values, and the
//! indexable-key codec used to persist view rows.
//!
//! Collation ranks value types as,
//!
//! ```notest
//! null < false < true < number < string < array < object
//! ```
//!
//! numbers compare numerically, strings compare by unicode code-point,
//! arrays compare element-wise and objects compare by their (key, value)
//! pairs in insertion order. [to_indexable_string] encodes a value such that
//! comparing two encoded strings, by code-point, gives the same ordering as
//! [collate] on the source values. Encoded strings double up as document ids
//! inside a view's store, whose primary index is ordered lexicographically.
//!
//! The encoding is versioned via [CODEC_VER] and is part of the on-disk
//! contract, changing the scheme requires rebuilding every view.

use serde_json::{Number, Value};

use std::cmp::Ordering;

/// Codec version, bump when the encoding scheme changes shape.
pub const CODEC_VER: u32 = 0x00010001;

const TERM: char = '\u{0}';
const TAG_NULL: char = '\u{1}';
const TAG_FALSE: char = '\u{2}';
const TAG_TRUE: char = '\u{3}';
const TAG_NUMBER: char = '\u{4}';
const TAG_STRING: char = '\u{5}';
const TAG_ARRAY: char = '\u{6}';
const TAG_OBJECT: char = '\u{7}';

/// Canonicalize `value` for use as an emitted key.
///
/// Non-finite numbers become `null`, negative zero folds to zero, arrays
/// and objects are normalized recursively. Idempotent, that is,
/// `normalize_key(normalize_key(v)) == normalize_key(v)`.
pub fn normalize_key(value: &Value) -> Value {
    match value {
        Value::Number(num) => match num.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            Some(f) if f == 0.0 => Value::Number(Number::from(0)),
            Some(_) => value.clone(),
            None => Value::Null,
        },
        Value::Array(items) => Value::Array(items.iter().map(normalize_key).collect()),
        Value::Object(map) => {
            let map = map.iter().map(|(k, v)| (k.clone(), normalize_key(v)));
            Value::Object(map.collect())
        }
        _ => value.clone(),
    }
}

/// Total order over JSON values, in CouchDB collation order.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    match type_rank(a).cmp(&type_rank(b)) {
        Ordering::Equal => match (a, b) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => {
                let (x, y) = (to_f64(x), to_f64(y));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Array(xs), Value::Array(ys)) => {
                for (x, y) in xs.iter().zip(ys.iter()) {
                    match collate(x, y) {
                        Ordering::Equal => (),
                        ord => return ord,
                    }
                }
                xs.len().cmp(&ys.len())
            }
            (Value::Object(xs), Value::Object(ys)) => {
                for ((xk, xv), (yk, yv)) in xs.iter().zip(ys.iter()) {
                    match xk.cmp(yk) {
                        Ordering::Equal => (),
                        ord => return ord,
                    }
                    match collate(xv, yv) {
                        Ordering::Equal => (),
                        ord => return ord,
                    }
                }
                xs.len().cmp(&ys.len())
            }
            _ => unreachable!(),
        },
        ord => ord,
    }
}

/// Encode `value` such that, for all values `a` and `b`,
///
/// ```notest
/// sign(collate(a, b)) == sign(to_indexable_string(a).cmp(to_indexable_string(b)))
/// ```
///
/// Output chars stay within `U+0000..=U+00FF`, so the string's UTF-8 byte
/// order and its code-point order agree.
pub fn to_indexable_string(value: &Value) -> String {
    let mut out = String::new();
    encode_value(value, &mut out);
    out
}

/// Composite indexable key for one emitted row. Primary sort by emitted
/// `key`, then by source `doc_id`, then by emitted `value`, and finally by
/// `emit_index`, the 0-based position of the emit call within a single map
/// invocation, which keeps duplicate `(key, value)` emissions distinct.
pub fn composite_key(key: &Value, doc_id: &str, value: &Value, emit_index: usize) -> String {
    let parts = vec![
        key.clone(),
        Value::String(doc_id.to_string()),
        value.clone(),
        Value::from(emit_index as u64),
    ];
    to_indexable_string(&Value::Array(parts))
}

/// Scan bound that collates before every composite key with emitted key
/// `key` and after every composite key with a lesser emitted key.
pub fn key_scan_low(key: &Value) -> String {
    to_indexable_string(&Value::Array(vec![key.clone()]))
}

/// Scan bound that collates after every composite key with emitted key
/// `key`. Row ids are strings, so an object in the doc-id position caps the
/// key's row range.
pub fn key_scan_high(key: &Value) -> String {
    let empty = || Value::Object(serde_json::Map::new());
    let parts = vec![key.clone(), empty(), empty(), empty()];
    to_indexable_string(&Value::Array(parts))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 1,
        Value::Bool(false) => 2,
        Value::Bool(true) => 3,
        Value::Number(_) => 4,
        Value::String(_) => 5,
        Value::Array(_) => 6,
        Value::Object(_) => 7,
    }
}

// All JSON numbers, signed, unsigned and floating point, collate through
// f64, matching the number semantics of the original engine.
fn to_f64(num: &Number) -> f64 {
    num.as_f64().unwrap_or(0.0)
}

fn encode_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(false) => out.push(TAG_FALSE),
        Value::Bool(true) => out.push(TAG_TRUE),
        Value::Number(num) => {
            out.push(TAG_NUMBER);
            encode_number(to_f64(num), out);
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            encode_string(s, out);
        }
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            for item in items.iter() {
                encode_value(item, out);
            }
            out.push(TERM);
        }
        Value::Object(map) => {
            out.push(TAG_OBJECT);
            for (key, val) in map.iter() {
                out.push(TAG_STRING);
                encode_string(key, out);
                encode_value(val, out);
            }
            out.push(TERM);
        }
    }
}

// Fixed width, eight chars. Flip the sign bit for positives, flip every
// bit for negatives, then emit big-endian, which makes the natural f64
// order fall out of a plain byte compare.
fn encode_number(f: f64, out: &mut String) {
    let bits = f.to_bits();
    let bits = if bits & (1 << 63) != 0 { !bits } else { bits | (1 << 63) };
    for byte in bits.to_be_bytes().iter() {
        out.push(*byte as char);
    }
}

// Variable width, `U+0000` terminated. Chars `U+0000` and `U+0001` inside
// the string are escaped behind `U+0001` so the terminator stays unambiguous
// and order preserving.
fn encode_string(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '\u{0}' => {
                out.push('\u{1}');
                out.push('\u{1}');
            }
            '\u{1}' => {
                out.push('\u{1}');
                out.push('\u{2}');
            }
            ch => out.push(ch),
        }
    }
    out.push(TERM);
}

#[cfg(test)]
#[path = "collate_test.rs"]
mod collate_test;

//! Canonical JSON encoding for deterministic hashing.
//!
//! Every digest in the ledger is computed over this encoding, so it must be
//! byte-identical across nodes and implementations:
//! - Object keys sorted by code point
//! - `", "` between items and `": "` between key and value
//! - ASCII-only output; everything outside `' '..='~'` is `\u` escaped,
//!   with surrogate pairs for characters beyond the BMP
//! - Integers written as integers, floats in shortest round-trip form with
//!   a trailing `.0` when integral and `e+XX` / `e-XX` exponents outside
//!   `[1e-4, 1e16)`
//!
//! Integers and floats stay distinct: `10` and `10.0` encode differently and
//! therefore hash differently.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt::Write as _;

use crate::error::CoreError;
use crate::types::Digest;

/// Encode a JSON value to its canonical string.
pub fn canonical_json(value: &Value) -> String {
    let mut buf = String::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Encode a JSON value to canonical bytes.
pub fn canonical_value_bytes(value: &Value) -> Vec<u8> {
    canonical_json(value).into_bytes()
}

/// Encode any serializable record to canonical bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(record: &T) -> Result<Vec<u8>, CoreError> {
    let value = serde_json::to_value(record).map_err(|e| CoreError::Encoding(e.to_string()))?;
    Ok(canonical_value_bytes(&value))
}

/// SHA-256 of the canonical encoding of a record.
pub fn canonical_hash<T: Serialize + ?Sized>(record: &T) -> Result<Digest, CoreError> {
    canonical_bytes(record).map(|bytes| Digest::hash(&bytes))
}

/// Recursively encode a JSON value.
pub(crate) fn encode_value_to(buf: &mut String, value: &Value) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => encode_number(buf, n),
        Value::String(s) => encode_str(buf, s),
        Value::Array(items) => encode_array(buf, items),
        Value::Object(map) => encode_object(buf, map),
    }
}

fn encode_number(buf: &mut String, n: &Number) {
    if let Some(i) = n.as_u64() {
        let _ = write!(buf, "{}", i);
    } else if let Some(i) = n.as_i64() {
        let _ = write!(buf, "{}", i);
    } else if let Some(f) = n.as_f64() {
        encode_float(buf, f);
    }
}

/// Encode an `f64` the way a shortest-repr float printer does.
pub(crate) fn encode_float(buf: &mut String, f: f64) {
    if f.is_nan() {
        buf.push_str("NaN");
        return;
    }
    if f.is_infinite() {
        buf.push_str(if f > 0.0 { "Infinity" } else { "-Infinity" });
        return;
    }

    if f.is_sign_negative() {
        buf.push('-');
    }

    // `{:e}` yields the shortest round-trip digits as `d[.ddd]e<exp>`.
    let sci = format!("{:e}", f.abs());
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let ndigits = digits.len() as i32;
    // Position of the decimal point relative to the first digit.
    let decpt = exp + 1;

    if exp < -4 || exp >= 16 {
        buf.push_str(&digits[..1]);
        if ndigits > 1 {
            buf.push('.');
            buf.push_str(&digits[1..]);
        }
        let sign = if exp < 0 { '-' } else { '+' };
        let _ = write!(buf, "e{}{:02}", sign, exp.abs());
    } else if decpt <= 0 {
        buf.push_str("0.");
        for _ in 0..(-decpt) {
            buf.push('0');
        }
        buf.push_str(&digits);
    } else if decpt < ndigits {
        let split = decpt as usize;
        buf.push_str(&digits[..split]);
        buf.push('.');
        buf.push_str(&digits[split..]);
    } else {
        buf.push_str(&digits);
        for _ in 0..(decpt - ndigits) {
            buf.push('0');
        }
        buf.push_str(".0");
    }
}

/// Encode a string with ASCII-only escaping.
pub(crate) fn encode_str(buf: &mut String, s: &str) {
    buf.push('"');
    for c in s.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            '\u{08}' => buf.push_str("\\b"),
            '\u{0c}' => buf.push_str("\\f"),
            ' '..='~' => buf.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(buf, "\\u{:04x}", unit);
                }
            }
        }
    }
    buf.push('"');
}

fn encode_array(buf: &mut String, items: &[Value]) {
    buf.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push_str(", ");
        }
        encode_value_to(buf, item);
    }
    buf.push(']');
}

/// Encode an object with keys in sorted order.
fn encode_object(buf: &mut String, map: &Map<String, Value>) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    buf.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            buf.push_str(", ");
        }
        encode_str(buf, key);
        buf.push_str(": ");
        encode_value_to(buf, value);
    }
    buf.push('}');
}

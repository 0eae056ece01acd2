//! Canonical JSON serialization.
//!
//! Revision digests are computed over this form, so the same logical field
//! set must always produce the same bytes regardless of the key order it
//! arrived in.
//!
//! Rules:
//! - Compact: no whitespace between tokens.
//! - Object keys sorted by byte value at every nesting level.
//! - Arrays preserve element order.
//! - ASCII-only output: every code point above U+007F is written as a
//!   `\uXXXX` escape (UTF-16 surrogate pairs above U+FFFF).
//! - Control characters use the short escapes (`\b \f \n \r \t`) where one
//!   exists, otherwise `\u00XX` with uppercase hex. DEL (0x7F) and `/` are
//!   written as-is.
//! - Integers are written as-is. Reals use 17 significant digits in `%g`
//!   style (`0.1` becomes `0.10000000000000001`), exponents without `+` or
//!   leading zeros, and `.0` appended when the digits alone would read as
//!   an integer (`1e2` becomes `100.0`).

use serde_json::{Map, Value};
use std::fmt::Write as _;

/// Produce a canonical JSON string from a [`serde_json::Value`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use mmdb_core::canonical::canonicalize_json;
///
/// let val = json!({"z": 1, "a": {"c": "é", "b": 2}});
/// assert_eq!(canonicalize_json(&val), r#"{"a":{"b":2,"c":"\u00E9"},"z":1}"#);
/// ```
#[must_use]
pub fn canonicalize_json(value: &Value) -> String {
    let mut buf = String::new();
    write_value(value, &mut buf);
    buf
}

/// Canonical form of a top-level object, the shape document fields take.
#[must_use]
pub fn canonicalize_object(map: &Map<String, Value>) -> String {
    let mut buf = String::new();
    write_object(map, &mut buf);
    buf
}

/// Parse `json` and return its canonical form.
///
/// # Errors
///
/// Returns `serde_json::Error` if the input string is not valid JSON.
pub fn canonicalize_json_str(json: &str) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_str(json)?;
    Ok(canonicalize_json(&value))
}

fn write_value(value: &Value, buf: &mut String) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(true) => buf.push_str("true"),
        Value::Bool(false) => buf.push_str("false"),
        Value::Number(n) => match n.as_f64().filter(|_| n.is_f64()) {
            Some(real) => write_real(real, buf),
            None => {
                let _ = write!(buf, "{n}");
            }
        },
        Value::String(s) => write_string(s, buf),
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_value(item, buf);
            }
            buf.push(']');
        }
        Value::Object(map) => write_object(map, buf),
    }
}

fn write_real(value: f64, buf: &mut String) {
    let scientific = format!("{value:.16e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or_default();

    let mut text = if (-4..17).contains(&exponent) {
        let precision = usize::try_from(16 - exponent).unwrap_or_default();
        trim_fraction(&format!("{value:.precision$}")).to_string()
    } else {
        format!("{}e{exponent}", trim_fraction(mantissa))
    };
    if !text.contains(['.', 'e']) {
        text.push_str(".0");
    }
    buf.push_str(&text);
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

fn write_object(map: &Map<String, Value>, buf: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    buf.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        write_string(key, buf);
        buf.push(':');
        write_value(value, buf);
    }
    buf.push('}');
}

fn write_string(s: &str, buf: &mut String) {
    buf.push('"');
    for ch in s.chars() {
        match ch {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\u{08}' => buf.push_str("\\b"),
            '\u{0C}' => buf.push_str("\\f"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            c if c.is_ascii() && c >= ' ' => buf.push(c),
            c => {
                let mut units = [0_u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(buf, "\\u{unit:04X}");
                }
            }
        }
    }
    buf.push('"');
}

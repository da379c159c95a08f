//! Deterministic JSON: deep key sorting, order-preserving arrays, optional
//! null stripping.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

/// Options for [`canonicalize`] and [`stable_stringify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalOptions {
    /// Treat `null` as absent: omitted from objects, filtered out of arrays.
    pub drop_null: bool,
}

impl CanonicalOptions {
    pub const KEEP_NULL: Self = Self { drop_null: false };
    pub const DROP_NULL: Self = Self { drop_null: true };
}

/// Project `input` onto its canonical form.
///
/// - Primitives pass through unchanged.
/// - Arrays keep their element order; each element is canonicalized.
/// - Object keys are sorted at every nesting level.
/// - With `drop_null`, `null` members and elements are removed.
pub fn canonicalize(input: &Value, opts: CanonicalOptions) -> Value {
    match input {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => input.clone(),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| canonicalize(item, opts))
                .filter(|item| !(opts.drop_null && item.is_null()))
                .collect(),
        ),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                let value = canonicalize(&map[key], opts);
                if opts.drop_null && value.is_null() {
                    continue;
                }
                out.insert(key.clone(), value);
            }
            Value::Object(out)
        }
    }
}

/// Canonicalize any serializable value.
///
/// Typed values go through their serde representation first, so e.g. a
/// timestamp type that serializes as a string is canonicalized as that
/// string. `None` fields skipped by serde are absent, never `null`.
pub fn canonicalize_serializable<T: Serialize + ?Sized>(
    input: &T,
    opts: CanonicalOptions,
) -> Result<Value> {
    let value = serde_json::to_value(input)
        .map_err(|e| SyncError::Internal(format!("value is not representable as JSON: {e}")))?;
    Ok(canonicalize(&value, opts))
}

/// Deterministic string form of `input`.
///
/// Keys are emitted in sorted order by this writer itself, so the output
/// does not depend on how `serde_json::Map` happens to order its entries.
pub fn stable_stringify(input: &Value, opts: CanonicalOptions) -> String {
    let canonical = canonicalize(input, opts);
    let mut out = String::new();
    write_canonical(&canonical, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_json_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

fn write_json_string(s: &str, out: &mut String) {
    // Serializing a &str cannot fail.
    out.push_str(&Value::String(s.to_owned()).to_string());
}

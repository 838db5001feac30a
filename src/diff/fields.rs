//! Recursive field-level diff over `serde_json::Value`.
//!
//! The diff returns the minimal changed subtree to send as a partial
//! update. Arrays are deliberately coarse: a length mismatch, or any
//! differing element at equal lengths, replaces the whole array. Downstream
//! consumers expect whole-array replacement semantics, so a positional
//! array diff would change the wire contract.

use serde_json::{Map, Value};

/// Compare two values and return the changed subtree, if any.
///
/// Returns `None` when the values are identical. For scalars and arrays the
/// changed subtree is the full current value; for maps it contains only the
/// keys that changed. Keys present only in `previous` map to `Value::Null`,
/// which clears the field on the remote side.
pub fn diff_value(current: &Value, previous: &Value) -> Option<Value> {
    match (current, previous) {
        (Value::Object(cur), Value::Object(prev)) => {
            diff_map(cur, prev).map(Value::Object)
        }
        (Value::Array(cur), Value::Array(prev)) => {
            if arrays_equal(cur, prev) {
                None
            } else {
                Some(Value::Array(cur.clone()))
            }
        }
        (cur, prev) => {
            if cur == prev {
                None
            } else {
                Some(cur.clone())
            }
        }
    }
}

/// Compare two attribute maps and return the changed keys, if any.
pub fn diff_map(current: &Map<String, Value>, previous: &Map<String, Value>) -> Option<Map<String, Value>> {
    let mut changed = Map::new();

    for (name, cur) in current {
        match previous.get(name) {
            Some(prev) => {
                if let Some(delta) = diff_value(cur, prev) {
                    changed.insert(name.clone(), delta);
                }
            }
            // New attribute: send it whole.
            None => {
                changed.insert(name.clone(), cur.clone());
            }
        }
    }

    // Attributes dropped from the current record are cleared explicitly.
    for name in previous.keys() {
        if !current.contains_key(name) {
            changed.insert(name.clone(), Value::Null);
        }
    }

    if changed.is_empty() { None } else { Some(changed) }
}

/// Element-wise array comparison, only meaningful at equal lengths.
fn arrays_equal(current: &[Value], previous: &[Value]) -> bool {
    current.len() == previous.len()
        && current
            .iter()
            .zip(previous)
            .all(|(cur, prev)| diff_value(cur, prev).is_none())
}

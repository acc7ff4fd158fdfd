//! JSON merge patch (RFC 7386) computation.
//!
//! The patch only carries what changed between two documents: nested objects
//! recurse, removed keys are nulled, anything else is replaced wholesale.
use serde_json::{Map, Value};

/// Merge patch turning `before` into `after`, or `None` when they are equal
pub fn merge_patch(before: &Value, after: &Value) -> Option<Value> {
    if before == after {
        return None;
    }
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut patch = Map::new();
            for (key, old) in b {
                match a.get(key) {
                    Some(new) => {
                        if let Some(p) = merge_patch(old, new) {
                            patch.insert(key.clone(), p);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                }
            }
            for (key, new) in a {
                if !b.contains_key(key) {
                    patch.insert(key.clone(), strip_nulls(new));
                }
            }
            if patch.is_empty() { None } else { Some(Value::Object(patch)) }
        }
        // a null inside an object in a merge patch means "remove", so it cannot be sent as a value
        (_, Value::Object(_)) => Some(strip_nulls(after)),
        _ => Some(after.clone()),
    }
}

fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Split a serialized object into its status and everything else
pub fn split_status(obj: &Value) -> (Value, Value) {
    match obj {
        Value::Object(map) => {
            let mut main = map.clone();
            let status = main.remove("status").unwrap_or(Value::Null);
            (Value::Object(main), status)
        }
        other => (other.clone(), Value::Null),
    }
}

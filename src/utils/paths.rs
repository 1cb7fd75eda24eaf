// src/utils/paths.rs

//! Dotted-path access into JSON value trees.
//!
//! Source-specific metadata is open-ended, so plugins address nested
//! fields with paths like `procedure.initiator` instead of poking raw
//! maps. Missing intermediate objects are created on write.

use serde_json::{Map, Value};

/// Look up a nested value by dotted path.
///
/// Returns `None` when any segment is missing or a non-object is
/// traversed into.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for segment in path.split('.') {
        cur = cur.as_object()?.get(segment)?;
    }
    Some(cur)
}

/// Set a nested value by dotted path, creating intermediate objects.
///
/// Returns `false` (and leaves the tree untouched from that point on)
/// when an existing intermediate value is not an object.
pub fn set_path(root: &mut Value, path: &str, value: Value) -> bool {
    let mut segments = path.split('.').peekable();
    let mut cur = root;

    while let Some(segment) = segments.next() {
        let map = match cur {
            Value::Object(map) => map,
            Value::Null => {
                *cur = Value::Object(Map::new());
                match cur {
                    Value::Object(map) => map,
                    _ => unreachable!(),
                }
            }
            _ => return false,
        };

        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return true;
        }

        cur = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_path_nested() {
        let value = json!({"a": {"b": {"c": 3}}});
        assert_eq!(get_path(&value, "a.b.c"), Some(&json!(3)));
        assert_eq!(get_path(&value, "a.b"), Some(&json!({"c": 3})));
        assert_eq!(get_path(&value, "a.x"), None);
        assert_eq!(get_path(&value, "a.b.c.d"), None);
    }

    #[test]
    fn set_path_creates_intermediates() {
        let mut value = json!({});
        assert!(set_path(&mut value, "a.b.c", json!(1)));
        assert_eq!(value, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn set_path_overwrites_leaf() {
        let mut value = json!({"a": {"b": 1}});
        assert!(set_path(&mut value, "a.b", json!(2)));
        assert_eq!(value, json!({"a": {"b": 2}}));
    }

    #[test]
    fn set_path_rejects_non_object_intermediate() {
        let mut value = json!({"a": 1});
        assert!(!set_path(&mut value, "a.b", json!(2)));
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn set_path_fills_null_intermediate() {
        let mut value = json!({"a": null});
        assert!(set_path(&mut value, "a.b", json!(2)));
        assert_eq!(value, json!({"a": {"b": 2}}));
    }
}

//! Index projections: which attributes an index query returns.
//!
//! Table and index key attributes are always kept, and so are the reserved
//! hierarchy attributes, so projected records still reconstruct.

use serde_json::{Map, Value};

use crate::api::filter::resolve_attr;
use crate::types::{Projection, RESERVED_ATTRS};

pub fn apply_projection(item: &Value, projection: &Projection, key_attrs: &[&str]) -> Value {
    let paths: &[String] = match projection {
        Projection::All => return item.clone(),
        Projection::KeysOnly => &[],
        Projection::Include(paths) => paths,
    };
    let Some(source) = item.as_object() else {
        return item.clone();
    };

    let mut result = Map::new();
    for &attr in key_attrs.iter().chain(RESERVED_ATTRS.iter()) {
        if let Some(value) = source.get(attr) {
            result.insert(attr.to_string(), value.clone());
        }
    }
    for path in paths {
        let value = resolve_attr(item, path);
        if !value.is_null() {
            set_nested(&mut result, path, value.clone());
        }
    }
    Value::Object(result)
}

fn set_nested(target: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            target.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = target
                .entry(head)
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(inner) = entry {
                set_nested(inner, rest, value);
            }
        }
    }
}

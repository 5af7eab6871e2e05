//! Update actions applied to a stored record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};
use crate::types::value_type_name;

/// One step of an update expression. Paths are dot-separated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateAction {
    /// Set the attribute, creating intermediate objects.
    Set { path: String, value: Value },
    /// Remove the attribute; missing paths are ignored.
    Remove { path: String },
    /// Increment a number or union into an array. Initializes a missing
    /// attribute to `value`.
    Add { path: String, value: Value },
    /// Subtract elements from an array, dropping the attribute when empty.
    Delete { path: String, value: Value },
}

impl UpdateAction {
    pub fn path(&self) -> &str {
        match self {
            UpdateAction::Set { path, .. }
            | UpdateAction::Remove { path }
            | UpdateAction::Add { path, .. }
            | UpdateAction::Delete { path, .. } => path,
        }
    }

    fn segments(&self) -> Vec<&str> {
        self.path().split('.').collect()
    }
}

/// Reject actions whose top-level attribute is in `protected`.
///
/// Callers pass the primary key, index key and reserved attribute names.
pub fn validate_no_key_updates(actions: &[UpdateAction], protected: &[&str]) -> Result<()> {
    for action in actions {
        let top_level = action.path().split('.').next().unwrap_or_default();
        if protected.contains(&top_level) {
            return Err(SchemaError::KeyAttributeUpdate(top_level.to_string()).into());
        }
    }
    Ok(())
}

/// Apply `actions` to `doc` in order.
pub fn apply_updates(doc: &mut Value, actions: &[UpdateAction]) -> Result<()> {
    for action in actions {
        let segments = action.segments();
        match action {
            UpdateAction::Set { value, .. } => set_path(doc, &segments, value.clone()),
            UpdateAction::Remove { .. } => remove_path(doc, &segments),
            UpdateAction::Add { path, value } => apply_add(doc, &segments, value, path)?,
            UpdateAction::Delete { path, value } => apply_delete(doc, &segments, value, path)?,
        }
    }
    Ok(())
}

fn set_path(doc: &mut Value, segments: &[&str], value: Value) {
    let Value::Object(map) = doc else {
        return;
    };
    match segments {
        [] => {}
        [leaf] => {
            map.insert(leaf.to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            set_path(entry, rest, value);
        }
    }
}

fn remove_path(doc: &mut Value, segments: &[&str]) {
    let Value::Object(map) = doc else {
        return;
    };
    match segments {
        [] => {}
        [leaf] => {
            map.remove(*leaf);
        }
        [head, rest @ ..] => {
            if let Some(child) = map.get_mut(*head) {
                remove_path(child, rest);
            }
        }
    }
}

fn get_path_mut<'a>(doc: &'a mut Value, segments: &[&str]) -> Option<&'a mut Value> {
    segments
        .iter()
        .try_fold(doc, |current, segment| current.as_object_mut()?.get_mut(*segment))
}

fn mismatch(path: &str, message: String) -> SchemaError {
    SchemaError::UpdateTypeMismatch {
        attribute: path.to_string(),
        message,
    }
}

fn apply_add(doc: &mut Value, segments: &[&str], value: &Value, path: &str) -> Result<()> {
    let Some(existing) = get_path_mut(doc, segments) else {
        if !value.is_number() && !value.is_array() {
            return Err(mismatch(
                path,
                format!("ADD requires a number or array, got {}", value_type_name(value)),
            )
            .into());
        }
        set_path(doc, segments, value.clone());
        return Ok(());
    };

    match (&mut *existing, value) {
        (Value::Number(a), Value::Number(b)) => {
            let sum = match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x.checked_add(y).map(Value::from),
                _ => None,
            };
            let sum = match sum {
                Some(sum) => sum,
                None => {
                    let x = a.as_f64().unwrap_or_default();
                    let y = b.as_f64().unwrap_or_default();
                    Value::from(x + y)
                }
            };
            *existing = sum;
            Ok(())
        }
        (Value::Array(items), Value::Array(additions)) => {
            for item in additions {
                if !items.contains(item) {
                    items.push(item.clone());
                }
            }
            Ok(())
        }
        (current, _) => Err(mismatch(
            path,
            format!(
                "ADD requires two numbers or two arrays, got existing={}, value={}",
                value_type_name(current),
                value_type_name(value)
            ),
        )
        .into()),
    }
}

fn apply_delete(doc: &mut Value, segments: &[&str], value: &Value, path: &str) -> Result<()> {
    let Value::Array(removals) = value else {
        return Err(mismatch(
            path,
            format!("DELETE requires an array, got {}", value_type_name(value)),
        )
        .into());
    };
    let Some(existing) = get_path_mut(doc, segments) else {
        return Ok(());
    };
    let emptied = match existing {
        Value::Array(items) => {
            items.retain(|item| !removals.contains(item));
            items.is_empty()
        }
        other => {
            return Err(mismatch(
                path,
                format!(
                    "DELETE requires an existing array, got {}",
                    value_type_name(other)
                ),
            )
            .into());
        }
    };
    if emptied {
        remove_path(doc, segments);
    }
    Ok(())
}

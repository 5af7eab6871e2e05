//! Conversion between entities and flat stored records.
//!
//! A record carries the entity's own attributes with child fields removed,
//! the computed index attributes at the top level, the type tag and, for
//! children, the parent id and parent field name.

use serde_json::{Map, Value};

use crate::catalog::EntityDescriptor;
use crate::entity::{Node, ParentLink};
use crate::error::{HierarchyError, Result, SchemaError};
use crate::types::{KEYS_FIELD, PARENT_FIELD_ATTR, PARENT_ID_ATTR, TYPE_ATTR};

/// Build the flat record stored for `node`.
pub fn to_record(node: &dyn Node, descriptor: &EntityDescriptor) -> Result<Value> {
    let Value::Object(mut fields) = node.to_json()? else {
        return Err(HierarchyError::MalformedRecord(format!(
            "'{}' did not serialize to an object",
            descriptor.type_tag
        ))
        .into());
    };
    for child in descriptor.child_fields {
        fields.remove(child.name);
    }
    fields.remove(KEYS_FIELD);

    let meta = node.entity_meta();
    for (name, value) in meta.index_keys() {
        if let Some(own) = fields.get(name)
            && own != value
        {
            return Err(SchemaError::IndexAttributeConflict {
                entity: descriptor.type_tag.to_string(),
                attribute: name.clone(),
            }
            .into());
        }
        fields.insert(name.clone(), value.clone());
    }
    fields.insert(TYPE_ATTR.to_string(), Value::from(descriptor.type_tag));
    if let Some(parent) = meta.parent() {
        fields.insert(PARENT_ID_ATTR.to_string(), Value::from(parent.id.as_str()));
        fields.insert(PARENT_FIELD_ATTR.to_string(), Value::from(parent.field.as_str()));
    }
    Ok(Value::Object(fields))
}

/// A stored record split back into its entity body and reserved metadata.
#[derive(Debug, Clone)]
pub struct RecordParts {
    pub id: String,
    pub type_tag: String,
    pub parent: Option<ParentLink>,
    /// Entity JSON, with index attributes also collected under `__keys`.
    pub body: Map<String, Value>,
}

/// Split a stored record. `index_attrs` names the physical index attributes
/// to collect into the entity's computed keys. They stay in the body too,
/// since an index attribute may double as one of the entity's own fields.
pub fn split_record(record: Value, index_attrs: &[&str]) -> Result<RecordParts> {
    let Value::Object(mut body) = record else {
        return Err(HierarchyError::MalformedRecord("record is not an object".into()).into());
    };
    let id = match body.get("id") {
        Some(Value::String(id)) => id.clone(),
        _ => {
            return Err(HierarchyError::MalformedRecord("record has no string id".into()).into());
        }
    };
    let type_tag = match body.remove(TYPE_ATTR) {
        Some(Value::String(tag)) => tag,
        _ => {
            return Err(
                HierarchyError::MalformedRecord(format!("record '{id}' has no type tag")).into(),
            );
        }
    };
    let parent_id = body.remove(PARENT_ID_ATTR);
    let parent_field = body.remove(PARENT_FIELD_ATTR);
    let parent = match (parent_id, parent_field) {
        (Some(Value::String(id)), Some(Value::String(field))) => Some(ParentLink { id, field }),
        (None | Some(Value::Null), None | Some(Value::Null)) => None,
        _ => {
            return Err(HierarchyError::MalformedRecord(format!(
                "record '{id}' has an incomplete parent reference"
            ))
            .into());
        }
    };

    let mut keys = Map::new();
    for &attr in index_attrs {
        if let Some(value) = body.get(attr) {
            keys.insert(attr.to_string(), value.clone());
        }
    }
    if !keys.is_empty() {
        body.insert(KEYS_FIELD.to_string(), Value::Object(keys));
    }

    Ok(RecordParts {
        id,
        type_tag,
        parent,
        body,
    })
}

//! Partition and sort key derivation for one entity.
//!
//! Partition keys are inherited verbatim from the parent so that a whole
//! tree shares one partition. Sort keys are materialized paths: the
//! parent's sort key, the type tag, then the entity's own sort fields,
//! joined with the table delimiter.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::catalog::EntityDescriptor;
use crate::config::TableConfig;
use crate::entity::IndexFields;
use crate::error::SchemaError;
use crate::types::{KeyType, SecondaryIndex, TYPE_ATTR, value_type_name};

/// Compute the physical index attributes of one entity.
///
/// `fields` is the entity's serialized form and `parent_keys` the already
/// computed attributes of its parent, if any. Indexes the entity does not
/// declare are left out.
pub fn compute_index_keys(
    config: &TableConfig,
    descriptor: &EntityDescriptor,
    fields: &Map<String, Value>,
    parent_keys: Option<&BTreeMap<String, Value>>,
) -> Result<BTreeMap<String, Value>, SchemaError> {
    let mut keys = BTreeMap::new();
    for index in &config.indexes {
        let Some(roles) = descriptor.indexes.get(&index.name) else {
            continue;
        };
        let source = KeySource {
            config,
            descriptor,
            index,
            roles,
            fields,
        };
        let Some(partition) = source.partition_key(parent_keys)? else {
            continue;
        };
        let sort = source.sort_key(parent_keys)?;
        keys.insert(index.partition_key.name.clone(), partition);
        keys.insert(index.sort_key.name.clone(), sort);
    }
    Ok(keys)
}

struct KeySource<'a> {
    config: &'a TableConfig,
    descriptor: &'a EntityDescriptor,
    index: &'a SecondaryIndex,
    roles: &'a IndexFields,
    fields: &'a Map<String, Value>,
}

impl KeySource<'_> {
    fn field(&self, name: &str) -> Value {
        if name == TYPE_ATTR {
            return Value::String(self.descriptor.type_tag.to_string());
        }
        self.fields.get(name).cloned().unwrap_or(Value::Null)
    }

    fn hash_key_error(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::IncorrectHashKey {
            entity: self.descriptor.type_tag.to_string(),
            index: self.index.name.clone(),
            reason: reason.into(),
        }
    }

    fn partition_key(
        &self,
        parent_keys: Option<&BTreeMap<String, Value>>,
    ) -> Result<Option<Value>, SchemaError> {
        let key = &self.index.partition_key;
        if let Some(inherited) = parent_keys.and_then(|keys| keys.get(&key.name)) {
            return Ok(Some(inherited.clone()));
        }

        let pk_fields = self.roles.pk_fields();
        if pk_fields.is_empty() {
            if self.descriptor.nested {
                return Ok(None);
            }
            return Err(self.hash_key_error("no partition key fields are declared"));
        }

        let mut values = Vec::with_capacity(pk_fields.len());
        for name in pk_fields {
            let value = self.field(name);
            if is_empty(&value) {
                return Err(self.hash_key_error(format!("field '{name}' has no value")));
            }
            values.push(value);
        }

        if key.key_type == KeyType::String {
            let parts: Vec<String> = values.iter().map(render).collect();
            return Ok(Some(Value::String(parts.join(self.config.delimiter.as_str()))));
        }
        match values.as_slice() {
            [value] if key.key_type.accepts(value) => Ok(Some(value.clone())),
            [value] => Err(self.hash_key_error(format!(
                "expected {}, got {}",
                key.key_type,
                value_type_name(value)
            ))),
            _ => Err(self.hash_key_error(format!(
                "{} partition key fields need a string key, found {}",
                values.len(),
                key.key_type
            ))),
        }
    }

    fn sort_key(&self, parent_keys: Option<&BTreeMap<String, Value>>) -> Result<Value, SchemaError> {
        let key = &self.index.sort_key;
        let sk_fields = self
            .roles
            .ordered_sort_fields(self.descriptor.type_tag, &self.index.name)?;

        if let [name] = sk_fields.as_slice()
            && key.key_type != KeyType::String
        {
            let mut value = self.field(name);
            if is_empty(&value)
                && let Some(default) = &key.default
            {
                value = default.clone();
            }
            if !key.key_type.accepts(&value) {
                return Err(SchemaError::IncorrectSortKey {
                    entity: self.descriptor.type_tag.to_string(),
                    index: self.index.name.clone(),
                    expected: key.key_type,
                    actual: value_type_name(&value).to_string(),
                });
            }
            return Ok(value);
        }

        let mut parts = Vec::with_capacity(sk_fields.len() + 2);
        if let Some(parent_sort) = parent_keys.and_then(|keys| keys.get(&key.name)) {
            parts.push(render(parent_sort));
        }
        if self.descriptor.include_type_in_sort_key
            && !self.roles.type_is_pk_field()
            && !self.roles.type_is_sk_field()
        {
            parts.push(self.descriptor.type_tag.to_string());
        }
        for name in sk_fields {
            let mut value = self.field(name);
            if is_empty(&value)
                && let Some(default) = &key.default
            {
                value = default.clone();
            }
            parts.push(render(&value));
        }
        Ok(Value::String(parts.join(self.config.delimiter.as_str())))
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Text form of a key component.
fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

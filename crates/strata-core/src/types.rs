//! Key, index and table schema types shared by every layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::StoreError;

/// Reserved attribute holding an entity's type tag.
///
/// Also usable as a field name inside index definitions, where it resolves
/// to the entity's type instead of an attribute.
pub const TYPE_ATTR: &str = "__type";
/// Reserved attribute holding the id of the owning entity.
pub const PARENT_ID_ATTR: &str = "__parent_id";
/// Reserved attribute holding the name of the owning field.
pub const PARENT_FIELD_ATTR: &str = "__parent_field";
/// Serialized name of the computed index-key map on an entity.
pub const KEYS_FIELD: &str = "__keys";

pub const DEFAULT_DELIMITER: &str = "|";
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_INDEX_NAME: &str = "main-index";
pub const DEFAULT_PARTITION_KEY: &str = "id";

/// Maximum encoded size of a stored item (400 KB).
pub const MAX_DOCUMENT_SIZE: usize = 400 * 1024;

pub const RESERVED_ATTRS: [&str; 4] = [TYPE_ATTR, PARENT_ID_ATTR, PARENT_FIELD_ATTR, KEYS_FIELD];

/// Type of a partition or sort key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

impl KeyType {
    /// Whether `value` is acceptable for an attribute of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            KeyType::String => value.is_string(),
            KeyType::Integer => value.is_i64() || value.is_u64(),
            KeyType::Float => value.is_number(),
            KeyType::Boolean => value.is_boolean(),
            KeyType::Timestamp => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyType::String => "string",
            KeyType::Integer => "integer",
            KeyType::Float => "float",
            KeyType::Boolean => "boolean",
            KeyType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// Human-readable name of a JSON value's type.
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One physical attribute used as a partition or sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub name: String,
    #[serde(rename = "type", default = "default_key_type")]
    pub key_type: KeyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn default_key_type() -> KeyType {
    KeyType::String
}

impl Key {
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
            default: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, KeyType::String)
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Which attributes a secondary index copies from the base item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    #[default]
    All,
    KeysOnly,
    Include(Vec<String>),
}

/// A global secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryIndex {
    pub name: String,
    pub partition_key: Key,
    pub sort_key: Key,
    #[serde(default)]
    pub projection: Projection,
}

impl SecondaryIndex {
    pub fn new(name: impl Into<String>, partition_key: Key, sort_key: Key) -> Self {
        Self {
            name: name.into(),
            partition_key,
            sort_key,
            projection: Projection::All,
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }
}

/// Primary key of the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeySchema {
    pub partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<String>,
}

impl KeySchema {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names = vec![self.partition_key.as_str()];
        names.extend(self.sort_key.as_deref());
        names
    }
}

impl Default for KeySchema {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITION_KEY)
    }
}

/// Everything a store needs to provision a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub key_schema: KeySchema,
    pub indexes: Vec<SecondaryIndex>,
}

/// Primary key of one stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemKey {
    pub partition: Value,
    pub sort: Option<Value>,
}

impl ItemKey {
    pub fn new(partition: impl Into<Value>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    pub fn with_sort(mut self, sort: impl Into<Value>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Extract the primary key of `record` according to `schema`.
    pub fn from_record(record: &Value, schema: &KeySchema) -> Result<Self, StoreError> {
        let partition = record
            .get(&schema.partition_key)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| StoreError::MissingKeyAttribute(schema.partition_key.clone()))?;
        let sort = match &schema.sort_key {
            Some(name) => Some(
                record
                    .get(name)
                    .filter(|v| !v.is_null())
                    .cloned()
                    .ok_or_else(|| StoreError::MissingKeyAttribute(name.clone()))?,
            ),
            None => None,
        };
        Ok(Self { partition, sort })
    }

    /// Stable string form, used for set membership and map ordering.
    pub fn canonical(&self) -> String {
        match &self.sort {
            Some(sort) => json!([self.partition, sort]).to_string(),
            None => json!([self.partition]).to_string(),
        }
    }

    /// Render as an attribute map named per `schema`.
    pub fn to_value(&self, schema: &KeySchema) -> Value {
        let mut map = Map::new();
        map.insert(schema.partition_key.clone(), self.partition.clone());
        if let (Some(name), Some(sort)) = (&schema.sort_key, &self.sort) {
            map.insert(name.clone(), sort.clone());
        }
        Value::Object(map)
    }
}

//! Table configuration: primary key, secondary indexes and write limits.
//!
//! A [`TableConfig`] is either assembled with [`TableConfig::builder`] or
//! deserialized from JSON. Both paths end in [`TableConfig::validate`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::types::{
    DEFAULT_DELIMITER, DEFAULT_MAX_BATCH_SIZE, KeySchema, RESERVED_ATTRS, SecondaryIndex,
    TableSchema,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub key_schema: KeySchema,
    #[serde(default)]
    pub indexes: Vec<SecondaryIndex>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

impl TableConfig {
    pub fn builder(name: impl Into<String>) -> TableConfigBuilder {
        TableConfigBuilder {
            config: TableConfig {
                name: name.into(),
                key_schema: KeySchema::default(),
                indexes: Vec::new(),
                delimiter: default_delimiter(),
                max_batch_size: default_max_batch_size(),
            },
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TableConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SchemaError::InvalidConfig("table name is empty".into()).into());
        }
        if self.delimiter.is_empty() {
            return Err(SchemaError::InvalidConfig("delimiter is empty".into()).into());
        }
        if self.max_batch_size == 0 {
            return Err(SchemaError::InvalidConfig("max_batch_size must be positive".into()).into());
        }
        let mut seen = HashSet::new();
        for index in &self.indexes {
            if !seen.insert(index.name.as_str()) {
                return Err(SchemaError::DuplicateIndex(index.name.clone()).into());
            }
            for attr in [&index.partition_key.name, &index.sort_key.name] {
                if RESERVED_ATTRS.contains(&attr.as_str()) {
                    return Err(SchemaError::InvalidConfig(format!(
                        "index '{}' uses reserved attribute '{attr}'",
                        index.name
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Resolve an index by name; `None` selects the first declared index.
    pub fn index(&self, name: Option<&str>) -> Result<&SecondaryIndex> {
        let found = match name {
            Some(name) => self.indexes.iter().find(|idx| idx.name == name),
            None => self.indexes.first(),
        };
        found.ok_or_else(|| {
            SchemaError::InvalidIndexName(name.unwrap_or_default().to_string()).into()
        })
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|idx| idx.name == name)
    }

    /// Physical attribute names of every configured index key.
    pub fn index_attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.indexes.len() * 2);
        for index in &self.indexes {
            for name in [index.partition_key.name.as_str(), index.sort_key.name.as_str()] {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn schema(&self) -> TableSchema {
        TableSchema {
            name: self.name.clone(),
            key_schema: self.key_schema.clone(),
            indexes: self.indexes.clone(),
        }
    }
}

pub struct TableConfigBuilder {
    config: TableConfig,
}

impl TableConfigBuilder {
    pub fn key_schema(mut self, key_schema: KeySchema) -> Self {
        self.config.key_schema = key_schema;
        self
    }

    pub fn index(mut self, index: SecondaryIndex) -> Self {
        self.config.indexes.push(index);
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.config.delimiter = delimiter.into();
        self
    }

    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.config.max_batch_size = max_batch_size;
        self
    }

    pub fn build(self) -> Result<TableConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

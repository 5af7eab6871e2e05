//! Index-field roles: which entity fields feed each index's keys.

use std::collections::{BTreeMap, HashSet};

use crate::error::SchemaError;
use crate::types::TYPE_ATTR;

/// A sort-key source field with an optional explicit position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub name: String,
    pub order: Option<u32>,
}

/// Partition and sort key sources for one index.
///
/// Field names refer to serialized attribute names. [`TYPE_ATTR`] stands for
/// the entity's type tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexFields {
    pk_fields: Vec<String>,
    sk_fields: Vec<SortField>,
}

impl IndexFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pk(mut self, field: impl Into<String>) -> Self {
        self.pk_fields.push(field.into());
        self
    }

    pub fn sk(mut self, field: impl Into<String>) -> Self {
        self.sk_fields.push(SortField {
            name: field.into(),
            order: None,
        });
        self
    }

    pub fn sk_ordered(mut self, field: impl Into<String>, order: u32) -> Self {
        self.sk_fields.push(SortField {
            name: field.into(),
            order: Some(order),
        });
        self
    }

    pub fn pk_fields(&self) -> &[String] {
        &self.pk_fields
    }

    pub fn sk_fields(&self) -> &[SortField] {
        &self.sk_fields
    }

    pub fn type_is_pk_field(&self) -> bool {
        self.pk_fields.iter().any(|f| f == TYPE_ATTR)
    }

    pub fn type_is_sk_field(&self) -> bool {
        self.sk_fields.iter().any(|f| f.name == TYPE_ATTR)
    }

    /// Prepend the type tag to the partition key sources unless present.
    pub(crate) fn with_type_partition(mut self) -> Self {
        if !self.type_is_pk_field() {
            self.pk_fields.insert(0, TYPE_ATTR.to_string());
        }
        self
    }

    /// Sort-key field names in their effective order.
    ///
    /// Either every field declares a unique `order` or none does, in which
    /// case declaration order applies.
    pub fn ordered_sort_fields(&self, entity: &str, index: &str) -> Result<Vec<&str>, SchemaError> {
        let ordered = self.sk_fields.iter().filter(|f| f.order.is_some()).count();
        if ordered == 0 {
            return Ok(self.sk_fields.iter().map(|f| f.name.as_str()).collect());
        }
        let order_error = |reason: String| SchemaError::SortKeyOrder {
            entity: entity.to_string(),
            index: index.to_string(),
            reason,
        };
        if ordered != self.sk_fields.len() {
            return Err(order_error(format!(
                "{ordered} of {} sort key fields declare an order",
                self.sk_fields.len()
            )));
        }
        let mut seen = HashSet::new();
        let mut fields: Vec<(u32, &str)> = Vec::with_capacity(self.sk_fields.len());
        for field in &self.sk_fields {
            let order = field.order.unwrap_or_default();
            if !seen.insert(order) {
                return Err(order_error(format!("order {order} is declared more than once")));
            }
            fields.push((order, field.name.as_str()));
        }
        fields.sort_by_key(|(order, _)| *order);
        Ok(fields.into_iter().map(|(_, name)| name).collect())
    }
}

/// Per-index field roles of an entity type, keyed by index name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDefinitions {
    indexes: BTreeMap<String, IndexFields>,
}

impl IndexDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(mut self, name: impl Into<String>, fields: IndexFields) -> Self {
        self.indexes.insert(name.into(), fields);
        self
    }

    pub fn get(&self, name: &str) -> Option<&IndexFields> {
        self.indexes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexFields)> {
        self.indexes.iter().map(|(name, fields)| (name.as_str(), fields))
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub(crate) fn with_type_partition(self) -> Self {
        Self {
            indexes: self
                .indexes
                .into_iter()
                .map(|(name, fields)| (name, fields.with_type_partition()))
                .collect(),
        }
    }

    /// Check the sort-key ordering rules of every index.
    pub fn validate(&self, entity: &str) -> Result<(), SchemaError> {
        for (name, fields) in &self.indexes {
            fields.ordered_sort_fields(entity, name)?;
        }
        Ok(())
    }
}

//! Key conditions for partition and sort key attributes.

use serde_json::Value;

use super::filter::FilterExpr;

/// A condition on one key attribute of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyCondition {
    Equals(Value),
    BeginsWith(String),
    LessThan(Value),
    GreaterThan(Value),
    LessThanOrEqual(Value),
    GreaterThanOrEqual(Value),
    Between(Value, Value),
}

impl KeyCondition {
    pub fn equals(value: impl Into<Value>) -> Self {
        KeyCondition::Equals(value.into())
    }

    pub fn begins_with(prefix: impl Into<String>) -> Self {
        KeyCondition::BeginsWith(prefix.into())
    }

    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        KeyCondition::Between(low.into(), high.into())
    }

    /// Lower the condition to a predicate over attribute `attr`.
    pub fn evaluate(&self, attr: &str) -> FilterExpr {
        match self {
            KeyCondition::Equals(v) => FilterExpr::eq(attr, v.clone()),
            KeyCondition::BeginsWith(prefix) => FilterExpr::begins_with(attr, prefix.clone()),
            KeyCondition::LessThan(v) => FilterExpr::lt(attr, v.clone()),
            KeyCondition::GreaterThan(v) => FilterExpr::gt(attr, v.clone()),
            KeyCondition::LessThanOrEqual(v) => FilterExpr::le(attr, v.clone()),
            KeyCondition::GreaterThanOrEqual(v) => FilterExpr::ge(attr, v.clone()),
            KeyCondition::Between(low, high) => FilterExpr::between(attr, low.clone(), high.clone()),
        }
    }

    /// Scope a `BeginsWith` prefix to an entity type's sort key range.
    ///
    /// Prefixes already starting with the type tag are left alone; other
    /// conditions are returned unchanged.
    pub fn enrich(self, type_tag: &str, delimiter: &str) -> Self {
        match self {
            KeyCondition::BeginsWith(prefix) if !prefix.starts_with(type_tag) => {
                KeyCondition::BeginsWith(format!("{type_tag}{delimiter}{prefix}"))
            }
            other => other,
        }
    }

    /// The value of an `Equals` condition.
    pub fn as_equality(&self) -> Option<&Value> {
        match self {
            KeyCondition::Equals(v) => Some(v),
            _ => None,
        }
    }
}

//! Filter expressions evaluated against stored records.
//!
//! Filters run after key-based retrieval, before items reach the caller,
//! and are serializable so a store can ship them to a remote engine.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FilterError;

/// Maximum nesting depth of boolean combinators.
const MAX_EXPRESSION_DEPTH: usize = 16;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ordering: Option<Ordering>) -> bool {
        match self {
            CompareOp::Eq => ordering == Some(Ordering::Equal),
            CompareOp::Ne => ordering != Some(Ordering::Equal),
            CompareOp::Lt => ordering == Some(Ordering::Less),
            CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Gt => ordering == Some(Ordering::Greater),
            CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

/// A predicate over one record. Attribute names may be dot-separated paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    Compare {
        attr: String,
        op: CompareOp,
        value: Value,
    },
    Between {
        attr: String,
        low: Value,
        high: Value,
    },
    BeginsWith {
        attr: String,
        prefix: String,
    },
    /// Substring of a string attribute, or member of an array attribute.
    Contains {
        attr: String,
        value: Value,
    },
    Exists(String),
    NotExists(String),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    pub fn eval(&self, doc: &Value) -> Result<bool, FilterError> {
        self.eval_at(doc, 0)
    }

    fn eval_at(&self, doc: &Value, depth: usize) -> Result<bool, FilterError> {
        if depth > MAX_EXPRESSION_DEPTH {
            return Err(FilterError::InvalidExpression(format!(
                "expression depth exceeds maximum of {MAX_EXPRESSION_DEPTH}"
            )));
        }
        let passes = match self {
            FilterExpr::Compare { attr, op, value } => {
                op.holds(compare_values(resolve_attr(doc, attr), value))
            }
            FilterExpr::Between { attr, low, high } => {
                let current = resolve_attr(doc, attr);
                CompareOp::Ge.holds(compare_values(current, low))
                    && CompareOp::Le.holds(compare_values(current, high))
            }
            FilterExpr::BeginsWith { attr, prefix } => resolve_attr(doc, attr)
                .as_str()
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            FilterExpr::Contains { attr, value } => match (resolve_attr(doc, attr), value) {
                (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
                (Value::Array(items), needle) => items.contains(needle),
                _ => false,
            },
            FilterExpr::Exists(attr) => !resolve_attr(doc, attr).is_null(),
            FilterExpr::NotExists(attr) => resolve_attr(doc, attr).is_null(),
            FilterExpr::And(exprs) => {
                for expr in exprs {
                    if !expr.eval_at(doc, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            FilterExpr::Or(exprs) => {
                for expr in exprs {
                    if expr.eval_at(doc, depth + 1)? {
                        return Ok(true);
                    }
                }
                false
            }
            FilterExpr::Not(expr) => !expr.eval_at(doc, depth + 1)?,
        };
        Ok(passes)
    }

    fn compare(attr: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        FilterExpr::Compare {
            attr: attr.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attr, CompareOp::Eq, value)
    }

    pub fn ne(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attr, CompareOp::Ne, value)
    }

    pub fn lt(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attr, CompareOp::Lt, value)
    }

    pub fn le(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attr, CompareOp::Le, value)
    }

    pub fn gt(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attr, CompareOp::Gt, value)
    }

    pub fn ge(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attr, CompareOp::Ge, value)
    }

    pub fn between(
        attr: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        FilterExpr::Between {
            attr: attr.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn begins_with(attr: impl Into<String>, prefix: impl Into<String>) -> Self {
        FilterExpr::BeginsWith {
            attr: attr.into(),
            prefix: prefix.into(),
        }
    }

    pub fn contains(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Contains {
            attr: attr.into(),
            value: value.into(),
        }
    }

    pub fn exists(attr: impl Into<String>) -> Self {
        FilterExpr::Exists(attr.into())
    }

    pub fn not_exists(attr: impl Into<String>) -> Self {
        FilterExpr::NotExists(attr.into())
    }

    pub fn and(exprs: Vec<FilterExpr>) -> Self {
        FilterExpr::And(exprs)
    }

    pub fn or(exprs: Vec<FilterExpr>) -> Self {
        FilterExpr::Or(exprs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: FilterExpr) -> Self {
        FilterExpr::Not(Box::new(expr))
    }
}

/// Resolve a dot-separated attribute path; missing segments yield `Null`.
pub fn resolve_attr<'a>(doc: &'a Value, path: &str) -> &'a Value {
    path.split('.')
        .try_fold(doc, |current, segment| current.get(segment))
        .unwrap_or(&NULL)
}

/// Order two values of the same kind. Integers compare exactly, other
/// numbers as f64; mismatched kinds are incomparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

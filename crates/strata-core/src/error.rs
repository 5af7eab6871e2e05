//! Error types for all Strata operations.

use thiserror::Error;

use crate::types::KeyType;

/// Top-level error type for Strata operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration errors. Raised synchronously and never retried.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("The provided index name '{0}' is not configured on the table.")]
    InvalidIndexName(String),

    #[error("incorrect hash key for '{entity}' on index '{index}': {reason}")]
    IncorrectHashKey {
        entity: String,
        index: String,
        reason: String,
    },

    #[error(
        "incorrect sort key for '{entity}' on index '{index}': expected {expected}, got {actual}"
    )]
    IncorrectSortKey {
        entity: String,
        index: String,
        expected: KeyType,
        actual: String,
    },

    #[error("invalid sort key order for '{entity}' on index '{index}': {reason}")]
    SortKeyOrder {
        entity: String,
        index: String,
        reason: String,
    },

    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("duplicate index name: {0}")]
    DuplicateIndex(String),

    #[error("invalid table configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot update key attribute '{0}'")]
    KeyAttributeUpdate(String),

    #[error("type mismatch on '{attribute}': {message}")]
    UpdateTypeMismatch { attribute: String, message: String },

    #[error("index attribute '{attribute}' conflicts with a field of '{entity}'")]
    IndexAttributeConflict { entity: String, attribute: String },

    #[error("type tag '{0}' is already registered for a different type")]
    DuplicateTypeTag(String),
}

/// Structural errors while linking, reparenting or reconstructing trees.
#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("multiple root records found: {}", ids.join(", "))]
    MultipleRoots { ids: Vec<String> },

    #[error("field '{field}' of '{parent}' holds a single entity but {count} records claim it")]
    AmbiguousChild {
        parent: String,
        field: String,
        count: usize,
    },

    #[error("no child '{id}' in field '{field}'")]
    ChildNotFound { field: String, id: String },

    #[error("'{0}' is not a nested entity and cannot be attached to a parent")]
    NotNested(String),

    #[error("'{0}' is a nested entity and can only be written through its root")]
    NestedRoot(String),

    #[error("expected a root of type '{expected}', found '{actual}'")]
    UnexpectedRootType { expected: String, actual: String },

    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

/// Errors reported by a [`Store`](crate::store::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("record is missing key attribute '{0}'")]
    MissingKeyAttribute(String),

    #[error("document exceeds maximum size of {max} bytes (got {actual})")]
    DocumentTooLarge { max: usize, actual: usize },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("batch write made no progress with {remaining} items outstanding")]
    BatchStalled { remaining: usize },

    #[error("partition key condition must be an equality")]
    PartitionConditionNotEquality,
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter expression: {0}")]
    InvalidExpression(String),
}

pub type Result<T> = std::result::Result<T, Error>;

//! The key/value store boundary.
//!
//! A [`Store`] is an item store with a primary key, sparse secondary
//! indexes, paginated query and scan, and batch writes that may leave items
//! unprocessed. [`MemoryStore`] is the in-process implementation.

pub mod memory;
pub mod projection;

use serde_json::Value;

use crate::api::condition::KeyCondition;
use crate::api::filter::FilterExpr;
use crate::api::update::UpdateAction;
use crate::error::Result;
use crate::types::{ItemKey, TableSchema};

pub use memory::{MemoryStore, StoreStats};

/// One condition on a named key attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyClause {
    pub attribute: String,
    pub condition: KeyCondition,
}

impl KeyClause {
    pub fn new(attribute: impl Into<String>, condition: KeyCondition) -> Self {
        Self {
            attribute: attribute.into(),
            condition,
        }
    }
}

/// A single-partition range read, against the table or one of its indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// `None` queries the table's primary key.
    pub index_name: Option<String>,
    /// Must be an [`KeyCondition::Equals`].
    pub partition: KeyClause,
    pub sort: Option<KeyClause>,
    pub filter: Option<FilterExpr>,
    pub consistent_read: bool,
    /// Maximum number of items evaluated for this page, before filtering.
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Value>,
}

impl QueryRequest {
    pub fn new(partition: KeyClause) -> Self {
        Self {
            index_name: None,
            partition,
            sort: None,
            filter: None,
            consistent_read: false,
            limit: None,
            exclusive_start_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    pub filter: Option<FilterExpr>,
    pub consistent_read: bool,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Value>,
}

/// One page of query or scan results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    /// Continuation token; `None` on the last page.
    pub last_evaluated_key: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(Value),
    Delete(ItemKey),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWriteOutput {
    /// Requests the store did not apply; the caller resubmits them.
    pub unprocessed: Vec<WriteRequest>,
}

pub trait Store {
    fn create_table(&self, schema: &TableSchema) -> Result<()>;

    fn delete_table(&self, name: &str) -> Result<()>;

    fn get_item(&self, table: &str, key: &ItemKey, consistent_read: bool)
    -> Result<Option<Value>>;

    fn put_item(&self, table: &str, item: Value) -> Result<()>;

    /// Deleting a missing item is not an error.
    fn delete_item(&self, table: &str, key: &ItemKey) -> Result<()>;

    fn batch_write(&self, table: &str, requests: Vec<WriteRequest>) -> Result<BatchWriteOutput>;

    /// Found items, in no particular order.
    fn batch_get(&self, table: &str, keys: &[ItemKey]) -> Result<Vec<Value>>;

    fn query(&self, table: &str, request: &QueryRequest) -> Result<Page>;

    fn scan(&self, table: &str, request: &ScanRequest) -> Result<Page>;

    /// Apply `actions` to the item, creating it from its key when absent,
    /// and return the updated item.
    fn update_item(&self, table: &str, key: &ItemKey, actions: &[UpdateAction]) -> Result<Value>;
}

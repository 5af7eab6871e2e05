//! In-process [`Store`] backed by ordered maps of MessagePack-encoded items.
//!
//! Items are ordered by sort key, then by primary key, within every query
//! and scan. Pages are cut after `page_size` evaluated items; filters apply
//! to the evaluated items afterwards, so a page may come back short or
//! empty while still carrying a continuation key.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::debug;

use super::projection::apply_projection;
use super::{BatchWriteOutput, Page, QueryRequest, ScanRequest, Store, WriteRequest};
use crate::api::filter::{FilterExpr, compare_values, resolve_attr};
use crate::api::update::{UpdateAction, apply_updates, validate_no_key_updates};
use crate::error::{Result, SchemaError, StoreError};
use crate::types::{ItemKey, KeySchema, MAX_DOCUMENT_SIZE, Projection, TableSchema};

/// Items evaluated per page when the request sets no smaller limit.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Call counters, for observing how a caller drives the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub get_calls: usize,
    pub batch_write_calls: usize,
    pub query_calls: usize,
    pub scan_calls: usize,
}

struct MemoryTable {
    schema: TableSchema,
    /// Canonical primary key to encoded item.
    items: BTreeMap<String, Vec<u8>>,
}

impl MemoryTable {
    fn key_of(&self, item: &Value) -> Result<ItemKey> {
        Ok(ItemKey::from_record(item, &self.schema.key_schema)?)
    }

    fn put(&mut self, item: &Value) -> Result<()> {
        let key = self.key_of(item)?;
        self.items.insert(key.canonical(), encode(item)?);
        Ok(())
    }

    fn get(&self, key: &ItemKey) -> Result<Option<Value>> {
        self.items
            .get(&key.canonical())
            .map(|bytes| decode(bytes))
            .transpose()
    }

    fn decoded(&self) -> Result<Vec<Value>> {
        self.items.values().map(|bytes| decode(bytes)).collect()
    }
}

pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, MemoryTable>>,
    page_size: usize,
    write_capacity: Option<usize>,
    stats: Mutex<StoreStats>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            write_capacity: None,
            stats: Mutex::new(StoreStats::default()),
        }
    }

    /// Cap the items evaluated per query or scan page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Apply at most `capacity` requests per batch write and hand the rest
    /// back as unprocessed, the way a throttled store does.
    pub fn with_write_capacity(mut self, capacity: usize) -> Self {
        self.write_capacity = Some(capacity);
        self
    }

    pub fn stats(&self) -> StoreStats {
        *self.stats.lock()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = StoreStats::default();
    }

    /// Every stored item of `table`, in primary key order.
    pub fn items(&self, table: &str) -> Result<Vec<Value>> {
        self.with_table(table, MemoryTable::decoded)
    }

    pub fn item_count(&self, table: &str) -> Result<usize> {
        self.with_table(table, |t| Ok(t.items.len()))
    }

    fn with_table<T>(&self, name: &str, f: impl FnOnce(&MemoryTable) -> Result<T>) -> Result<T> {
        let tables = self.tables.read();
        let table = tables
            .get(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        f(table)
    }

    fn with_table_mut<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut MemoryTable) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        f(table)
    }

    fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested.map_or(self.page_size, |limit| limit.min(self.page_size)).max(1)
    }
}

impl Store for MemoryStore {
    fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(&schema.name) {
            return Err(StoreError::TableAlreadyExists(schema.name.clone()).into());
        }
        tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema: schema.clone(),
                items: BTreeMap::new(),
            },
        );
        debug!(table = %schema.name, indexes = schema.indexes.len(), "created table");
        Ok(())
    }

    fn delete_table(&self, name: &str) -> Result<()> {
        self.tables
            .write()
            .remove(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        debug!(table = name, "deleted table");
        Ok(())
    }

    fn get_item(
        &self,
        table: &str,
        key: &ItemKey,
        _consistent_read: bool,
    ) -> Result<Option<Value>> {
        self.stats.lock().get_calls += 1;
        self.with_table(table, |t| t.get(key))
    }

    fn put_item(&self, table: &str, item: Value) -> Result<()> {
        self.with_table_mut(table, |t| t.put(&item))
    }

    fn delete_item(&self, table: &str, key: &ItemKey) -> Result<()> {
        self.with_table_mut(table, |t| {
            t.items.remove(&key.canonical());
            Ok(())
        })
    }

    fn batch_write(&self, table: &str, mut requests: Vec<WriteRequest>) -> Result<BatchWriteOutput> {
        self.stats.lock().batch_write_calls += 1;
        let accepted = self.write_capacity.unwrap_or(requests.len()).min(requests.len());
        let unprocessed = requests.split_off(accepted);
        self.with_table_mut(table, |t| {
            for request in &requests {
                match request {
                    WriteRequest::Put(item) => t.put(item)?,
                    WriteRequest::Delete(key) => {
                        t.items.remove(&key.canonical());
                    }
                }
            }
            Ok(())
        })?;
        Ok(BatchWriteOutput { unprocessed })
    }

    fn batch_get(&self, table: &str, keys: &[ItemKey]) -> Result<Vec<Value>> {
        self.with_table(table, |t| {
            let mut found = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(item) = t.get(key)? {
                    found.push(item);
                }
            }
            Ok(found)
        })
    }

    fn query(&self, table: &str, request: &QueryRequest) -> Result<Page> {
        self.stats.lock().query_calls += 1;
        if request.partition.condition.as_equality().is_none() {
            return Err(StoreError::PartitionConditionNotEquality.into());
        }
        let limit = self.effective_limit(request.limit);

        self.with_table(table, |t| {
            let key_schema = &t.schema.key_schema;
            let mut key_attrs = key_schema.attribute_names();
            let (projection, sort_attr) = match &request.index_name {
                Some(name) => {
                    let index = t
                        .schema
                        .indexes
                        .iter()
                        .find(|idx| &idx.name == name)
                        .ok_or_else(|| SchemaError::InvalidIndexName(name.clone()))?;
                    key_attrs.push(index.partition_key.name.as_str());
                    key_attrs.push(index.sort_key.name.as_str());
                    (&index.projection, Some(index.sort_key.name.as_str()))
                }
                None => (&Projection::All, key_schema.sort_key.as_deref()),
            };
            // Secondary indexes are sparse: items lacking either index key are absent.
            let required: &[&str] = if request.index_name.is_some() {
                &key_attrs[key_attrs.len() - 2..]
            } else {
                &[]
            };

            let partition = request
                .partition
                .condition
                .evaluate(&request.partition.attribute);
            let range = request
                .sort
                .as_ref()
                .map(|clause| clause.condition.evaluate(&clause.attribute));

            let mut candidates = Vec::new();
            for item in t.decoded()? {
                if required.iter().any(|attr| resolve_attr(&item, attr).is_null()) {
                    continue;
                }
                if !partition.eval(&item)? {
                    continue;
                }
                if let Some(range) = &range
                    && !range.eval(&item)?
                {
                    continue;
                }
                candidates.push(item);
            }

            paginate(
                candidates,
                &PageWindow {
                    key_schema,
                    sort_attr,
                    key_attrs: &key_attrs,
                    projection,
                    limit,
                    start: request.exclusive_start_key.as_ref(),
                    filter: request.filter.as_ref(),
                },
            )
        })
    }

    fn scan(&self, table: &str, request: &ScanRequest) -> Result<Page> {
        self.stats.lock().scan_calls += 1;
        let limit = self.effective_limit(request.limit);
        self.with_table(table, |t| {
            let key_attrs = t.schema.key_schema.attribute_names();
            paginate(
                t.decoded()?,
                &PageWindow {
                    key_schema: &t.schema.key_schema,
                    sort_attr: None,
                    key_attrs: &key_attrs,
                    projection: &Projection::All,
                    limit,
                    start: request.exclusive_start_key.as_ref(),
                    filter: request.filter.as_ref(),
                },
            )
        })
    }

    fn update_item(&self, table: &str, key: &ItemKey, actions: &[UpdateAction]) -> Result<Value> {
        self.with_table_mut(table, |t| {
            validate_no_key_updates(actions, &t.schema.key_schema.attribute_names())?;
            let mut item = match t.get(key)? {
                Some(item) => item,
                None => key.to_value(&t.schema.key_schema),
            };
            apply_updates(&mut item, actions)?;
            t.put(&item)?;
            Ok(item)
        })
    }
}

struct PageWindow<'a> {
    key_schema: &'a KeySchema,
    sort_attr: Option<&'a str>,
    key_attrs: &'a [&'a str],
    projection: &'a Projection,
    limit: usize,
    start: Option<&'a Value>,
    filter: Option<&'a FilterExpr>,
}

impl PageWindow<'_> {
    fn order(&self, a: &Value, b: &Value) -> Ordering {
        let by_sort = self
            .sort_attr
            .and_then(|attr| compare_values(resolve_attr(a, attr), resolve_attr(b, attr)))
            .unwrap_or(Ordering::Equal);
        by_sort.then_with(|| self.canonical(a).cmp(&self.canonical(b)))
    }

    fn canonical(&self, item: &Value) -> String {
        ItemKey::from_record(item, self.key_schema)
            .map(|key| key.canonical())
            .unwrap_or_default()
    }

    fn continuation_key(&self, item: &Value) -> Value {
        let mut key = Map::new();
        for &attr in self.key_attrs {
            if let Some(value) = item.get(attr) {
                key.insert(attr.to_string(), value.clone());
            }
        }
        Value::Object(key)
    }
}

fn paginate(mut items: Vec<Value>, window: &PageWindow<'_>) -> Result<Page> {
    items.sort_by(|a, b| window.order(a, b));
    if let Some(start) = window.start {
        items.retain(|item| window.order(item, start) == Ordering::Greater);
    }
    let has_more = items.len() > window.limit;
    items.truncate(window.limit);

    let last_evaluated_key = if has_more {
        items.last().map(|item| window.continuation_key(item))
    } else {
        None
    };

    let mut page_items = Vec::with_capacity(items.len());
    for item in items {
        if let Some(filter) = window.filter
            && !filter.eval(&item)?
        {
            continue;
        }
        page_items.push(apply_projection(&item, window.projection, window.key_attrs));
    }
    Ok(Page {
        items: page_items,
        last_evaluated_key,
    })
}

fn encode(item: &Value) -> Result<Vec<u8>> {
    let bytes = rmp_serde::to_vec(item).map_err(|e| StoreError::Encoding(e.to_string()))?;
    if bytes.len() > MAX_DOCUMENT_SIZE {
        return Err(StoreError::DocumentTooLarge {
            max: MAX_DOCUMENT_SIZE,
            actual: bytes.len(),
        }
        .into());
    }
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<Value> {
    Ok(rmp_serde::from_slice(bytes).map_err(|e| StoreError::Encoding(e.to_string()))?)
}

//! Lazy iteration over paginated query and scan results.
//!
//! Each page is fetched on demand, driven by the store's continuation key.
//! Dropping the iterator stops fetching.

use std::collections::VecDeque;
use std::marker::PhantomData;

use serde_json::Value;

use super::table::Table;
use crate::entity::Entity;
use crate::error::Result;
use crate::store::{QueryRequest, ScanRequest, Store};
use crate::types::TYPE_ATTR;

pub(crate) enum PageSource {
    Query(QueryRequest),
    Scan(ScanRequest),
}

impl PageSource {
    fn resume_after(&mut self, key: Value) {
        match self {
            PageSource::Query(request) => request.exclusive_start_key = Some(key),
            PageSource::Scan(request) => request.exclusive_start_key = Some(key),
        }
    }
}

/// Raw stored records, page by page.
pub struct Records<'a, S: Store> {
    table: &'a Table<S>,
    source: PageSource,
    buffer: VecDeque<Value>,
    exhausted: bool,
}

impl<'a, S: Store> Records<'a, S> {
    pub(crate) fn new(table: &'a Table<S>, source: PageSource) -> Self {
        Self {
            table,
            source,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch(&mut self) -> Result<()> {
        let name = self.table.name();
        let page = match &self.source {
            PageSource::Query(request) => self.table.store().query(name, request)?,
            PageSource::Scan(request) => self.table.store().scan(name, request)?,
        };
        self.buffer.extend(page.items);
        match page.last_evaluated_key {
            Some(key) => self.source.resume_after(key),
            None => self.exhausted = true,
        }
        Ok(())
    }
}

impl<S: Store> Iterator for Records<'_, S> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}

/// Loaded entities of type `T`; records of other types are skipped.
pub struct Items<'a, S: Store, T: Entity> {
    records: Records<'a, S>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, S: Store, T: Entity> Items<'a, S, T> {
    pub(crate) fn new(records: Records<'a, S>) -> Self {
        Self {
            records,
            _marker: PhantomData,
        }
    }
}

impl<S: Store, T: Entity> Iterator for Items<'_, S, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };
            if record.get(TYPE_ATTR).and_then(Value::as_str) != Some(T::entity_type()) {
                continue;
            }
            return Some(self.records.table.load::<T>(record));
        }
    }
}

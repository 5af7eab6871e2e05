//! The storage gateway for one table.

use std::collections::HashMap;

use serde_json::Value;
use tracing::info;

use super::batch::{BatchWriter, write_chunked};
use super::builders::{GetBuilder, QueryBuilder, ScanBuilder, UpdateBuilder};
use crate::catalog::{Catalog, EntityDescriptor};
use crate::config::TableConfig;
use crate::entity::Entity;
use crate::error::{HierarchyError, Result};
use crate::hierarchy::Hierarchy;
use crate::hierarchy::record::split_record;
use crate::store::{Store, WriteRequest};
use crate::types::{ItemKey, TYPE_ATTR};

/// Counts from one save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Records written.
    pub written: usize,
    /// Records deleted because they left the tree.
    pub deleted_keys: usize,
    /// Records deleted because they, or an ancestor, were marked.
    pub deleted_items: usize,
    /// Nodes not written: excluded from writes or unchanged.
    pub skipped: usize,
}

/// Entity trees stored in one table of a [`Store`].
///
/// Owns the table configuration and the catalog of entity types seen by
/// this gateway. Every operation is a blocking call into the store.
pub struct Table<S: Store> {
    store: S,
    config: TableConfig,
    catalog: Catalog,
}

impl<S: Store> Table<S> {
    pub fn new(config: TableConfig, store: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            catalog: Catalog::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn hierarchy(&self) -> Hierarchy<'_> {
        Hierarchy::new(&self.config, &self.catalog)
    }

    /// Validate `T` against the table's indexes and add it, with every
    /// child type, to the catalog.
    pub fn register<T: Entity>(&self) -> Result<()> {
        self.catalog.register(EntityDescriptor::of::<T>(), &self.config)
    }

    pub fn create(&self) -> Result<()> {
        self.store.create_table(&self.config.schema())?;
        info!(
            table = %self.config.name,
            indexes = self.config.indexes.len(),
            "provisioned table"
        );
        Ok(())
    }

    pub fn drop(&self) -> Result<()> {
        self.store.delete_table(&self.config.name)?;
        info!(table = %self.config.name, "dropped table");
        Ok(())
    }

    /// Link a freshly built tree and capture its tracking baseline.
    pub fn prepare<T: Entity>(&self, root: &mut T) -> Result<()> {
        self.hierarchy().prepare(root)
    }

    /// Save the tree rooted at `root`, writing only what changed since its
    /// last save or load.
    pub fn put<T: Entity>(&self, root: &mut T) -> Result<SaveReport> {
        self.batch_write().put(root).commit()
    }

    /// Delete every record of the tree, including records of nodes removed
    /// since it was loaded. Returns the number of keys deleted.
    pub fn delete<T: Entity>(&self, root: &mut T) -> Result<usize> {
        let hierarchy = self.hierarchy();
        hierarchy.set_parent_references(root, false)?;
        hierarchy.build_model_indexes(root)?;
        let keys = hierarchy.tree_keys(root)?;
        let requests: Vec<WriteRequest> = keys.iter().cloned().map(WriteRequest::Delete).collect();
        let deleted = requests.len();
        write_chunked(&self.store, self.name(), self.config.max_batch_size, requests)?;
        hierarchy.forget_persisted(root);
        Ok(deleted)
    }

    pub fn get<T: Entity>(&self, id: impl Into<String>) -> GetBuilder<'_, S, T> {
        GetBuilder::new(self, id.into())
    }

    /// Fetch entities by id, `batch_size` keys per store call.
    ///
    /// Results follow the order of `ids`; missing ids and records of other
    /// types are skipped.
    pub fn batch_get<T: Entity>(&self, ids: &[&str], batch_size: usize) -> Result<Vec<T>> {
        let mut found: HashMap<String, Value> = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(batch_size.max(1)) {
            let keys: Vec<ItemKey> = chunk.iter().map(|id| ItemKey::new(*id)).collect();
            for record in self.store.batch_get(self.name(), &keys)? {
                if let Some(id) = record.get("id").and_then(Value::as_str) {
                    found.insert(id.to_string(), record);
                }
            }
        }

        let mut items = Vec::with_capacity(found.len());
        for id in ids {
            let Some(record) = found.remove(*id) else {
                continue;
            };
            if record.get(TYPE_ATTR).and_then(Value::as_str) != Some(T::entity_type()) {
                continue;
            }
            items.push(self.load::<T>(record)?);
        }
        Ok(items)
    }

    pub fn query<T: Entity>(&self) -> QueryBuilder<'_, S, T> {
        QueryBuilder::new(self)
    }

    pub fn scan<T: Entity>(&self) -> ScanBuilder<'_, S, T> {
        ScanBuilder::new(self)
    }

    pub fn batch_write(&self) -> BatchWriter<'_, S> {
        BatchWriter::new(self)
    }

    /// Update attributes of a stored root entity. `root` is left untouched;
    /// the updated entity is returned by [`UpdateBuilder::execute`].
    pub fn update<'a, T: Entity>(&'a self, root: &'a T) -> UpdateBuilder<'a, S, T> {
        UpdateBuilder::new(self, root)
    }

    /// Turn one stored record into a loaded entity of type `T`.
    pub(crate) fn load<T: Entity>(&self, record: Value) -> Result<T> {
        let parts = split_record(record, &self.config.index_attribute_names())?;
        if parts.type_tag != T::entity_type() {
            return Err(HierarchyError::UnexpectedRootType {
                expected: T::entity_type().to_string(),
                actual: parts.type_tag,
            }
            .into());
        }
        let mut entity: T = serde_json::from_value(Value::Object(parts.body))?;
        entity.meta_mut().parent = parts.parent;
        self.hierarchy().capture_loaded(&mut entity)?;
        Ok(entity)
    }
}

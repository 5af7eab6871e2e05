//! Builder-pattern reads and updates on a [`Table`].

use std::marker::PhantomData;

use serde_json::Value;
use tracing::debug;

use super::condition::KeyCondition;
use super::filter::FilterExpr;
use super::pages::{Items, PageSource, Records};
use super::table::Table;
use super::update::{UpdateAction, validate_no_key_updates};
use crate::catalog::EntityDescriptor;
use crate::config::TableConfig;
use crate::entity::Entity;
use crate::error::{Error, HierarchyError, Result, StoreError};
use crate::hierarchy::keys::compute_index_keys;
use crate::hierarchy::record::to_record;
use crate::store::{KeyClause, QueryRequest, ScanRequest, Store};
use crate::types::{
    ItemKey, KeyType, PARENT_ID_ATTR, RESERVED_ATTRS, SecondaryIndex, TYPE_ATTR,
};

// ---------------------------------------------------------------------------
// GetBuilder
// ---------------------------------------------------------------------------

/// Fetch one entity by id. Children are not loaded.
pub struct GetBuilder<'a, S: Store, T: Entity> {
    table: &'a Table<S>,
    id: String,
    sort_key: Option<Value>,
    consistent_read: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, S: Store, T: Entity> GetBuilder<'a, S, T> {
    pub(crate) fn new(table: &'a Table<S>, id: String) -> Self {
        Self {
            table,
            id,
            sort_key: None,
            consistent_read: false,
            _marker: PhantomData,
        }
    }

    /// Sort key value, for tables whose primary key has one.
    pub fn sort_key(mut self, value: impl Into<Value>) -> Self {
        self.sort_key = Some(value.into());
        self
    }

    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    pub fn execute(self) -> Result<T> {
        let key = match self.sort_key {
            Some(sort) => ItemKey::new(self.id.as_str()).with_sort(sort),
            None => ItemKey::new(self.id.as_str()),
        };
        let record = self
            .table
            .store()
            .get_item(self.table.name(), &key, self.consistent_read)?
            .ok_or(Error::ItemNotFound(self.id))?;
        self.table.load::<T>(record)
    }
}

// ---------------------------------------------------------------------------
// QueryBuilder
// ---------------------------------------------------------------------------

/// Range read of entities of type `T` through a secondary index.
pub struct QueryBuilder<'a, S: Store, T: Entity> {
    table: &'a Table<S>,
    index: Option<String>,
    partition: Option<KeyCondition>,
    sort: Option<KeyCondition>,
    filter: Option<FilterExpr>,
    consistent_read: bool,
    page_size: Option<usize>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, S: Store, T: Entity> QueryBuilder<'a, S, T> {
    pub(crate) fn new(table: &'a Table<S>) -> Self {
        Self {
            table,
            index: None,
            partition: None,
            sort: None,
            filter: None,
            consistent_read: false,
            page_size: None,
            _marker: PhantomData,
        }
    }

    /// Index to query; defaults to the first configured index.
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    pub fn partition_key(mut self, value: impl Into<Value>) -> Self {
        self.partition = Some(KeyCondition::Equals(value.into()));
        self
    }

    /// Partition condition; stores accept only [`KeyCondition::Equals`].
    pub fn partition(mut self, condition: KeyCondition) -> Self {
        self.partition = Some(condition);
        self
    }

    /// Sort key condition. A `BeginsWith` prefix is scoped to `T`'s type
    /// when the type leads the sort key.
    pub fn sort_key(mut self, condition: KeyCondition) -> Self {
        self.sort = Some(condition);
        self
    }

    pub fn filter(mut self, expr: FilterExpr) -> Self {
        self.filter = Some(expr);
        self
    }

    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    /// Items evaluated per store call.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Lazily iterate the matching entities of type `T`.
    pub fn execute(self) -> Result<Items<'a, S, T>> {
        let request = self.request()?;
        Ok(Items::new(Records::new(self.table, PageSource::Query(request))))
    }

    /// Fetch every record in range and rebuild the single tree they form.
    ///
    /// Returns `Ok(None)` when no record in range is a root.
    pub fn execute_hierarchy(self) -> Result<Option<T>> {
        let table = self.table;
        table
            .catalog()
            .register_if_absent(EntityDescriptor::of::<T>(), table.config())?;
        let request = self.request()?;
        let records = Records::new(table, PageSource::Query(request)).collect::<Result<Vec<_>>>()?;

        let roots: Vec<&Value> = records
            .iter()
            .filter(|r| r.get(PARENT_ID_ATTR).is_none_or(Value::is_null))
            .collect();
        if let [root] = roots.as_slice() {
            let actual = root.get(TYPE_ATTR).and_then(Value::as_str).unwrap_or_default();
            if actual != T::entity_type() {
                return Err(HierarchyError::UnexpectedRootType {
                    expected: T::entity_type().to_string(),
                    actual: actual.to_string(),
                }
                .into());
            }
        }

        let hierarchy = table.hierarchy();
        let Some(tree) = hierarchy.reconstruct_hierarchy(records)? else {
            return Ok(None);
        };
        let mut root: T = serde_json::from_value(tree)?;
        hierarchy.capture_loaded(&mut root)?;
        Ok(Some(root))
    }

    fn request(&self) -> Result<QueryRequest> {
        let config = self.table.config();
        let index = config.index(self.index.as_deref())?;
        let partition = self
            .partition
            .clone()
            .ok_or(StoreError::PartitionConditionNotEquality)?;
        let sort = self.range_condition(config, index);
        let scope = type_scope::<T>(config, index, self.sort.is_some());
        let filter = match (scope, self.filter.clone()) {
            (Some(scope), Some(filter)) => Some(FilterExpr::and(vec![scope, filter])),
            (scope, filter) => scope.or(filter),
        };
        Ok(QueryRequest {
            index_name: Some(index.name.clone()),
            partition: KeyClause::new(index.partition_key.name.clone(), partition),
            sort: sort.map(|condition| KeyClause::new(index.sort_key.name.clone(), condition)),
            filter,
            consistent_read: self.consistent_read,
            limit: self.page_size,
            exclusive_start_key: None,
        })
    }

    fn range_condition(&self, config: &TableConfig, index: &SecondaryIndex) -> Option<KeyCondition> {
        let prefix = type_prefix::<T>(config, index);
        match (self.sort.clone(), prefix) {
            (Some(condition), Some(_)) => {
                Some(condition.enrich(T::entity_type(), config.delimiter.as_str()))
            }
            (Some(condition), None) => Some(condition),
            (None, Some(prefix)) => Some(KeyCondition::BeginsWith(prefix)),
            (None, None) => None,
        }
    }
}

/// The prefix every sort key of a root `T` starts with on `index`, when the
/// type tag leads the sort key path.
fn type_prefix<T: Entity>(config: &TableConfig, index: &SecondaryIndex) -> Option<String> {
    let descriptor = EntityDescriptor::of::<T>();
    if descriptor.nested || !descriptor.include_type_in_sort_key {
        return None;
    }
    let fields = descriptor.indexes.get(&index.name)?;
    if fields.type_is_pk_field() || fields.type_is_sk_field() {
        return None;
    }
    let sk_count = fields.sk_fields().len();
    if sk_count == 1 && index.sort_key.key_type != KeyType::String {
        return None;
    }
    if sk_count == 0 {
        return Some(descriptor.type_tag.to_string());
    }
    Some(format!("{}{}", descriptor.type_tag, config.delimiter))
}

/// A root without sort fields has the bare type tag as its sort key, so the
/// default prefix also reaches longer tags such as `RootX`. The returned
/// filter keeps the tag itself and paths below it.
fn type_scope<T: Entity>(
    config: &TableConfig,
    index: &SecondaryIndex,
    has_sort_condition: bool,
) -> Option<FilterExpr> {
    if has_sort_condition {
        return None;
    }
    let prefix = type_prefix::<T>(config, index)?;
    if prefix.ends_with(config.delimiter.as_str()) {
        return None;
    }
    let attr = index.sort_key.name.clone();
    Some(FilterExpr::or(vec![
        FilterExpr::eq(attr.clone(), prefix.clone()),
        FilterExpr::begins_with(attr, format!("{prefix}{}", config.delimiter)),
    ]))
}

// ---------------------------------------------------------------------------
// ScanBuilder
// ---------------------------------------------------------------------------

/// Full-table read of entities of type `T`.
pub struct ScanBuilder<'a, S: Store, T: Entity> {
    table: &'a Table<S>,
    filter: Option<FilterExpr>,
    consistent_read: bool,
    page_size: Option<usize>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, S: Store, T: Entity> ScanBuilder<'a, S, T> {
    pub(crate) fn new(table: &'a Table<S>) -> Self {
        Self {
            table,
            filter: None,
            consistent_read: false,
            page_size: None,
            _marker: PhantomData,
        }
    }

    pub fn filter(mut self, expr: FilterExpr) -> Self {
        self.filter = Some(expr);
        self
    }

    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn execute(self) -> Items<'a, S, T> {
        let request = ScanRequest {
            filter: self.filter,
            consistent_read: self.consistent_read,
            limit: self.page_size,
            exclusive_start_key: None,
        };
        Items::new(Records::new(self.table, PageSource::Scan(request)))
    }
}

// ---------------------------------------------------------------------------
// UpdateBuilder
// ---------------------------------------------------------------------------

/// Partial update of one stored root entity.
///
/// Key, index and reserved attributes cannot be targeted. After the store
/// applies the actions, index keys derived from the updated attributes are
/// recomputed and written back when they changed. Descendant sort keys are
/// refreshed by the next save of the tree.
pub struct UpdateBuilder<'a, S: Store, T: Entity> {
    table: &'a Table<S>,
    target: &'a T,
    actions: Vec<UpdateAction>,
}

impl<'a, S: Store, T: Entity> UpdateBuilder<'a, S, T> {
    pub(crate) fn new(table: &'a Table<S>, target: &'a T) -> Self {
        Self {
            table,
            target,
            actions: Vec::new(),
        }
    }

    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.actions.push(UpdateAction::Set {
            path: path.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn remove(mut self, path: &str) -> Self {
        self.actions.push(UpdateAction::Remove {
            path: path.to_string(),
        });
        self
    }

    pub fn add(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.actions.push(UpdateAction::Add {
            path: path.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn delete(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.actions.push(UpdateAction::Delete {
            path: path.to_string(),
            value: value.into(),
        });
        self
    }

    /// Apply the update and return the stored entity, without children.
    pub fn execute(self) -> Result<T> {
        if T::is_nested() {
            return Err(HierarchyError::NestedRoot(T::entity_type().to_string()).into());
        }
        let table = self.table;
        let config = table.config();

        let mut protected = config.key_schema.attribute_names();
        protected.push("id");
        protected.extend(config.index_attribute_names());
        protected.extend(RESERVED_ATTRS);
        validate_no_key_updates(&self.actions, &protected)?;

        let descriptor = EntityDescriptor::of::<T>();
        let record = to_record(self.target, &descriptor)?;
        let key = ItemKey::from_record(&record, &config.key_schema)?;
        let mut updated = table.store().update_item(table.name(), &key, &self.actions)?;

        let refresh = index_refresh(config, &descriptor, &updated)?;
        if !refresh.is_empty() {
            debug!(
                id = self.target.meta().id(),
                attributes = refresh.len(),
                "refreshing index keys after update"
            );
            updated = table.store().update_item(table.name(), &key, &refresh)?;
        }
        table.load::<T>(updated)
    }
}

/// Actions bringing the stored index attributes of `record` in line with
/// the keys its current attributes derive.
fn index_refresh(
    config: &TableConfig,
    descriptor: &EntityDescriptor,
    record: &Value,
) -> Result<Vec<UpdateAction>> {
    let Value::Object(fields) = record else {
        return Err(HierarchyError::MalformedRecord("record is not an object".into()).into());
    };
    let computed = compute_index_keys(config, descriptor, fields, None)?;
    let mut actions = Vec::new();
    for attr in config.index_attribute_names() {
        match (computed.get(attr), fields.get(attr)) {
            (Some(new), Some(old)) if new == old => {}
            (Some(new), _) => actions.push(UpdateAction::Set {
                path: attr.to_string(),
                value: new.clone(),
            }),
            (None, Some(_)) => actions.push(UpdateAction::Remove {
                path: attr.to_string(),
            }),
            (None, None) => {}
        }
    }
    Ok(actions)
}

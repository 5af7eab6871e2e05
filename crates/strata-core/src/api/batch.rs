//! Batched saves and deletes of whole entity trees.

use tracing::{debug, warn};

use super::table::{SaveReport, Table};
use crate::entity::{Entity, Node};
use crate::error::{HierarchyError, Result, StoreError};
use crate::hierarchy::SavePlan;
use crate::store::{Store, WriteRequest};

/// Collects trees to save or delete and writes them in chunks on
/// [`commit`](BatchWriter::commit).
///
/// All deletes by key go out first, then deletes by item, then puts.
pub struct BatchWriter<'a, S: Store> {
    table: &'a Table<S>,
    puts: Vec<&'a mut dyn Node>,
    deletes: Vec<&'a dyn Node>,
}

impl<'a, S: Store> BatchWriter<'a, S> {
    pub(crate) fn new(table: &'a Table<S>) -> Self {
        Self {
            table,
            puts: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// Save the tree rooted at `root`.
    pub fn put<T: Entity>(mut self, root: &'a mut T) -> Self {
        self.puts.push(root);
        self
    }

    /// Delete every node of the tree rooted at `root`.
    pub fn delete<T: Entity>(mut self, root: &'a T) -> Self {
        self.deletes.push(root);
        self
    }

    pub fn commit(self) -> Result<SaveReport> {
        let hierarchy = self.table.hierarchy();
        let mut plans: Vec<SavePlan> = Vec::with_capacity(self.puts.len());
        let mut roots = self.puts;
        for root in roots.iter_mut() {
            if root.descriptor().nested {
                return Err(HierarchyError::NestedRoot(root.type_tag().to_string()).into());
            }
            hierarchy.set_parent_references(&mut **root, false)?;
            hierarchy.build_model_indexes(&mut **root)?;
            plans.push(hierarchy.plan_save(&**root)?);
        }

        let mut by_key = Vec::new();
        let mut by_item = Vec::new();
        let mut puts = Vec::new();
        for root in &self.deletes {
            by_key.extend(hierarchy.tree_keys(*root)?.iter().cloned().map(WriteRequest::Delete));
        }
        for plan in &plans {
            by_key.extend(plan.deletes_by_key.iter().cloned().map(WriteRequest::Delete));
            by_item.extend(plan.deletes_by_item.iter().cloned().map(WriteRequest::Delete));
            puts.extend(plan.puts.iter().cloned().map(WriteRequest::Put));
        }

        let report = SaveReport {
            written: puts.len(),
            deleted_keys: by_key.len(),
            deleted_items: by_item.len(),
            skipped: plans.iter().map(|p| p.skipped.len()).sum(),
        };
        let table = self.table;
        for group in [by_key, by_item, puts] {
            write_chunked(table.store(), table.name(), table.config().max_batch_size, group)?;
        }

        for (root, plan) in roots.into_iter().zip(plans) {
            hierarchy.commit_save(root, plan);
        }
        debug!(
            table = table.name(),
            written = report.written,
            deleted = report.deleted_keys + report.deleted_items,
            skipped = report.skipped,
            "committed batch"
        );
        Ok(report)
    }
}

/// Send `requests` in chunks of at most `chunk_size`, resubmitting
/// unprocessed items until the store has applied them all.
pub(crate) fn write_chunked<S: Store>(
    store: &S,
    table: &str,
    chunk_size: usize,
    requests: Vec<WriteRequest>,
) -> Result<()> {
    let mut requests = requests.into_iter();
    loop {
        let mut outstanding: Vec<WriteRequest> = requests.by_ref().take(chunk_size.max(1)).collect();
        if outstanding.is_empty() {
            return Ok(());
        }
        while !outstanding.is_empty() {
            let submitted = outstanding.len();
            let output = store.batch_write(table, outstanding)?;
            let remaining = output.unprocessed.len();
            if remaining >= submitted {
                return Err(StoreError::BatchStalled { remaining }.into());
            }
            if remaining > 0 {
                warn!(table, submitted, unprocessed = remaining, "resubmitting unprocessed items");
            }
            outstanding = output.unprocessed;
        }
    }
}

//! Hierarchy engine: parent links, index keys, flattening and save diffs.
//!
//! Entity trees are plain owned values; children hold only a weak
//! [`ParentLink`](crate::entity::ParentLink) (parent id and field name) back
//! to their owner. Every walk here is preorder and resolves the inherited
//! node state (write enablement, deletion, tracking) top-down as it goes.

pub mod keys;
pub mod reconstruct;
pub mod record;
pub mod snapshot;

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::catalog::Catalog;
use crate::config::TableConfig;
use crate::entity::tracking::{capture_placement, placement_changed, resolve_tracking};
use crate::entity::{ChildMut, Node, NodeState, ParentLink, init_tracking, was_modified};
use crate::error::{HierarchyError, Result};
use crate::types::ItemKey;

pub use snapshot::{SavePlan, SnapshotKeys};

/// The hierarchy engine, bound to one table's configuration and catalog.
pub struct Hierarchy<'a> {
    config: &'a TableConfig,
    catalog: &'a Catalog,
}

impl<'a> Hierarchy<'a> {
    pub fn new(config: &'a TableConfig, catalog: &'a Catalog) -> Self {
        Self { config, catalog }
    }

    pub fn config(&self) -> &TableConfig {
        self.config
    }

    /// Wire parent links through a freshly built tree and capture the root's
    /// tracking baseline.
    pub fn prepare(&self, root: &mut dyn Node) -> Result<()> {
        self.set_parent_references(root, false)?;
        init_tracking(root);
        Ok(())
    }

    /// Point every child at its owning node.
    ///
    /// Children that already have a parent keep their link unless
    /// `force_override` is set; the walk still descends into them so new
    /// descendants get linked. Newly linked children have their type
    /// registered and their tracking baseline captured.
    pub fn set_parent_references(&self, root: &mut dyn Node, force_override: bool) -> Result<()> {
        root.entity_meta_mut().state = root_state(root);
        self.catalog.register_if_absent(root.descriptor(), self.config)?;
        self.link_children(root, force_override)
    }

    fn link_children(&self, node: &mut dyn Node, force_override: bool) -> Result<()> {
        let parent_id = node.entity_meta().id().to_string();
        let parent_state = node.entity_meta().state;
        for ChildMut { field, node: child } in node.child_nodes_mut() {
            let state = child_state(&parent_state, child);
            child.entity_meta_mut().state = state;
            if force_override || child.entity_meta().parent().is_none() {
                child.entity_meta_mut().parent = Some(ParentLink {
                    id: parent_id.clone(),
                    field: field.to_string(),
                });
                self.catalog.register_if_absent(child.descriptor(), self.config)?;
                init_tracking(child);
            }
            self.link_children(child, force_override)?;
        }
        Ok(())
    }

    /// Compute the index attributes of every node in the tree, root first.
    pub fn build_model_indexes(&self, root: &mut dyn Node) -> Result<()> {
        root.entity_meta_mut().state = root_state(root);
        self.build_subtree(root, None)
    }

    fn build_subtree(
        &self,
        node: &mut dyn Node,
        parent_keys: Option<&BTreeMap<String, Value>>,
    ) -> Result<()> {
        let descriptor = node.descriptor();
        let Value::Object(fields) = node.to_json()? else {
            return Err(HierarchyError::MalformedRecord(format!(
                "'{}' did not serialize to an object",
                descriptor.type_tag
            ))
            .into());
        };
        let computed = keys::compute_index_keys(self.config, &descriptor, &fields, parent_keys)?;
        node.entity_meta_mut().set_index_keys(computed.clone());

        let state = node.entity_meta().state;
        for ChildMut { node: child, .. } in node.child_nodes_mut() {
            let child_state = child_state(&state, child);
            child.entity_meta_mut().state = child_state;
            self.build_subtree(child, Some(&computed))?;
        }
        Ok(())
    }

    /// The root followed by every descendant in preorder, each id once.
    pub fn split_to_simple_objects<'n>(&self, root: &'n dyn Node) -> Vec<&'n dyn Node> {
        let mut nodes = Vec::new();
        let mut seen = HashSet::new();
        collect(root, &mut nodes, &mut seen);
        nodes
    }

    /// Diff the tree against its stored snapshot.
    ///
    /// Expects parent references and index keys to be current.
    pub fn plan_save(&self, root: &dyn Node) -> Result<SavePlan> {
        let previous = root.entity_meta().snapshot.clone().unwrap_or_default();
        let mut plan = SavePlan::default();
        let mut current = SnapshotKeys::new();
        let mut marked = SnapshotKeys::new();

        for node in self.split_to_simple_objects(root) {
            let descriptor = node.descriptor();
            let record = record::to_record(node, &descriptor)?;
            let key = ItemKey::from_record(&record, &self.config.key_schema)?;
            let meta = node.entity_meta();

            if meta.should_delete() {
                marked.insert(key.clone());
                plan.deletes_by_item.push(key);
                continue;
            }
            current.insert(key);

            let unchanged =
                meta.is_persisted() && !was_modified(node) && !placement_changed(meta);
            if !meta.state.write_enabled || unchanged {
                plan.skipped.push(meta.id().to_string());
                continue;
            }
            plan.put_ids.push(meta.id().to_string());
            plan.puts.push(record);
        }

        plan.deletes_by_key = previous.removed_since(&current, &marked);
        plan.snapshot = current;
        debug!(
            root = root.entity_meta().id(),
            puts = plan.puts.len(),
            deletes_by_key = plan.deletes_by_key.len(),
            deletes_by_item = plan.deletes_by_item.len(),
            skipped = plan.skipped.len(),
            "planned save"
        );
        Ok(plan)
    }

    /// Record a successfully executed plan on the tree: install the new
    /// snapshot, flag written nodes persisted and reset every baseline.
    pub fn commit_save(&self, root: &mut dyn Node, plan: SavePlan) {
        let written: HashSet<&str> = plan.put_ids.iter().map(String::as_str).collect();
        walk_mut(root, &mut |node| {
            let deleted = node.entity_meta().should_delete();
            if deleted {
                node.entity_meta_mut().persisted = false;
                return;
            }
            if written.contains(node.entity_meta().id()) {
                node.entity_meta_mut().persisted = true;
            }
            init_tracking(node);
            capture_placement(node.entity_meta_mut());
        });
        root.entity_meta_mut().snapshot = Some(plan.snapshot);
    }

    /// Adopt a tree just read from the store: link it, flag every node
    /// persisted, capture baselines and the snapshot of its keys.
    pub fn capture_loaded(&self, root: &mut dyn Node) -> Result<()> {
        self.set_parent_references(root, true)?;
        let mut snapshot = SnapshotKeys::new();
        for node in self.split_to_simple_objects(root) {
            let record = record::to_record(node, &node.descriptor())?;
            snapshot.insert(ItemKey::from_record(&record, &self.config.key_schema)?);
        }
        walk_mut(root, &mut |node| {
            node.entity_meta_mut().persisted = true;
            init_tracking(node);
            capture_placement(node.entity_meta_mut());
        });
        root.entity_meta_mut().snapshot = Some(snapshot);
        Ok(())
    }

    /// Drop the snapshot and persisted flags after the tree was deleted.
    pub fn forget_persisted(&self, root: &mut dyn Node) {
        walk_mut(root, &mut |node| node.entity_meta_mut().persisted = false);
        root.entity_meta_mut().snapshot = None;
    }

    /// Keys of every node, for deleting a whole tree.
    pub fn tree_keys(&self, root: &dyn Node) -> Result<SnapshotKeys> {
        let mut keys = root.entity_meta().snapshot.clone().unwrap_or_default();
        for node in self.split_to_simple_objects(root) {
            let record = record::to_record(node, &node.descriptor())?;
            keys.insert(ItemKey::from_record(&record, &self.config.key_schema)?);
        }
        Ok(keys)
    }

    /// Re-home the child `child_id` found in `parent.field_name`.
    ///
    /// The caller moves the child value into its new field first; this then
    /// forces its parent link, relinks its subtree and rebuilds every index
    /// key beneath it from the new parent's keys. The record at the old
    /// location is cleaned up by the next save's snapshot diff.
    pub fn reparent_subtree(
        &self,
        parent: &mut dyn Node,
        field_name: &str,
        child_id: &str,
    ) -> Result<()> {
        let parent_id = parent.entity_meta().id().to_string();
        let parent_keys = parent.entity_meta().index_keys().clone();
        let parent_state = parent.entity_meta().state;

        let child = parent
            .child_nodes_mut()
            .into_iter()
            .find(|slot| slot.field == field_name && slot.node.entity_meta().id() == child_id)
            .map(|slot| slot.node)
            .ok_or_else(|| HierarchyError::ChildNotFound {
                field: field_name.to_string(),
                id: child_id.to_string(),
            })?;

        child.entity_meta_mut().parent = Some(ParentLink {
            id: parent_id,
            field: field_name.to_string(),
        });
        let state = child_state(&parent_state, child);
        child.entity_meta_mut().state = state;
        self.catalog.register_if_absent(child.descriptor(), self.config)?;
        init_tracking(child);
        self.link_children(child, true)?;
        self.build_subtree(child, Some(&parent_keys))?;
        debug!(child = child_id, field = field_name, "reparented subtree");
        Ok(())
    }

    /// Attach a nested child that was moved into `parent.field_name`.
    ///
    /// Unlike [`Hierarchy::reparent_subtree`], the field must be one of the
    /// parent's declared child fields and the child must be a nested type.
    pub fn add_child_node(
        &self,
        parent: &mut dyn Node,
        field_name: &str,
        child_id: &str,
    ) -> Result<()> {
        let descriptor = parent.descriptor();
        let Some(field) = descriptor.child_field(field_name) else {
            return Err(HierarchyError::ChildNotFound {
                field: field_name.to_string(),
                id: child_id.to_string(),
            }
            .into());
        };
        let child = (field.descriptor)();
        if !child.nested {
            return Err(HierarchyError::NotNested(child.type_tag.to_string()).into());
        }
        self.reparent_subtree(parent, field_name, child_id)
    }
}

fn root_state(root: &dyn Node) -> NodeState {
    let (tracked, tracking_override) = resolve_tracking(root.tracking_override(), None, true);
    NodeState {
        write_enabled: root.write_requested(),
        deleted: root.entity_meta().is_marked_for_delete(),
        tracked,
        tracking_override,
    }
}

fn child_state(parent: &NodeState, child: &dyn Node) -> NodeState {
    let (tracked, tracking_override) =
        resolve_tracking(child.tracking_override(), parent.tracking_override, false);
    NodeState {
        write_enabled: parent.write_enabled && child.write_requested(),
        deleted: parent.deleted || child.entity_meta().is_marked_for_delete(),
        tracked,
        tracking_override,
    }
}

fn collect<'n>(node: &'n dyn Node, out: &mut Vec<&'n dyn Node>, seen: &mut HashSet<&'n str>) {
    if !seen.insert(node.entity_meta().id()) {
        return;
    }
    out.push(node);
    for child in node.child_nodes() {
        collect(child.node, out, seen);
    }
}

fn walk_mut(node: &mut dyn Node, visit: &mut dyn FnMut(&mut dyn Node)) {
    visit(node);
    for slot in node.child_nodes_mut() {
        walk_mut(slot.node, visit);
    }
}

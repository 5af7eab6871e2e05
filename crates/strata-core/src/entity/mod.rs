//! Entity model: the capability interface every stored type implements.
//!
//! An entity is a serde-serializable struct that embeds an [`EntityMeta`]
//! with `#[serde(flatten)]` and implements [`Entity`]. Child entities are
//! exposed through [`Entity::children`] / [`Entity::children_mut`] and
//! described statically by [`Entity::child_fields`], which replaces runtime
//! field introspection.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use strata_core::entity::{Entity, EntityMeta, IndexDefinitions, IndexFields};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Card {
//!     #[serde(flatten)]
//!     meta: EntityMeta,
//!     player_id: String,
//!     tier: String,
//! }
//!
//! impl Entity for Card {
//!     fn index_definitions() -> IndexDefinitions {
//!         IndexDefinitions::new()
//!             .index("main-index", IndexFields::new().pk("player_id").sk("tier"))
//!     }
//!
//!     fn meta(&self) -> &EntityMeta {
//!         &self.meta
//!     }
//!
//!     fn meta_mut(&mut self) -> &mut EntityMeta {
//!         &mut self.meta
//!     }
//! }
//!
//! assert_eq!(Card::entity_type(), "Card");
//! ```

pub mod index;
pub mod tracking;

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::EntityDescriptor;
use crate::hierarchy::snapshot::SnapshotKeys;

pub use index::{IndexDefinitions, IndexFields, SortField};
pub use tracking::{fingerprint, init_tracking, was_modified};

/// Declared shape of an entity-valued field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    /// Exactly one child entity.
    One,
    /// Zero or one child entity.
    Optional,
    /// An ordered sequence of child entities.
    List,
}

/// An entity-valued field: its name, shape and the child's type.
#[derive(Debug, Clone, Copy)]
pub struct ChildField {
    pub name: &'static str,
    pub kind: ChildKind,
    pub descriptor: fn() -> EntityDescriptor,
}

impl ChildField {
    pub const fn one<T: Entity>(name: &'static str) -> Self {
        Self::new::<T>(name, ChildKind::One)
    }

    pub const fn optional<T: Entity>(name: &'static str) -> Self {
        Self::new::<T>(name, ChildKind::Optional)
    }

    pub const fn list<T: Entity>(name: &'static str) -> Self {
        Self::new::<T>(name, ChildKind::List)
    }

    const fn new<T: Entity>(name: &'static str, kind: ChildKind) -> Self {
        Self {
            name,
            kind,
            descriptor: EntityDescriptor::of::<T>,
        }
    }
}

/// A typed, serde-backed record that can live in an entity tree.
pub trait Entity: Serialize + DeserializeOwned + 'static {
    /// Stable discriminator stored with every record. Defaults to the
    /// declared type name.
    fn entity_type() -> &'static str {
        short_type_name::<Self>()
    }

    /// Index name to key-source fields. Empty means the entity is in no index.
    fn index_definitions() -> IndexDefinitions {
        IndexDefinitions::new()
    }

    /// Nested entities are only ever persisted as part of a root's write.
    fn is_nested() -> bool {
        false
    }

    /// Entity-valued fields, in the order [`Entity::children`] yields them.
    fn child_fields() -> &'static [ChildField] {
        &[]
    }

    /// Fields excluded from the change-tracking fingerprint.
    fn ignore_tracking_fields() -> &'static [&'static str] {
        &[]
    }

    fn include_type_in_sort_key() -> bool {
        true
    }

    /// Use the type tag as the leading partition key source of every index.
    fn type_is_partition_key() -> bool {
        false
    }

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Whether this node should be written. Nested entities are also
    /// excluded when any ancestor is.
    fn should_write_to_database(&self) -> bool {
        true
    }

    /// Explicit tracking switch. `None` tracks roots only; `Some(_)` applies
    /// to this node and everything beneath it.
    fn track_changes(&self) -> Option<bool> {
        None
    }

    fn children(&self) -> Vec<Child<'_>> {
        Vec::new()
    }

    fn children_mut(&mut self) -> Vec<ChildMut<'_>> {
        Vec::new()
    }
}

/// Object-safe view of an [`Entity`] used by the hierarchy engine.
///
/// Implemented for every `Entity`; not meant to be implemented by hand.
pub trait Node {
    fn type_tag(&self) -> &'static str;
    fn descriptor(&self) -> EntityDescriptor;
    fn entity_meta(&self) -> &EntityMeta;
    fn entity_meta_mut(&mut self) -> &mut EntityMeta;
    fn write_requested(&self) -> bool;
    fn tracking_override(&self) -> Option<bool>;
    fn child_nodes(&self) -> Vec<Child<'_>>;
    fn child_nodes_mut(&mut self) -> Vec<ChildMut<'_>>;
    fn to_json(&self) -> Result<Value, serde_json::Error>;
}

impl<T: Entity> Node for T {
    fn type_tag(&self) -> &'static str {
        T::entity_type()
    }

    fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor::of::<T>()
    }

    fn entity_meta(&self) -> &EntityMeta {
        self.meta()
    }

    fn entity_meta_mut(&mut self) -> &mut EntityMeta {
        self.meta_mut()
    }

    fn write_requested(&self) -> bool {
        self.should_write_to_database()
    }

    fn tracking_override(&self) -> Option<bool> {
        self.track_changes()
    }

    fn child_nodes(&self) -> Vec<Child<'_>> {
        self.children()
    }

    fn child_nodes_mut(&mut self) -> Vec<ChildMut<'_>> {
        self.children_mut()
    }

    fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Last path segment of a type name, without generic arguments.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

pub struct Child<'a> {
    pub field: &'static str,
    pub node: &'a dyn Node,
}

pub struct ChildMut<'a> {
    pub field: &'static str,
    pub node: &'a mut dyn Node,
}

/// Collects child slots for [`Entity::children`].
#[derive(Default)]
pub struct Children<'a> {
    slots: Vec<Child<'a>>,
}

impl<'a> Children<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn one<T: Entity>(mut self, field: &'static str, child: &'a T) -> Self {
        self.slots.push(Child { field, node: child });
        self
    }

    pub fn optional<T: Entity>(self, field: &'static str, child: Option<&'a T>) -> Self {
        self.many(field, child)
    }

    pub fn many<T: Entity>(
        mut self,
        field: &'static str,
        children: impl IntoIterator<Item = &'a T>,
    ) -> Self {
        for child in children {
            self.slots.push(Child { field, node: child });
        }
        self
    }

    pub fn finish(self) -> Vec<Child<'a>> {
        self.slots
    }
}

/// Collects mutable child slots for [`Entity::children_mut`].
#[derive(Default)]
pub struct ChildrenMut<'a> {
    slots: Vec<ChildMut<'a>>,
}

impl<'a> ChildrenMut<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn one<T: Entity>(mut self, field: &'static str, child: &'a mut T) -> Self {
        self.slots.push(ChildMut { field, node: child });
        self
    }

    pub fn optional<T: Entity>(self, field: &'static str, child: Option<&'a mut T>) -> Self {
        self.many(field, child)
    }

    pub fn many<T: Entity>(
        mut self,
        field: &'static str,
        children: impl IntoIterator<Item = &'a mut T>,
    ) -> Self {
        for child in children {
            self.slots.push(ChildMut { field, node: child });
        }
        self
    }

    pub fn finish(self) -> Vec<ChildMut<'a>> {
        self.slots
    }
}

/// Weak back-reference from a child to its owning entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentLink {
    pub id: String,
    pub field: String,
}

/// Resolved, inherited state of a node within its current tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeState {
    /// This node and every ancestor agree to be written.
    pub write_enabled: bool,
    /// This node or an ancestor is marked for deletion.
    pub deleted: bool,
    pub tracked: bool,
    /// Nearest explicit tracking override on the path from the root.
    pub tracking_override: Option<bool>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            write_enabled: true,
            deleted: false,
            tracked: true,
            tracking_override: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Baseline {
    pub fields: Option<u64>,
    pub placement: Option<u64>,
}

/// Identity, computed index keys and runtime bookkeeping of an entity.
///
/// Only `id` and the computed keys (as `__keys`) are serialized. Equality
/// and hashing consider the `id` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMeta {
    #[serde(default = "generate_id")]
    id: String,
    #[serde(rename = "__keys", default, skip_serializing_if = "BTreeMap::is_empty")]
    keys: BTreeMap<String, Value>,
    #[serde(skip)]
    pub(crate) parent: Option<ParentLink>,
    #[serde(skip)]
    pub(crate) state: NodeState,
    #[serde(skip)]
    pub(crate) baseline: Baseline,
    #[serde(skip)]
    marked_for_delete: bool,
    #[serde(skip)]
    pub(crate) persisted: bool,
    #[serde(skip)]
    pub(crate) snapshot: Option<SnapshotKeys>,
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl EntityMeta {
    pub fn new() -> Self {
        Self::with_id(generate_id())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keys: BTreeMap::new(),
            parent: None,
            state: NodeState::default(),
            baseline: Baseline::default(),
            marked_for_delete: false,
            persisted: false,
            snapshot: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    /// Computed value of a physical index attribute, e.g. `"gsi_sk"`.
    pub fn index_key(&self, attribute: &str) -> Option<&Value> {
        self.keys.get(attribute)
    }

    pub fn index_keys(&self) -> &BTreeMap<String, Value> {
        &self.keys
    }

    pub(crate) fn set_index_keys(&mut self, keys: BTreeMap<String, Value>) {
        self.keys = keys;
    }

    /// Delete this node, and everything beneath it, on the next save.
    pub fn mark_for_delete(&mut self) {
        self.marked_for_delete = true;
    }

    pub fn is_marked_for_delete(&self) -> bool {
        self.marked_for_delete
    }

    /// True when this node or any ancestor is marked for deletion, as of the
    /// last time the tree was walked.
    pub fn should_delete(&self) -> bool {
        self.marked_for_delete || self.state.deleted
    }

    /// Whether the record was loaded from, or written to, the store.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }
}

impl Default for EntityMeta {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for EntityMeta {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityMeta {}

impl Hash for EntityMeta {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

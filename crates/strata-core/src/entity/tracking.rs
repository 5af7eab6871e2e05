//! Change tracking.
//!
//! A fingerprint is an xxh64 hash over an entity's own serialized fields in
//! sorted order. Child fields, internal fields (leading `_`, which covers
//! the computed `__keys`) and the entity's ignored fields do not contribute,
//! so edits inside a subtree never mark its ancestors as modified. An entity
//! that cannot be serialized has no fingerprint and always counts as
//! modified.

use serde_json::Value;
use tracing::warn;
use xxhash_rust::xxh64::Xxh64;

use super::{EntityMeta, Node};
use crate::catalog::EntityDescriptor;

pub fn fingerprint(node: &dyn Node) -> Option<u64> {
    let descriptor = node.descriptor();
    let mut hasher = Xxh64::new(0);
    match node.to_json() {
        Ok(Value::Object(fields)) => {
            let mut names: Vec<&String> = fields
                .keys()
                .filter(|name| is_tracked_field(name, &descriptor))
                .collect();
            names.sort();
            for name in names {
                hasher.update(name.as_bytes());
                hash_value(&mut hasher, &fields[name.as_str()]);
            }
        }
        Ok(other) => hash_value(&mut hasher, &other),
        Err(err) => {
            warn!(
                entity = node.type_tag(),
                id = node.entity_meta().id(),
                error = %err,
                "entity could not be serialized; treating it as modified"
            );
            return None;
        }
    }
    Some(hasher.digest())
}

fn is_tracked_field(name: &str, descriptor: &EntityDescriptor) -> bool {
    !name.starts_with('_')
        && !descriptor.child_fields.iter().any(|f| f.name == name)
        && !descriptor.ignore_tracking_fields.contains(&name)
}

fn hash_value(hasher: &mut Xxh64, value: &Value) {
    match value {
        Value::Null => hasher.update(&[0]),
        Value::Bool(b) => hasher.update(&[1, u8::from(*b)]),
        Value::Number(n) => {
            hasher.update(&[2]);
            hasher.update(n.to_string().as_bytes());
        }
        Value::String(s) => {
            hasher.update(&[3]);
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update(&[4]);
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                hash_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update(&[5]);
            hasher.update(&(map.len() as u64).to_le_bytes());
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (k, v) in entries {
                hasher.update(k.as_bytes());
                hash_value(hasher, v);
            }
        }
    }
}

/// Hash of a node's parent link and computed index keys.
pub(crate) fn placement_fingerprint(meta: &EntityMeta) -> u64 {
    let mut hasher = Xxh64::new(0);
    if let Some(parent) = meta.parent() {
        hasher.update(parent.id.as_bytes());
        hasher.update(&[0]);
        hasher.update(parent.field.as_bytes());
    }
    for (name, value) in meta.index_keys() {
        hasher.update(name.as_bytes());
        hash_value(&mut hasher, value);
    }
    hasher.digest()
}

/// Tracking decision for a node: the nearest explicit override wins,
/// otherwise only roots are tracked.
pub(crate) fn resolve_tracking(
    own: Option<bool>,
    inherited: Option<bool>,
    is_root: bool,
) -> (bool, Option<bool>) {
    let effective = own.or(inherited);
    (effective.unwrap_or(is_root), effective)
}

/// Capture the baseline fingerprint of a single node.
pub fn init_tracking(node: &mut dyn Node) {
    let baseline = if node.entity_meta().state.tracked {
        fingerprint(&*node)
    } else {
        None
    };
    node.entity_meta_mut().baseline.fields = baseline;
}

pub(crate) fn capture_placement(meta: &mut EntityMeta) {
    meta.baseline.placement = Some(placement_fingerprint(meta));
}

/// Whether the node's own fields changed since its baseline. Untracked
/// nodes always report `true`.
pub fn was_modified(node: &dyn Node) -> bool {
    let meta = node.entity_meta();
    if !meta.state.tracked {
        return true;
    }
    match (meta.baseline.fields, fingerprint(node)) {
        (Some(baseline), Some(current)) => current != baseline,
        _ => true,
    }
}

pub(crate) fn placement_changed(meta: &EntityMeta) -> bool {
    meta.baseline.placement != Some(placement_fingerprint(meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Child, ChildField, ChildMut, Children, ChildrenMut, Entity};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, Serialize, Deserialize)]
    struct Note {
        #[serde(flatten)]
        meta: EntityMeta,
        text: String,
    }

    impl Entity for Note {
        fn is_nested() -> bool {
            true
        }

        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Board {
        #[serde(flatten)]
        meta: EntityMeta,
        title: String,
        views: u64,
        #[serde(default)]
        notes: Vec<Note>,
    }

    impl Entity for Board {
        fn child_fields() -> &'static [ChildField] {
            const FIELDS: &[ChildField] = &[ChildField::list::<Note>("notes")];
            FIELDS
        }

        fn ignore_tracking_fields() -> &'static [&'static str] {
            &["views"]
        }

        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }

        fn children(&self) -> Vec<Child<'_>> {
            Children::new().many("notes", &self.notes).finish()
        }

        fn children_mut(&mut self) -> Vec<ChildMut<'_>> {
            ChildrenMut::new().many("notes", &mut self.notes).finish()
        }
    }

    fn board() -> Board {
        Board {
            meta: EntityMeta::with_id("b1"),
            title: "plans".into(),
            views: 0,
            notes: vec![Note {
                meta: EntityMeta::with_id("n1"),
                text: "first".into(),
            }],
        }
    }

    #[test]
    fn test_fingerprint_ignores_children_and_ignored_fields() {
        let mut b = board();
        let before = fingerprint(&b);
        b.views = 99;
        b.notes[0].text = "changed".into();
        b.notes.push(Note {
            meta: EntityMeta::with_id("n2"),
            text: "second".into(),
        });
        assert_eq!(fingerprint(&b), before);

        b.title = "other".into();
        assert_ne!(fingerprint(&b), before);
    }

    #[test]
    fn test_fingerprint_ignores_computed_keys() {
        let mut b = board();
        let before = fingerprint(&b);
        let mut keys = BTreeMap::new();
        keys.insert("gsi_pk".to_string(), Value::from("x"));
        b.meta.set_index_keys(keys);
        assert_eq!(fingerprint(&b), before);
    }

    #[test]
    fn test_was_modified_after_baseline() {
        let mut b = board();
        init_tracking(&mut b);
        assert!(!was_modified(&b));
        b.title = "renamed".into();
        assert!(was_modified(&b));
    }

    #[test]
    fn test_untracked_node_reports_modified() {
        let mut b = board();
        b.meta.state.tracked = false;
        init_tracking(&mut b);
        assert!(was_modified(&b));
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Tally {
        #[serde(flatten)]
        meta: EntityMeta,
        counts: BTreeMap<Vec<u8>, u32>,
    }

    impl Entity for Tally {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    #[test]
    fn test_unserializable_entity_is_always_modified() {
        let mut tally = Tally {
            meta: EntityMeta::with_id("t1"),
            counts: BTreeMap::from([(vec![1, 2], 3)]),
        };
        assert!(fingerprint(&tally).is_none());

        init_tracking(&mut tally);
        assert!(tally.meta.baseline.fields.is_none());
        assert!(was_modified(&tally));
    }

    #[test]
    fn test_resolve_tracking() {
        assert_eq!(resolve_tracking(None, None, true), (true, None));
        assert_eq!(resolve_tracking(None, None, false), (false, None));
        assert_eq!(resolve_tracking(None, Some(true), false), (true, Some(true)));
        assert_eq!(resolve_tracking(Some(false), Some(true), false), (false, Some(false)));
        assert_eq!(resolve_tracking(Some(false), None, true), (false, Some(false)));
    }

    #[test]
    fn test_placement_changes_with_keys() {
        let mut meta = EntityMeta::with_id("a");
        capture_placement(&mut meta);
        assert!(!placement_changed(&meta));
        let mut keys = BTreeMap::new();
        keys.insert("gsi_sk".to_string(), Value::from("Root|a"));
        meta.set_index_keys(keys);
        assert!(placement_changed(&meta));
    }
}

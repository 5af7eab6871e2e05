//! Snapshot key sets and save plans.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::types::ItemKey;

/// Primary keys of every node of a tree as of its last save or load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotKeys {
    keys: BTreeMap<String, ItemKey>,
}

impl SnapshotKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ItemKey) {
        self.keys.insert(key.canonical(), key);
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.keys.contains_key(&key.canonical())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemKey> {
        self.keys.values()
    }

    /// Keys present here but in neither `current` nor `excluded`.
    pub fn removed_since(&self, current: &SnapshotKeys, excluded: &SnapshotKeys) -> Vec<ItemKey> {
        self.keys
            .iter()
            .filter(|(canonical, _)| {
                !current.keys.contains_key(*canonical) && !excluded.keys.contains_key(*canonical)
            })
            .map(|(_, key)| key.clone())
            .collect()
    }
}

impl FromIterator<ItemKey> for SnapshotKeys {
    fn from_iter<I: IntoIterator<Item = ItemKey>>(iter: I) -> Self {
        let mut keys = SnapshotKeys::new();
        for key in iter {
            keys.insert(key);
        }
        keys
    }
}

/// Writes needed to bring the store in line with an in-memory tree.
///
/// Groups execute in field order: deletes by key, deletes by item, puts.
#[derive(Debug, Clone, Default)]
pub struct SavePlan {
    /// Keys of the previous snapshot no longer reachable from the tree.
    pub deletes_by_key: Vec<ItemKey>,
    /// Keys of nodes marked for deletion, directly or through an ancestor.
    pub deletes_by_item: Vec<ItemKey>,
    pub puts: Vec<Value>,
    pub put_ids: Vec<String>,
    /// Nodes left alone: not writable, or unchanged since the last save.
    pub skipped: Vec<String>,
    /// Snapshot to install once the plan has executed.
    pub snapshot: SnapshotKeys,
}

impl SavePlan {
    pub fn is_empty(&self) -> bool {
        self.deletes_by_key.is_empty() && self.deletes_by_item.is_empty() && self.puts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_since() {
        let previous: SnapshotKeys = ["a", "b", "c", "d"].into_iter().map(ItemKey::new).collect();
        let current: SnapshotKeys = ["a", "c"].into_iter().map(ItemKey::new).collect();
        let marked: SnapshotKeys = std::iter::once(ItemKey::new("d")).collect();
        assert_eq!(previous.removed_since(&current, &marked), vec![ItemKey::new("b")]);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut keys = SnapshotKeys::new();
        keys.insert(ItemKey::new("a").with_sort("x"));
        keys.insert(ItemKey::new("a").with_sort("x"));
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&ItemKey::new("a").with_sort("x")));
        assert!(!keys.contains(&ItemKey::new("a")));
    }
}

mod common;

use common::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strata_core::entity::{
    Entity, EntityMeta, IndexDefinitions, IndexFields, Node, was_modified,
};
use strata_core::error::{Error, HierarchyError, SchemaError};
use strata_core::hierarchy::record::to_record;

fn sort_key(meta: &EntityMeta) -> &str {
    meta.index_key("gsi_sk").and_then(Value::as_str).unwrap()
}

fn partition_key(meta: &EntityMeta) -> &str {
    meta.index_key("gsi_pk").and_then(Value::as_str).unwrap()
}

// ---------------------------------------------------------------------------
// Index keys
// ---------------------------------------------------------------------------

#[test]
fn test_sort_keys_are_materialized_paths() {
    let table = table();
    let h = table.hierarchy();
    let mut root = three_level();
    h.prepare(&mut root).unwrap();
    h.build_model_indexes(&mut root).unwrap();

    assert_eq!(sort_key(&root.meta), "Root|r");
    assert_eq!(sort_key(&root.mids[0].meta), "Root|r|Mid|m");
    assert_eq!(sort_key(&root.mids[0].leaves[0].meta), "Root|r|Mid|m|Leaf|l");
}

#[test]
fn test_partition_key_inherited_by_descendants() {
    let table = table();
    let h = table.hierarchy();
    let mut root = three_level();
    h.prepare(&mut root).unwrap();
    h.build_model_indexes(&mut root).unwrap();

    assert_eq!(partition_key(&root.meta), "owner1");
    assert_eq!(partition_key(&root.mids[0].meta), "owner1");
    assert_eq!(partition_key(&root.mids[0].leaves[0].meta), "owner1");
}

#[test]
fn test_build_model_indexes_is_idempotent() {
    let table = table();
    let h = table.hierarchy();
    let mut root = three_level();
    h.prepare(&mut root).unwrap();
    h.build_model_indexes(&mut root).unwrap();
    let first: Vec<_> = h
        .split_to_simple_objects(&root)
        .iter()
        .map(|n| n.entity_meta().index_keys().clone())
        .collect();

    h.build_model_indexes(&mut root).unwrap();
    let second: Vec<_> = h
        .split_to_simple_objects(&root)
        .iter()
        .map(|n| n.entity_meta().index_keys().clone())
        .collect();
    assert_eq!(first, second);
}

#[test]
fn test_type_as_partition_key_leaves_sort_key_bare() {
    let table = table();
    let mut card = TypedCard {
        meta: EntityMeta::with_id("c1"),
        player_id: "123".into(),
        tier: "LEGENDARY".into(),
    };
    table.hierarchy().build_model_indexes(&mut card).unwrap();
    assert_eq!(partition_key(&card.meta), "my-type|123");
    assert_eq!(sort_key(&card.meta), "LEGENDARY");
}

#[test]
fn test_type_as_sort_field_is_not_duplicated() {
    let table = table();
    let mut card = TaggedCard {
        meta: EntityMeta::with_id("c1"),
        player_id: "123".into(),
        tier: "LEGENDARY".into(),
    };
    table.hierarchy().build_model_indexes(&mut card).unwrap();
    assert_eq!(sort_key(&card.meta), "tagged|LEGENDARY");
}

#[derive(Debug, Serialize, Deserialize)]
struct Ambiguous {
    #[serde(flatten)]
    meta: EntityMeta,
    player_id: String,
    tier: String,
    name: String,
}

impl Entity for Ambiguous {
    fn index_definitions() -> IndexDefinitions {
        IndexDefinitions::new().index(
            "main-index",
            IndexFields::new()
                .pk("player_id")
                .sk_ordered("tier", 1)
                .sk_ordered("name", 1),
        )
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

#[test]
fn test_duplicate_sort_order_rejected_on_register() {
    let table = table();
    let err = table.register::<Ambiguous>().unwrap_err();
    assert!(matches!(
        err,
        Error::Schema(SchemaError::SortKeyOrder { .. })
    ));
}

#[test]
fn test_missing_partition_value_rejected() {
    let table = table();
    let mut card = card("c1", "", "LEGENDARY");
    let err = table.hierarchy().build_model_indexes(&mut card).unwrap_err();
    assert!(matches!(
        err,
        Error::Schema(SchemaError::IncorrectHashKey { .. })
    ));
}

// ---------------------------------------------------------------------------
// Parent references and reparenting
// ---------------------------------------------------------------------------

#[test]
fn test_parent_references_link_every_child() {
    let table = table();
    let mut root = three_level();
    table.prepare(&mut root).unwrap();

    assert!(root.meta.parent().is_none());
    let mid_parent = root.mids[0].meta.parent().unwrap();
    assert_eq!((mid_parent.id.as_str(), mid_parent.field.as_str()), ("r", "mids"));
    let leaf_parent = root.mids[0].leaves[0].meta.parent().unwrap();
    assert_eq!((leaf_parent.id.as_str(), leaf_parent.field.as_str()), ("m", "leaves"));
}

#[test]
fn test_reparent_moves_subtree_keys() {
    let table = table();
    let h = table.hierarchy();
    let mut root = three_level();
    root.mids.push(mid("m2", "m2", Vec::new()));
    h.prepare(&mut root).unwrap();
    h.build_model_indexes(&mut root).unwrap();

    let moved = root.mids[0].leaves.remove(0);
    root.mids[1].leaves.push(moved);
    h.reparent_subtree(&mut root.mids[1], "leaves", "l").unwrap();

    let leaf = &root.mids[1].leaves[0];
    assert_eq!(leaf.meta.parent().unwrap().id, "m2");
    assert_eq!(sort_key(&leaf.meta), "Root|r|Mid|m2|Leaf|l");
    assert_eq!(partition_key(&leaf.meta), "owner1");
}

#[test]
fn test_reparent_unknown_child_fails() {
    let table = table();
    let h = table.hierarchy();
    let mut root = three_level();
    h.prepare(&mut root).unwrap();

    let err = h.reparent_subtree(&mut root.mids[0], "leaves", "nope").unwrap_err();
    assert!(matches!(
        err,
        Error::Hierarchy(HierarchyError::ChildNotFound { .. })
    ));
}

#[test]
fn test_add_child_node_requires_declared_field() {
    let table = table();
    let h = table.hierarchy();
    let mut root = three_level();
    h.prepare(&mut root).unwrap();
    h.build_model_indexes(&mut root).unwrap();

    root.mids[0].leaves.push(leaf("l2", "l2"));
    h.add_child_node(&mut root.mids[0], "leaves", "l2").unwrap();
    assert_eq!(sort_key(&root.mids[0].leaves[1].meta), "Root|r|Mid|m|Leaf|l2");

    let err = h.add_child_node(&mut root.mids[0], "twigs", "l2").unwrap_err();
    assert!(matches!(
        err,
        Error::Hierarchy(HierarchyError::ChildNotFound { .. })
    ));
}

// ---------------------------------------------------------------------------
// Change tracking
// ---------------------------------------------------------------------------

#[test]
fn test_root_tracking_ignores_child_edits() {
    let table = table();
    let mut root = three_level();
    table.prepare(&mut root).unwrap();
    assert!(!was_modified(&root));

    root.mids[0].leaves[0].name = "renamed".into();
    assert!(!was_modified(&root));

    root.name = "renamed".into();
    assert!(was_modified(&root));
}

#[test]
fn test_untracked_children_always_report_modified() {
    let table = table();
    let mut root = three_level();
    table.prepare(&mut root).unwrap();
    assert!(was_modified(&root.mids[0]));
    assert!(was_modified(&root.mids[0].leaves[0]));
}

#[test]
fn test_tracking_override_is_inherited() {
    let table = table();
    let mut folder = folder(vec![doc("d1", true, &["a"])]);
    table.prepare(&mut folder).unwrap();
    assert!(!was_modified(&folder.docs[0]));
    assert!(!was_modified(&folder.docs[0].notes[0]));

    folder.docs[0].notes[0].text = "b".into();
    assert!(was_modified(&folder.docs[0].notes[0]));
    assert!(!was_modified(&folder.docs[0]));
}

// ---------------------------------------------------------------------------
// Save planning
// ---------------------------------------------------------------------------

#[test]
fn test_plan_skips_disabled_subtrees() {
    let table = table();
    let h = table.hierarchy();
    let mut folder = folder(vec![doc("d1", true, &["a"]), doc("d2", false, &["b"])]);
    h.prepare(&mut folder).unwrap();
    h.build_model_indexes(&mut folder).unwrap();

    let plan = h.plan_save(&folder).unwrap();
    assert_eq!(plan.put_ids, vec!["f", "d1", "d1-a"]);
    assert_eq!(plan.skipped, vec!["d2", "d2-b"]);
}

#[test]
fn test_plan_deletes_marked_subtree_by_item() {
    let table = table();
    let h = table.hierarchy();
    let mut root = three_level();
    root.mids[0].meta.mark_for_delete();
    h.prepare(&mut root).unwrap();
    h.build_model_indexes(&mut root).unwrap();

    let plan = h.plan_save(&root).unwrap();
    let deleted: Vec<String> = plan
        .deletes_by_item
        .iter()
        .map(|key| key.partition.as_str().unwrap().to_string())
        .collect();
    assert_eq!(deleted, vec!["m", "l"]);
    assert_eq!(plan.put_ids, vec!["r"]);
    assert!(root.mids[0].leaves[0].meta.should_delete());
}

// ---------------------------------------------------------------------------
// Reconstruction
// ---------------------------------------------------------------------------

#[test]
fn test_reconstruct_round_trip() {
    let table = table();
    table.register::<Root>().unwrap();
    let h = table.hierarchy();
    let mut root = three_level();
    root.mids[0].leaves.push(leaf("l2", "l2"));
    root.mids.push(mid("m2", "m2", Vec::new()));
    h.prepare(&mut root).unwrap();
    h.build_model_indexes(&mut root).unwrap();

    let mut records: Vec<Value> = h
        .split_to_simple_objects(&root)
        .into_iter()
        .map(|node| to_record(node, &node.descriptor()).unwrap())
        .collect();
    records.reverse();

    let doc = h.reconstruct_hierarchy(records).unwrap().unwrap();
    let rebuilt: Root = serde_json::from_value(doc).unwrap();
    assert_eq!(rebuilt.name, "r");
    assert_eq!(rebuilt.meta.id(), "r");
    let mids: Vec<&str> = rebuilt.mids.iter().map(|m| m.name.as_str()).collect();
    // Siblings keep their order among the input records.
    assert_eq!(mids, vec!["m2", "m"]);
    let leaves: Vec<&str> = rebuilt.mids[1].leaves.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(leaves, vec!["l2", "l"]);
    assert!(rebuilt.mids[0].leaves.is_empty());
}

#[test]
fn test_reconstruct_without_root_is_none() {
    let table = table();
    table.register::<Root>().unwrap();
    let records = vec![json!({
        "id": "m",
        "__type": "Mid",
        "__parent_id": "r",
        "__parent_field": "mids",
        "name": "m",
    })];
    assert!(table.hierarchy().reconstruct_hierarchy(records).unwrap().is_none());
    assert!(table.hierarchy().reconstruct_hierarchy(Vec::new()).unwrap().is_none());
}

#[test]
fn test_reconstruct_rejects_multiple_roots() {
    let table = table();
    table.register::<Root>().unwrap();
    let records = vec![
        json!({"id": "a", "__type": "Root", "owner": "o", "name": "a"}),
        json!({"id": "b", "__type": "Root", "owner": "o", "name": "b"}),
    ];
    let err = table.hierarchy().reconstruct_hierarchy(records).unwrap_err();
    match err {
        Error::Hierarchy(HierarchyError::MultipleRoots { ids }) => {
            assert_eq!(ids, vec!["a", "b"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use strata_core::Table;
use strata_core::config::TableConfig;
use strata_core::entity::{
    Child, ChildField, ChildMut, Children, ChildrenMut, Entity, EntityMeta, IndexDefinitions,
    IndexFields,
};
use strata_core::store::MemoryStore;
use strata_core::types::{Key, SecondaryIndex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn config() -> TableConfig {
    TableConfig::builder("game")
        .index(SecondaryIndex::new(
            "main-index",
            Key::string("gsi_pk"),
            Key::string("gsi_sk"),
        ))
        .build()
        .unwrap()
}

pub fn table() -> Table<MemoryStore> {
    table_with(MemoryStore::new())
}

pub fn table_with(store: MemoryStore) -> Table<MemoryStore> {
    init_tracing();
    let table = Table::new(config(), store).unwrap();
    table.create().unwrap();
    table
}

// ---------------------------------------------------------------------------
// Flat root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub player_id: String,
    pub tier: String,
    #[serde(default)]
    pub level: i64,
}

impl Entity for Card {
    fn index_definitions() -> IndexDefinitions {
        IndexDefinitions::new()
            .index("main-index", IndexFields::new().pk("player_id").sk("tier"))
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

pub fn card(id: &str, player_id: &str, tier: &str) -> Card {
    Card {
        meta: EntityMeta::with_id(id),
        player_id: player_id.into(),
        tier: tier.into(),
        level: 1,
    }
}

// ---------------------------------------------------------------------------
// Three-level tree: Root -> Mid -> Leaf
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub mids: Vec<Mid>,
}

impl Entity for Root {
    fn index_definitions() -> IndexDefinitions {
        IndexDefinitions::new().index("main-index", IndexFields::new().pk("owner").sk("name"))
    }

    fn child_fields() -> &'static [ChildField] {
        const FIELDS: &[ChildField] = &[ChildField::list::<Mid>("mids")];
        FIELDS
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn children(&self) -> Vec<Child<'_>> {
        Children::new().many("mids", &self.mids).finish()
    }

    fn children_mut(&mut self) -> Vec<ChildMut<'_>> {
        ChildrenMut::new().many("mids", &mut self.mids).finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mid {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
    #[serde(default)]
    pub leaves: Vec<Leaf>,
}

impl Entity for Mid {
    fn index_definitions() -> IndexDefinitions {
        IndexDefinitions::new().index("main-index", IndexFields::new().sk("name"))
    }

    fn is_nested() -> bool {
        true
    }

    fn child_fields() -> &'static [ChildField] {
        const FIELDS: &[ChildField] = &[ChildField::list::<Leaf>("leaves")];
        FIELDS
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn children(&self) -> Vec<Child<'_>> {
        Children::new().many("leaves", &self.leaves).finish()
    }

    fn children_mut(&mut self) -> Vec<ChildMut<'_>> {
        ChildrenMut::new().many("leaves", &mut self.leaves).finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaf {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
}

impl Entity for Leaf {
    fn index_definitions() -> IndexDefinitions {
        IndexDefinitions::new().index("main-index", IndexFields::new().sk("name"))
    }

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

pub fn leaf(id: &str, name: &str) -> Leaf {
    Leaf {
        meta: EntityMeta::with_id(id),
        name: name.into(),
    }
}

pub fn mid(id: &str, name: &str, leaves: Vec<Leaf>) -> Mid {
    Mid {
        meta: EntityMeta::with_id(id),
        name: name.into(),
        leaves,
    }
}

/// `owner1 / r -> m -> l`, with ids equal to names.
pub fn three_level() -> Root {
    Root {
        meta: EntityMeta::with_id("r"),
        owner: "owner1".into(),
        name: "r".into(),
        mids: vec![mid("m", "m", vec![leaf("l", "l")])],
    }
}

// ---------------------------------------------------------------------------
// Type tag as a key source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedCard {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub player_id: String,
    pub tier: String,
}

impl Entity for TypedCard {
    fn entity_type() -> &'static str {
        "my-type"
    }

    fn index_definitions() -> IndexDefinitions {
        IndexDefinitions::new()
            .index("main-index", IndexFields::new().pk("player_id").sk("tier"))
    }

    fn type_is_partition_key() -> bool {
        true
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedCard {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub player_id: String,
    pub tier: String,
}

impl Entity for TaggedCard {
    fn entity_type() -> &'static str {
        "tagged"
    }

    fn index_definitions() -> IndexDefinitions {
        IndexDefinitions::new().index(
            "main-index",
            IndexFields::new()
                .pk("player_id")
                .sk_ordered("__type", 0)
                .sk_ordered("tier", 1),
        )
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

// ---------------------------------------------------------------------------
// Write enablement and descendant tracking
// ---------------------------------------------------------------------------

/// A folder tracks changes on itself and every document beneath it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub docs: Vec<Doc>,
}

impl Entity for Folder {
    fn index_definitions() -> IndexDefinitions {
        IndexDefinitions::new().index("main-index", IndexFields::new().pk("owner").sk("name"))
    }

    fn child_fields() -> &'static [ChildField] {
        const FIELDS: &[ChildField] = &[ChildField::list::<Doc>("docs")];
        FIELDS
    }

    fn track_changes(&self) -> Option<bool> {
        Some(true)
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn children(&self) -> Vec<Child<'_>> {
        Children::new().many("docs", &self.docs).finish()
    }

    fn children_mut(&mut self) -> Vec<ChildMut<'_>> {
        ChildrenMut::new().many("docs", &mut self.docs).finish()
    }
}

/// Drafts are never written; neither is anything attached to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doc {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub title: String,
    pub published: bool,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Entity for Doc {
    fn index_definitions() -> IndexDefinitions {
        IndexDefinitions::new().index("main-index", IndexFields::new().sk("title"))
    }

    fn is_nested() -> bool {
        true
    }

    fn child_fields() -> &'static [ChildField] {
        const FIELDS: &[ChildField] = &[ChildField::list::<Note>("notes")];
        FIELDS
    }

    fn should_write_to_database(&self) -> bool {
        self.published
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub text: String,
}

impl Entity for Note {
    fn index_definitions() -> IndexDefinitions {
        IndexDefinitions::new().index("main-index", IndexFields::new().sk("text"))
    }

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

pub fn doc(id: &str, published: bool, notes: &[&str]) -> Doc {
    Doc {
        meta: EntityMeta::with_id(id),
        title: id.into(),
        published,
        notes: notes
            .iter()
            .map(|text| Note {
                meta: EntityMeta::with_id(format!("{id}-{text}")),
                text: (*text).into(),
            })
            .collect(),
    }
}

pub fn folder(docs: Vec<Doc>) -> Folder {
    Folder {
        meta: EntityMeta::with_id("f"),
        owner: "owner1".into(),
        name: "inbox".into(),
        docs,
    }
}

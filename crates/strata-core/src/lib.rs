//! # Strata
//!
//! Hierarchical entity mapping over a single-table, DynamoDB-style store.
//!
//! Strata stores a tree of nested entities as flat records in one
//! partition. Every record carries computed secondary-index keys: the
//! partition key is shared by the whole tree and the sort key is a
//! materialized path from the root. Saves write only what changed since the
//! last save or load, and a range query over a root's path rebuilds the
//! original tree.
//!
//! ## Quick Start
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use strata_core::api::{KeyCondition, Table};
//! use strata_core::config::TableConfig;
//! use strata_core::entity::{Entity, EntityMeta, IndexDefinitions, IndexFields};
//! use strata_core::store::MemoryStore;
//! use strata_core::types::{Key, SecondaryIndex};
//!
//! #[derive(Debug, Serialize, Deserialize)]
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
//! let config = TableConfig::builder("game")
//!     .index(SecondaryIndex::new(
//!         "main-index",
//!         Key::string("gsi_pk"),
//!         Key::string("gsi_sk"),
//!     ))
//!     .build()
//!     .unwrap();
//! let table = Table::new(config, MemoryStore::new()).unwrap();
//! table.create().unwrap();
//!
//! let mut card = Card {
//!     meta: EntityMeta::new(),
//!     player_id: "123".into(),
//!     tier: "LEGENDARY".into(),
//! };
//! table.put(&mut card).unwrap();
//!
//! let found: Vec<Card> = table
//!     .query::<Card>()
//!     .partition_key("123")
//!     .sort_key(KeyCondition::begins_with("LEG"))
//!     .execute()
//!     .unwrap()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].tier, "LEGENDARY");
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod entity;
pub mod error;
pub mod hierarchy;
pub mod store;
pub mod types;

pub use api::Table;
pub use error::{Error, Result};

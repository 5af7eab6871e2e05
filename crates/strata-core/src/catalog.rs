//! Catalog of entity types known to one table gateway.
//!
//! The catalog maps type tags to [`EntityDescriptor`]s. Reconstruction uses
//! it to find each record's child fields; the hierarchy walk registers every
//! type it meets, so trees loaded after a save resolve without explicit
//! registration.

use std::any::TypeId;
use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::config::TableConfig;
use crate::entity::{ChildField, Entity, IndexDefinitions};
use crate::error::{Error, Result, SchemaError};
use crate::types::KeyType;

/// Static description of one entity type.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub type_id: TypeId,
    pub type_tag: &'static str,
    pub nested: bool,
    pub child_fields: &'static [ChildField],
    pub indexes: IndexDefinitions,
    pub include_type_in_sort_key: bool,
    pub ignore_tracking_fields: &'static [&'static str],
}

impl EntityDescriptor {
    pub fn of<T: Entity>() -> Self {
        let indexes = if T::type_is_partition_key() {
            T::index_definitions().with_type_partition()
        } else {
            T::index_definitions()
        };
        Self {
            type_id: TypeId::of::<T>(),
            type_tag: T::entity_type(),
            nested: T::is_nested(),
            child_fields: T::child_fields(),
            indexes,
            include_type_in_sort_key: T::include_type_in_sort_key(),
            ignore_tracking_fields: T::ignore_tracking_fields(),
        }
    }

    pub fn child_field(&self, name: &str) -> Option<&ChildField> {
        self.child_fields.iter().find(|f| f.name == name)
    }

    /// Check the descriptor against the table's configured indexes.
    pub fn validate(&self, config: &TableConfig) -> Result<()> {
        for (name, _) in self.indexes.iter() {
            if !config.has_index(name) {
                return Err(SchemaError::InvalidIndexName(name.to_string()).into());
            }
        }
        self.indexes.validate(self.type_tag)?;
        self.validate_index_attributes(config)
    }

    /// An index attribute may share its name with one of the entity's key
    /// fields only when the computed key is that field's value unchanged.
    fn validate_index_attributes(&self, config: &TableConfig) -> Result<()> {
        for index in &config.indexes {
            let Some(roles) = self.indexes.get(&index.name) else {
                continue;
            };
            let partition = index.partition_key.name.as_str();
            let composite_partition = roles.pk_fields().len() > 1;
            if composite_partition && roles.pk_fields().iter().any(|f| f == partition) {
                return Err(self.attribute_conflict(partition));
            }

            let sort = index.sort_key.name.as_str();
            let prefixed = index.sort_key.key_type == KeyType::String
                && (self.nested
                    || (self.include_type_in_sort_key
                        && !roles.type_is_pk_field()
                        && !roles.type_is_sk_field()));
            let composite_sort = roles.sk_fields().len() > 1 || prefixed;
            if composite_sort && roles.sk_fields().iter().any(|f| f.name == sort) {
                return Err(self.attribute_conflict(sort));
            }
        }
        Ok(())
    }

    fn attribute_conflict(&self, attribute: &str) -> Error {
        SchemaError::IndexAttributeConflict {
            entity: self.type_tag.to_string(),
            attribute: attribute.to_string(),
        }
        .into()
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    types: RwLock<BTreeMap<&'static str, EntityDescriptor>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add `descriptor` together with every type reachable
    /// through its child fields. Re-registering a type replaces it; a type
    /// tag already held by another type is rejected.
    pub fn register(&self, descriptor: EntityDescriptor, config: &TableConfig) -> Result<()> {
        descriptor.validate(config)?;
        let child_fields = descriptor.child_fields;
        {
            let mut types = self.types.write();
            if let Some(existing) = types.get(descriptor.type_tag)
                && existing.type_id != descriptor.type_id
            {
                return Err(SchemaError::DuplicateTypeTag(descriptor.type_tag.to_string()).into());
            }
            types.insert(descriptor.type_tag, descriptor);
        }
        for field in child_fields {
            self.register_if_absent((field.descriptor)(), config)?;
        }
        Ok(())
    }

    /// Add `descriptor` unless its type is already known.
    pub(crate) fn register_if_absent(
        &self,
        descriptor: EntityDescriptor,
        config: &TableConfig,
    ) -> Result<()> {
        let known = self
            .types
            .read()
            .get(descriptor.type_tag)
            .map(|existing| existing.type_id);
        match known {
            Some(type_id) if type_id == descriptor.type_id => Ok(()),
            Some(_) => Err(SchemaError::DuplicateTypeTag(descriptor.type_tag.to_string()).into()),
            None => self.register(descriptor, config),
        }
    }

    pub fn get(&self, type_tag: &str) -> Option<EntityDescriptor> {
        self.types.read().get(type_tag).cloned()
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.types.read().contains_key(type_tag)
    }

    pub fn type_tags(&self) -> Vec<&'static str> {
        self.types.read().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityMeta, IndexFields};
    use crate::error::Error;
    use crate::types::{Key, SecondaryIndex};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Player {
        #[serde(flatten)]
        meta: EntityMeta,
        name: String,
    }

    impl Entity for Player {
        fn entity_type() -> &'static str {
            "player"
        }

        fn index_definitions() -> IndexDefinitions {
            IndexDefinitions::new().index("main-index", IndexFields::new().pk("name"))
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

    fn config() -> TableConfig {
        TableConfig::builder("game")
            .index(SecondaryIndex::new(
                "main-index",
                Key::string("gsi_pk"),
                Key::string("gsi_sk"),
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_descriptor_applies_type_partition() {
        let descriptor = EntityDescriptor::of::<Player>();
        assert_eq!(descriptor.type_tag, "player");
        let fields = descriptor.indexes.get("main-index").unwrap();
        assert_eq!(fields.pk_fields(), ["__type", "name"]);
    }

    #[test]
    fn test_register_and_lookup() {
        let catalog = Catalog::new();
        catalog
            .register(EntityDescriptor::of::<Player>(), &config())
            .unwrap();
        assert!(catalog.contains("player"));
        assert_eq!(catalog.type_tags(), vec!["player"]);
        assert!(catalog.get("Player").is_none());
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Impostor {
        #[serde(flatten)]
        meta: EntityMeta,
        name: String,
    }

    impl Entity for Impostor {
        fn entity_type() -> &'static str {
            "player"
        }

        fn index_definitions() -> IndexDefinitions {
            IndexDefinitions::new().index("main-index", IndexFields::new().pk("name"))
        }

        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    #[test]
    fn test_type_tag_taken_by_other_type() {
        let catalog = Catalog::new();
        catalog
            .register(EntityDescriptor::of::<Player>(), &config())
            .unwrap();
        catalog
            .register(EntityDescriptor::of::<Player>(), &config())
            .unwrap();
        catalog
            .register_if_absent(EntityDescriptor::of::<Player>(), &config())
            .unwrap();

        let err = catalog
            .register(EntityDescriptor::of::<Impostor>(), &config())
            .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::DuplicateTypeTag(ref t)) if t == "player"));
        let err = catalog
            .register_if_absent(EntityDescriptor::of::<Impostor>(), &config())
            .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::DuplicateTypeTag(_))));
        assert_eq!(
            catalog.get("player").unwrap().type_id,
            TypeId::of::<Player>()
        );
    }

    #[test]
    fn test_composite_key_cannot_reuse_field_name() {
        let config = TableConfig::builder("game")
            .index(SecondaryIndex::new(
                "main-index",
                Key::string("name"),
                Key::string("gsi_sk"),
            ))
            .build()
            .unwrap();
        // The type partition makes the key `player|<name>`.
        let err = Catalog::new()
            .register(EntityDescriptor::of::<Player>(), &config)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::IndexAttributeConflict { ref attribute, .. }) if attribute == "name"
        ));

        Catalog::new()
            .register(EntityDescriptor::of::<Impostor>(), &config)
            .unwrap();
    }

    #[test]
    fn test_register_rejects_unconfigured_index() {
        let config = TableConfig::builder("game").build().unwrap();
        let err = Catalog::new()
            .register(EntityDescriptor::of::<Player>(), &config)
            .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::InvalidIndexName(ref n)) if n == "main-index"));
    }
}

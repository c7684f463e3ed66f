//! Schema registry - the immutable map of resource types.

use super::entity::EntityMetadata;
use super::schema::SchemaDescription;
use crate::error::Error;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Registry of every resource type known to the engine.
///
/// Populated once at startup and shared read-only afterwards; each entity's
/// metadata sits behind an `Arc` so requests can hold it without borrowing
/// the registry.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, Arc<EntityMetadata>>,
}

impl SchemaRegistry {
    /// Build a registry from entity metadata, validating cross-type references.
    pub fn new(entities: impl IntoIterator<Item = EntityMetadata>) -> Result<Self, Error> {
        let mut map = BTreeMap::new();
        for entity in entities {
            let name = entity.type_name.clone();
            if map.insert(name.clone(), Arc::new(entity)).is_some() {
                return Err(Error::Configuration(format!(
                    "type '{}' is registered twice",
                    name
                )));
            }
        }
        let registry = Self { entities: map };
        registry.validate()?;
        debug!(types = registry.entities.len(), "schema registry built");
        Ok(registry)
    }

    /// Build a registry from a declarative description.
    pub fn from_description(description: &SchemaDescription) -> Result<Self, Error> {
        Self::new(description.build()?)
    }

    /// Build a registry from JSON text.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Self::from_description(&SchemaDescription::from_json(text)?)
    }

    /// Build a registry from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_description(&SchemaDescription::load(path)?)
    }

    /// Look up a type.
    pub fn get(&self, type_name: &str) -> Result<Arc<EntityMetadata>, Error> {
        self.entities.get(type_name).cloned().ok_or_else(|| {
            Error::Configuration(format!("type '{}' is not registered", type_name))
        })
    }

    /// Check whether a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.entities.contains_key(type_name)
    }

    /// All registered types, ordered by name.
    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityMetadata>> {
        self.entities.values()
    }

    /// Registered type names, ordered.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    fn validate(&self) -> Result<(), Error> {
        for entity in self.entities.values() {
            if entity.property(&entity.primary_key).is_none() {
                return Err(Error::Configuration(format!(
                    "type '{}' has no primary key property '{}'",
                    entity.type_name, entity.primary_key
                )));
            }
            let mut seen = std::collections::HashSet::new();
            for name in entity.property_names() {
                if !seen.insert(name) {
                    return Err(Error::Configuration(format!(
                        "type '{}' declares property '{}' twice",
                        entity.type_name, name
                    )));
                }
            }
            for relation in &entity.relations {
                let qualified = format!("{}.{}", entity.type_name, relation.name);
                if !self.entities.contains_key(&relation.target) {
                    return Err(Error::Configuration(format!(
                        "relation '{}' targets unregistered type '{}'",
                        qualified, relation.target
                    )));
                }
                if relation.name == entity.type_name {
                    return Err(Error::Configuration(format!(
                        "relation '{}' collides with its owning type name",
                        qualified
                    )));
                }
                if !seen.insert(relation.name.as_str()) {
                    return Err(Error::Configuration(format!(
                        "relation '{}' collides with another property or relation",
                        qualified
                    )));
                }
                if relation.is_to_many() && relation.nullable {
                    return Err(Error::Configuration(format!(
                        "relation '{}' is to-many and cannot be nullable",
                        qualified
                    )));
                }
                relation.check_key().map_err(Error::Configuration)?;
            }
        }
        Ok(())
    }
}

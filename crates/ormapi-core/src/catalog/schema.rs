//! Declarative schema description.
//!
//! A [`SchemaDescription`] is the serializable source from which entity
//! metadata is built. It can be written by hand as JSON, generated, or
//! assembled in code; the compilers only ever see the resulting
//! [`EntityMetadata`].

use super::entity::EntityMetadata;
use super::property::PropertyDef;
use super::relation::{Cardinality, PivotDef, RelationDef, RelationKey};
use super::types::{KeyType, SemanticType};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Description of a whole schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    /// Resource types.
    pub entities: Vec<EntityDescription>,
}

/// Description of one resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescription {
    /// Resource type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Backing table; defaults to the type name.
    #[serde(default)]
    pub table: Option<String>,
    /// Primary key; defaults to an integer `id`.
    #[serde(default)]
    pub primary_key: Option<PrimaryKeyDescription>,
    /// Scalar properties (excluding the primary key).
    #[serde(default)]
    pub properties: Vec<PropertyDescription>,
    /// Relations.
    #[serde(default)]
    pub relations: Vec<RelationDescription>,
}

/// Description of a primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeyDescription {
    /// Property name.
    pub name: String,
    /// Key kind.
    #[serde(rename = "type")]
    pub key_type: KeyType,
}

/// Description of a scalar property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescription {
    /// Property name.
    pub name: String,
    /// Semantic type.
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    /// Whether null is allowed.
    #[serde(default)]
    pub nullable: bool,
}

/// Description of a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDescription {
    /// Relation name.
    pub name: String,
    /// Cardinality.
    pub cardinality: Cardinality,
    /// Target type name.
    pub target: String,
    /// Whether the relation may be null (to-one only).
    #[serde(default)]
    pub nullable: Option<bool>,
    /// Foreign key on the owning table.
    #[serde(default)]
    pub join_column: Option<String>,
    /// Foreign key on the target table.
    #[serde(default)]
    pub inverse_column: Option<String>,
    /// Pivot table for many-to-many relations.
    #[serde(default)]
    pub pivot: Option<PivotDef>,
}

impl SchemaDescription {
    /// Parse a description from JSON text.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid schema description: {}", e)))
    }

    /// Load a description from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("failed to read schema {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Build metadata for every described type.
    pub fn build(&self) -> Result<Vec<EntityMetadata>, Error> {
        self.entities.iter().map(EntityDescription::build).collect()
    }
}

impl EntityDescription {
    /// Build the metadata of this type.
    pub fn build(&self) -> Result<EntityMetadata, Error> {
        let mut entity = EntityMetadata::new(self.type_name.clone());
        if let Some(table) = &self.table {
            entity = entity.with_table(table.clone());
        }
        if let Some(pk) = &self.primary_key {
            entity = entity.with_primary_key(pk.name.clone(), pk.key_type);
        }
        for property in &self.properties {
            entity = entity.with_property(PropertyDef {
                name: property.name.clone(),
                semantic_type: property.semantic_type,
                nullable: property.nullable,
            });
        }
        for relation in &self.relations {
            entity = entity.with_relation(relation.build(&self.type_name)?);
        }
        Ok(entity)
    }
}

impl RelationDescription {
    fn build(&self, owner: &str) -> Result<RelationDef, Error> {
        let missing = |what: &str| {
            Error::Configuration(format!(
                "relation '{}.{}' ({:?}) requires {}",
                owner, self.name, self.cardinality, what
            ))
        };
        let key = match self.cardinality {
            Cardinality::ManyToOne => RelationKey::Owner {
                column: self.join_column.clone().ok_or_else(|| missing("joinColumn"))?,
            },
            Cardinality::OneToMany => RelationKey::Target {
                column: self.inverse_column.clone().ok_or_else(|| missing("inverseColumn"))?,
            },
            Cardinality::ManyToMany => {
                RelationKey::Pivot(self.pivot.clone().ok_or_else(|| missing("pivot"))?)
            }
            Cardinality::OneToOne => match (&self.join_column, &self.inverse_column) {
                (Some(column), None) => RelationKey::Owner {
                    column: column.clone(),
                },
                (None, Some(column)) => RelationKey::Target {
                    column: column.clone(),
                },
                _ => return Err(missing("exactly one of joinColumn or inverseColumn")),
            },
        };
        let to_many = self.cardinality.is_to_many();
        if to_many && self.nullable == Some(true) {
            return Err(Error::Configuration(format!(
                "relation '{}.{}' is to-many and cannot be nullable",
                owner, self.name
            )));
        }
        Ok(RelationDef {
            name: self.name.clone(),
            cardinality: self.cardinality,
            target: self.target.clone(),
            nullable: !to_many && self.nullable.unwrap_or(true),
            key,
        })
    }
}

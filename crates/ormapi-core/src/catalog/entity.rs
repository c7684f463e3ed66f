//! Resource type metadata.

use super::property::PropertyDef;
use super::relation::RelationDef;
use super::types::{KeyType, SemanticType};

/// Metadata of one resource type: its table, primary key, scalar properties
/// and relations.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    /// Resource type name (also the root alias in compiled queries).
    pub type_name: String,
    /// Backing table.
    pub table: String,
    /// Primary key property name.
    pub primary_key: String,
    /// Primary key kind.
    pub primary_key_type: KeyType,
    /// Scalar properties, including the primary key.
    pub properties: Vec<PropertyDef>,
    /// Relations to other types.
    pub relations: Vec<RelationDef>,
}

impl EntityMetadata {
    /// Create metadata with an integer primary key named `id`, stored in a
    /// table of the same name as the type.
    pub fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            table: type_name.clone(),
            type_name,
            primary_key: "id".to_string(),
            primary_key_type: KeyType::Integer,
            properties: vec![PropertyDef::new("id", SemanticType::Number)],
            relations: Vec::new(),
        }
    }

    /// Use a different backing table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Replace the primary key.
    pub fn with_primary_key(mut self, name: impl Into<String>, key_type: KeyType) -> Self {
        let name = name.into();
        self.properties.retain(|p| p.name != self.primary_key);
        let semantic_type = match key_type {
            KeyType::Integer => SemanticType::Number,
            KeyType::Uuid | KeyType::String => SemanticType::String,
        };
        self.properties.insert(0, PropertyDef::new(name.clone(), semantic_type));
        self.primary_key = name;
        self.primary_key_type = key_type;
        self
    }

    /// Add a property.
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Get a property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Get a relation by name.
    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Check if a name refers to a relation.
    pub fn is_relation(&self, name: &str) -> bool {
        self.relation(name).is_some()
    }

    /// Property names in declaration order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }

    /// Relation names in declaration order.
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().map(|r| r.name.as_str())
    }

    /// Properties other than the primary key.
    pub fn attributes(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.iter().filter(move |p| p.name != self.primary_key)
    }
}

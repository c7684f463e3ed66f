//! Result types returned by reads and writes.

use crate::mutation::{RefId, RelationshipData};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A hydrated resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Resource type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Primary key value.
    pub id: Value,
    /// Selected properties (the primary key is carried in `id`).
    pub attributes: BTreeMap<String, Value>,
    /// Hydrated relations, present only when included or field-selected.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Related>,
}

/// A hydrated relation value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Related {
    /// To-many relation.
    Many(Vec<Entity>),
    /// To-one relation.
    One(Option<Box<Entity>>),
}

impl Entity {
    /// Create an entity with no attributes.
    pub fn new(type_name: impl Into<String>, id: Value) -> Self {
        Self {
            type_name: type_name.into(),
            id,
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Get an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// The entity's own reference.
    pub fn ref_id(&self) -> RefId {
        RefId::new(self.type_name.clone(), self.id.to_id_string())
    }

    /// Linkage of a hydrated relation, if it was hydrated.
    pub fn relationship_data(&self, name: &str) -> Option<RelationshipData> {
        self.relationships.get(name).map(|related| match related {
            Related::Many(items) => {
                RelationshipData::Many(items.iter().map(Entity::ref_id).collect())
            }
            Related::One(item) => RelationshipData::One(item.as_ref().map(|e| e.ref_id())),
        })
    }
}

/// One page of a collection read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    /// Number of rows matching the filters, across all pages.
    pub total_items: u64,
    /// Entities of the requested page.
    pub items: Vec<Entity>,
}

impl PageResult {
    /// An empty result.
    pub fn empty() -> Self {
        Self {
            total_items: 0,
            items: Vec::new(),
        }
    }

    /// Ids of the returned items, in order.
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|e| e.id.to_id_string()).collect()
    }
}

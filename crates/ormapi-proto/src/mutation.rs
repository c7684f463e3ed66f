//! Mutation payload types for write operations.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed resource reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefId {
    /// Resource type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Resource identifier.
    pub id: String,
}

impl RefId {
    /// Create a reference.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

/// Relationship linkage: a single reference, a list of references, or null.
///
/// Also used as the result of relationship reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    /// To-many linkage.
    Many(Vec<RefId>),
    /// To-one linkage; `None` clears the relation.
    One(Option<RefId>),
}

impl RelationshipData {
    /// Create a to-one linkage.
    pub fn one(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        RelationshipData::One(Some(RefId::new(type_name, id)))
    }

    /// Create an empty to-one linkage.
    pub fn null() -> Self {
        RelationshipData::One(None)
    }

    /// Create a to-many linkage over ids of one type.
    pub fn many<I, S>(type_name: &str, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RelationshipData::Many(ids.into_iter().map(|id| RefId::new(type_name, id)).collect())
    }

    /// Check whether this is an array linkage.
    pub fn is_many(&self) -> bool {
        matches!(self, RelationshipData::Many(_))
    }

    /// Referenced ids, in payload order.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            RelationshipData::Many(refs) => refs.iter().map(|r| r.id.as_str()).collect(),
            RelationshipData::One(Some(r)) => vec![r.id.as_str()],
            RelationshipData::One(None) => vec![],
        }
    }
}

/// The `{ "data": ... }` wrapper around a relationship linkage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipBody {
    /// The linkage.
    pub data: RelationshipData,
}

impl From<RelationshipData> for RelationshipBody {
    fn from(data: RelationshipData) -> Self {
        Self { data }
    }
}

/// Create/update payload for a single resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationPayload {
    /// Resource id (client-supplied on create, required on update).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Attribute values keyed by property name.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Relationship linkages keyed by relation name.
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipBody>,
}

impl MutationPayload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resource id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set an attribute.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set a relationship linkage.
    pub fn relationship(mut self, name: impl Into<String>, data: RelationshipData) -> Self {
        self.relationships.insert(name.into(), data.into());
        self
    }
}

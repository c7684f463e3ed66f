//! Catalog - resource types, properties and relations.

mod entity;
mod property;
mod registry;
mod relation;
mod schema;
mod types;

pub use entity::EntityMetadata;
pub use property::PropertyDef;
pub use registry::SchemaRegistry;
pub use relation::{Cardinality, PivotDef, RelationDef, RelationKey};
pub use schema::{
    EntityDescription, PrimaryKeyDescription, PropertyDescription, RelationDescription,
    SchemaDescription,
};
pub use types::{KeyType, SemanticType};

//! Scalar property definitions.

use super::types::SemanticType;

/// A scalar property of a resource type. The property name is also its
/// column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    /// Property name.
    pub name: String,
    /// Semantic type.
    pub semantic_type: SemanticType,
    /// Whether null is an allowed value.
    pub nullable: bool,
}

impl PropertyDef {
    /// Create a required property.
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            nullable: false,
        }
    }

    /// Create a nullable property.
    pub fn optional(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            nullable: true,
        }
    }
}

//! Relation definitions between resource types.

use serde::{Deserialize, Serialize};

/// Cardinality of a relation, seen from the owning type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    /// One-to-one relation.
    OneToOne,
    /// Many-to-one relation (foreign key on the owning table).
    ManyToOne,
    /// One-to-many relation (foreign key on the target table).
    OneToMany,
    /// Many-to-many relation (through a pivot table).
    ManyToMany,
}

impl Cardinality {
    /// Check if the relation holds a collection.
    pub fn is_to_many(&self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

/// Pivot table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotDef {
    /// Pivot table name.
    pub table: String,
    /// Column referencing the owning row's primary key.
    pub owner_column: String,
    /// Column referencing the target row's primary key.
    pub target_column: String,
}

impl PivotDef {
    /// Create a pivot definition.
    pub fn new(
        table: impl Into<String>,
        owner_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            owner_column: owner_column.into(),
            target_column: target_column.into(),
        }
    }
}

/// Where the linking key of a relation is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKey {
    /// Foreign key column on the owning table, referencing the target.
    Owner {
        /// Column name.
        column: String,
    },
    /// Foreign key column on the target table, referencing the owner.
    Target {
        /// Column name.
        column: String,
    },
    /// Pivot table.
    Pivot(PivotDef),
}

/// A relation from one resource type to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    /// Relation name (unique within the owning type).
    pub name: String,
    /// Cardinality.
    pub cardinality: Cardinality,
    /// Target type name.
    pub target: String,
    /// Whether the relation may be null. Always false for to-many relations.
    pub nullable: bool,
    /// Linking key.
    pub key: RelationKey,
}

impl RelationDef {
    /// Many-to-one relation through a foreign key on the owning table.
    pub fn many_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::ManyToOne,
            target: target.into(),
            nullable: true,
            key: RelationKey::Owner {
                column: column.into(),
            },
        }
    }

    /// One-to-one relation, owning side (foreign key on the owning table).
    pub fn one_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::OneToOne,
            target: target.into(),
            nullable: true,
            key: RelationKey::Owner {
                column: column.into(),
            },
        }
    }

    /// One-to-one relation, inverse side (foreign key on the target table).
    pub fn one_to_one_inverse(
        name: impl Into<String>,
        target: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::OneToOne,
            target: target.into(),
            nullable: true,
            key: RelationKey::Target {
                column: column.into(),
            },
        }
    }

    /// One-to-many relation through a foreign key on the target table.
    pub fn one_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::OneToMany,
            target: target.into(),
            nullable: false,
            key: RelationKey::Target {
                column: column.into(),
            },
        }
    }

    /// Many-to-many relation through a pivot table.
    pub fn many_to_many(name: impl Into<String>, target: impl Into<String>, pivot: PivotDef) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::ManyToMany,
            target: target.into(),
            nullable: false,
            key: RelationKey::Pivot(pivot),
        }
    }

    /// Set nullability (ignored for to-many relations).
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable && !self.cardinality.is_to_many();
        self
    }

    /// Check if the relation holds a collection.
    pub fn is_to_many(&self) -> bool {
        self.cardinality.is_to_many()
    }

    /// Foreign key column on the owning table, if any.
    pub fn owner_column(&self) -> Option<&str> {
        match &self.key {
            RelationKey::Owner { column } => Some(column),
            _ => None,
        }
    }

    /// Check that the key kind fits the cardinality.
    pub fn check_key(&self) -> Result<(), String> {
        let fits = match (&self.cardinality, &self.key) {
            (Cardinality::ManyToOne, RelationKey::Owner { .. }) => true,
            (Cardinality::OneToOne, RelationKey::Owner { .. } | RelationKey::Target { .. }) => true,
            (Cardinality::OneToMany, RelationKey::Target { .. }) => true,
            (Cardinality::ManyToMany, RelationKey::Pivot(_)) => true,
            _ => false,
        };
        if fits {
            Ok(())
        } else {
            Err(format!(
                "relation '{}' has a {:?} cardinality that cannot use {:?}",
                self.name, self.cardinality, self.key
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_many_never_nullable() {
        let rel = RelationDef::one_to_many("comments", "comments", "user_id").with_nullable(true);
        assert!(!rel.nullable);
        assert!(rel.is_to_many());

        let rel = RelationDef::many_to_one("manager", "users", "manager_id").with_nullable(false);
        assert!(!rel.nullable);
        assert_eq!(rel.owner_column(), Some("manager_id"));
    }

    #[test]
    fn test_key_kind_checked() {
        let pivot = PivotDef::new("users_have_roles", "user_id", "role_id");
        assert!(RelationDef::many_to_many("roles", "roles", pivot).check_key().is_ok());
        assert!(RelationDef::one_to_one_inverse("profile", "profiles", "user_id")
            .check_key()
            .is_ok());

        let mut broken = RelationDef::many_to_one("manager", "users", "manager_id");
        broken.cardinality = Cardinality::OneToMany;
        assert!(broken.check_key().is_err());
    }

    #[test]
    fn test_cardinality_serde() {
        let c: Cardinality = serde_json::from_str("\"many-to-many\"").unwrap();
        assert_eq!(c, Cardinality::ManyToMany);
        assert!(c.is_to_many());
    }
}

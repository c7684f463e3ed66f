//! Relationship payload validation.
//!
//! Checks that a linkage fits the relation's cardinality, that every
//! reference names the relation's target type, and that every referenced row
//! exists. Problems of one kind are reported together with the index of the
//! offending item.

use crate::catalog::{EntityMetadata, RelationDef, SchemaRegistry};
use crate::error::{Error, Issue};
use crate::sql::{Compile, Expr, Select};
use crate::store::ResourceStore;
use ormapi_proto::{RefId, RelationshipData, Value};
use std::collections::HashSet;

/// Validated linkage reduced to bare keys of the target type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedIds {
    /// `null` linkage.
    Null,
    /// One target key.
    One(Value),
    /// Target keys, deduplicated, in payload order.
    Many(Vec<Value>),
}

impl ResolvedIds {
    /// Keys as a list.
    pub fn values(&self) -> Vec<Value> {
        match self {
            ResolvedIds::Null => Vec::new(),
            ResolvedIds::One(id) => vec![id.clone()],
            ResolvedIds::Many(ids) => ids.clone(),
        }
    }
}

/// Validates relationship linkage against the catalog and the store.
pub struct RelationshipValidator<'a> {
    registry: &'a SchemaRegistry,
    store: &'a dyn ResourceStore,
}

impl<'a> RelationshipValidator<'a> {
    /// Create a validator.
    pub fn new(registry: &'a SchemaRegistry, store: &'a dyn ResourceStore) -> Self {
        Self { registry, store }
    }

    /// Validate `data` for `relation`.
    ///
    /// Fails with `Shape` on a cardinality or type mismatch and with
    /// `NotFound` when referenced rows are missing. Issue paths start at
    /// `data`.
    pub fn validate(&self, relation: &RelationDef, data: &RelationshipData) -> Result<ResolvedIds, Error> {
        let refs: Vec<(Vec<String>, &RefId)> = match (relation.is_to_many(), data) {
            (true, RelationshipData::Many(refs)) => refs
                .iter()
                .enumerate()
                .map(|(i, r)| (vec!["data".to_string(), i.to_string()], r))
                .collect(),
            (true, RelationshipData::One(_)) => {
                return Err(Error::Shape(vec![
                    Issue::new("shape", "Body data should be array").at(["data"])
                ]))
            }
            (false, RelationshipData::Many(_)) => {
                return Err(Error::Shape(vec![
                    Issue::new("shape", "Body data should be object").at(["data"])
                ]))
            }
            (false, RelationshipData::One(None)) => return Ok(ResolvedIds::Null),
            (false, RelationshipData::One(Some(r))) => vec![(vec!["data".to_string()], r)],
        };
        if refs.is_empty() {
            return Ok(ResolvedIds::Many(Vec::new()));
        }

        let target = self.registry.get(&relation.target)?;
        let shape: Vec<Issue> = refs
            .iter()
            .filter(|(_, r)| r.type_name != target.type_name)
            .map(|(path, r)| {
                Issue::new(
                    "shape",
                    format!(
                        "Type '{}' does not match relation type '{}'",
                        r.type_name, target.type_name
                    ),
                )
                .at(path.iter().map(String::as_str).chain(["type"]))
            })
            .collect();
        if !shape.is_empty() {
            return Err(Error::Shape(shape));
        }

        let parsed: Vec<Option<Value>> = refs
            .iter()
            .map(|(_, r)| target.primary_key_type.parse_id(&r.id))
            .collect();
        let existing = self.existing(&target, parsed.iter().flatten().cloned().collect())?;

        let mut missing = Vec::new();
        let mut ids: Vec<Value> = Vec::new();
        for ((path, r), key) in refs.iter().zip(parsed) {
            match key {
                Some(key) if existing.contains(&key.to_id_string()) => {
                    if !ids.contains(&key) {
                        ids.push(key);
                    }
                }
                _ => missing.push(
                    Issue::new(
                        "not_found",
                        format!(
                            "Resource '{}' with id '{}' does not exist",
                            target.type_name, r.id
                        ),
                    )
                    .at(path.iter().map(String::as_str).chain(["id"])),
                ),
            }
        }
        if !missing.is_empty() {
            return Err(Error::NotFound(missing));
        }

        Ok(if relation.is_to_many() {
            ResolvedIds::Many(ids)
        } else {
            ids.into_iter()
                .next()
                .map_or(ResolvedIds::Null, ResolvedIds::One)
        })
    }

    /// Keys among `ids` that exist, as id strings. One query for all of them.
    fn existing(&self, target: &EntityMetadata, ids: Vec<Value>) -> Result<HashSet<String>, Error> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let alias = target.table.as_str();
        let select = Select::from_table(&target.table, alias)
            .column_as(Expr::col(alias, &target.primary_key), &target.primary_key)
            .filter(Expr::col(alias, &target.primary_key).in_list(ids));
        let rows = self.store.query(&select.compile(self.store.dialect()))?;
        Ok(rows
            .iter()
            .map(|row| row.get(&target.primary_key).to_id_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PivotDef, PropertyDef, SemanticType};
    use crate::store::SqliteStore;

    fn setup() -> (SchemaRegistry, SqliteStore) {
        let registry = SchemaRegistry::new([
            EntityMetadata::new("users")
                .with_relation(RelationDef::many_to_one("manager", "users", "manager_id"))
                .with_relation(RelationDef::many_to_many(
                    "roles",
                    "roles",
                    PivotDef::new("users_have_roles", "user_id", "role_id"),
                )),
            EntityMetadata::new("roles")
                .with_property(PropertyDef::new("name", SemanticType::String)),
        ])
        .unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_schema(&registry).unwrap();
        store
            .execute_batch("INSERT INTO roles (id, name) VALUES (1, 'a'), (2, 'b'); INSERT INTO users (id) VALUES (1)")
            .unwrap();
        (registry, store)
    }

    #[test]
    fn test_cardinality_mismatch() {
        let (registry, store) = setup();
        let users = registry.get("users").unwrap();
        let validator = RelationshipValidator::new(&registry, &store);

        let err = validator
            .validate(users.relation("roles").unwrap(), &RelationshipData::one("roles", "1"))
            .unwrap_err();
        assert_eq!(err.kind(), "shape");
        assert_eq!(err.issues()[0].message, "Body data should be array");

        let err = validator
            .validate(
                users.relation("manager").unwrap(),
                &RelationshipData::many("users", ["1"]),
            )
            .unwrap_err();
        assert_eq!(err.issues()[0].message, "Body data should be object");
    }

    #[test]
    fn test_null_and_empty() {
        let (registry, store) = setup();
        let users = registry.get("users").unwrap();
        let validator = RelationshipValidator::new(&registry, &store);

        assert_eq!(
            validator
                .validate(users.relation("manager").unwrap(), &RelationshipData::null())
                .unwrap(),
            ResolvedIds::Null
        );
        assert_eq!(
            validator
                .validate(users.relation("roles").unwrap(), &RelationshipData::Many(vec![]))
                .unwrap(),
            ResolvedIds::Many(vec![])
        );
    }

    #[test]
    fn test_type_issues_reported_together() {
        let (registry, store) = setup();
        let users = registry.get("users").unwrap();
        let data = RelationshipData::Many(vec![
            RefId::new("users", "1"),
            RefId::new("roles", "1"),
            RefId::new("groups", "2"),
        ]);
        let err = RelationshipValidator::new(&registry, &store)
            .validate(users.relation("roles").unwrap(), &data)
            .unwrap_err();
        assert_eq!(err.kind(), "shape");
        let pointers: Vec<String> = err.issues().iter().map(Issue::pointer).collect();
        assert_eq!(pointers, ["data.0.type", "data.2.type"]);
    }

    #[test]
    fn test_missing_ids_located() {
        let (registry, store) = setup();
        let users = registry.get("users").unwrap();
        let validator = RelationshipValidator::new(&registry, &store);

        let data = RelationshipData::many("roles", ["1", "9", "2", "1"]);
        let err = validator
            .validate(users.relation("roles").unwrap(), &data)
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.issues().len(), 1);
        assert_eq!(err.issues()[0].pointer(), "data.1.id");

        let data = RelationshipData::many("roles", ["2", "1", "2"]);
        assert_eq!(
            validator.validate(users.relation("roles").unwrap(), &data).unwrap(),
            ResolvedIds::Many(vec![Value::Int(2), Value::Int(1)])
        );

        let err = validator
            .validate(users.relation("manager").unwrap(), &RelationshipData::one("users", "x"))
            .unwrap_err();
        assert_eq!(err.issues()[0].pointer(), "data.id");
    }
}

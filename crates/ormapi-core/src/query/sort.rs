//! Sort compilation.

use super::join::root_alias;
use crate::catalog::{EntityMetadata, SchemaRegistry};
use crate::error::{Error, Issue};
use crate::sql::{AggregateFunc, Expr, OrderItem};
use ormapi_proto::{Query, SortDirection};

/// One resolved sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Relation the key lives on; `None` for the root type.
    pub relation: Option<String>,
    /// Property name.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

impl SortKey {
    fn column(&self, root: &str) -> Expr {
        Expr::col(self.relation.as_deref().unwrap_or(root), &self.field)
    }
}

/// Validated sort keys in application order, ending with the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSort {
    keys: Vec<SortKey>,
}

impl CompiledSort {
    /// Keys in application order.
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Check whether any key lives on `relation`.
    pub fn has_relation(&self, relation: &str) -> bool {
        self.keys
            .iter()
            .any(|k| k.relation.as_deref() == Some(relation))
    }

    /// Relations touched by the sort, in declaration order.
    pub fn relations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.keys.iter().filter_map(|k| k.relation.as_deref()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// ORDER BY terms for a query grouped by the root primary key.
    ///
    /// Related columns are aggregated: the smallest value for ascending keys,
    /// the largest for descending ones.
    pub fn grouped_order(&self, metadata: &EntityMetadata) -> Vec<OrderItem> {
        let root = root_alias(metadata);
        self.keys
            .iter()
            .map(|key| {
                let column = key.column(root);
                let expr = match (&key.relation, key.direction) {
                    (None, _) => column,
                    (Some(_), SortDirection::Asc) => Expr::aggregate(AggregateFunc::Min, column),
                    (Some(_), SortDirection::Desc) => Expr::aggregate(AggregateFunc::Max, column),
                };
                OrderItem {
                    expr,
                    direction: key.direction,
                }
            })
            .collect()
    }

    /// ORDER BY terms over plain columns, limited to the joined aliases.
    pub fn plain_order(
        &self,
        metadata: &EntityMetadata,
        joined: impl Fn(&str) -> bool,
    ) -> Vec<OrderItem> {
        let root = root_alias(metadata);
        self.keys
            .iter()
            .filter(|key| key.relation.as_deref().map_or(true, &joined))
            .map(|key| OrderItem {
                expr: key.column(root),
                direction: key.direction,
            })
            .collect()
    }
}

/// Compiles the query's sort specification against the catalog.
pub struct SortCompiler<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> SortCompiler<'a> {
    /// Create a sort compiler.
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Resolve target keys, then each relation block in declaration order.
    ///
    /// Without a sort the primary key ascends; otherwise it is appended as the
    /// final tie-breaker unless already present.
    pub fn compile(&self, metadata: &EntityMetadata, query: &Query) -> Result<CompiledSort, Error> {
        let mut keys = Vec::new();
        let mut issues = Vec::new();

        if let Some(sort) = &query.sort {
            for key in &sort.target {
                if metadata.property(&key.field).is_some() {
                    keys.push(SortKey {
                        relation: None,
                        field: key.field.clone(),
                        direction: key.direction,
                    });
                } else {
                    issues.push(
                        Issue::new(
                            "unknown_field",
                            format!("'{}' is not a property of '{}'", key.field, metadata.type_name),
                        )
                        .at(["sort", key.field.as_str()]),
                    );
                }
            }
            for block in &sort.relations {
                let Some(relation) = metadata.relation(&block.relation) else {
                    issues.push(
                        Issue::new(
                            "unknown_relation",
                            format!(
                                "'{}' is not a relation of '{}'",
                                block.relation, metadata.type_name
                            ),
                        )
                        .at(["sort", block.relation.as_str()]),
                    );
                    continue;
                };
                let target = self.registry.get(&relation.target)?;
                for key in &block.fields {
                    if target.property(&key.field).is_none() {
                        issues.push(
                            Issue::new(
                                "unknown_field",
                                format!(
                                    "'{}' is not a property of '{}'",
                                    key.field, target.type_name
                                ),
                            )
                            .at(["sort", block.relation.as_str(), key.field.as_str()]),
                        );
                        continue;
                    }
                    keys.push(SortKey {
                        relation: Some(block.relation.clone()),
                        field: key.field.clone(),
                        direction: key.direction,
                    });
                }
            }
        }
        if !issues.is_empty() {
            return Err(Error::InvalidQuery(issues));
        }

        let has_pk = keys
            .iter()
            .any(|k| k.relation.is_none() && k.field == metadata.primary_key);
        if !has_pk {
            keys.push(SortKey {
                relation: None,
                field: metadata.primary_key.clone(),
                direction: SortDirection::Asc,
            });
        }
        Ok(CompiledSort { keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PivotDef, PropertyDef, RelationDef, SemanticType};
    use ormapi_proto::SortSpec;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new([
            EntityMetadata::new("users")
                .with_property(PropertyDef::new("login", SemanticType::String))
                .with_relation(RelationDef::many_to_many(
                    "roles",
                    "roles",
                    PivotDef::new("users_have_roles", "user_id", "role_id"),
                )),
            EntityMetadata::new("roles")
                .with_property(PropertyDef::new("name", SemanticType::String)),
        ])
        .unwrap()
    }

    #[test]
    fn test_default_sort_is_primary_key() {
        let registry = registry();
        let users = registry.get("users").unwrap();
        let sort = SortCompiler::new(&registry).compile(&users, &Query::new()).unwrap();
        assert_eq!(
            sort.keys(),
            &[SortKey {
                relation: None,
                field: "id".into(),
                direction: SortDirection::Asc
            }]
        );
        assert!(!sort.has_relation("roles"));
    }

    #[test]
    fn test_target_then_relation_then_tiebreak() {
        let registry = registry();
        let users = registry.get("users").unwrap();
        let query = Query::new().with_sort("roles.name,-login".parse::<SortSpec>().unwrap());
        let sort = SortCompiler::new(&registry).compile(&users, &query).unwrap();

        let fields: Vec<(Option<&str>, &str)> = sort
            .keys()
            .iter()
            .map(|k| (k.relation.as_deref(), k.field.as_str()))
            .collect();
        assert_eq!(fields, [(None, "login"), (Some("roles"), "name"), (None, "id")]);
        assert!(sort.has_relation("roles"));
        assert_eq!(sort.relations(), ["roles"]);

        let grouped = sort.grouped_order(&users);
        assert!(matches!(
            grouped[1].expr,
            Expr::Aggregate {
                func: AggregateFunc::Min,
                ..
            }
        ));
        assert_eq!(sort.plain_order(&users, |_| false).len(), 2);
    }

    #[test]
    fn test_explicit_primary_key_not_duplicated() {
        let registry = registry();
        let users = registry.get("users").unwrap();
        let query = Query::new().with_sort("-id".parse().unwrap());
        let sort = SortCompiler::new(&registry).compile(&users, &query).unwrap();
        assert_eq!(sort.keys().len(), 1);
        assert_eq!(sort.keys()[0].direction, SortDirection::Desc);
    }

    #[test]
    fn test_unknown_sort_fields_collected() {
        let registry = registry();
        let users = registry.get("users").unwrap();
        let query = Query::new().with_sort("nope,roles.missing,ghosts.name".parse().unwrap());
        let err = SortCompiler::new(&registry).compile(&users, &query).unwrap_err();
        assert_eq!(err.kind(), "invalid_query");
        assert_eq!(err.issues().len(), 3);
    }
}

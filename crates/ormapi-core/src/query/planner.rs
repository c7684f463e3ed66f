//! Read planning.
//!
//! A collection read runs as three statements: a count over the filtered
//! root rows, an id query that pages through them grouped by primary key,
//! and a hydration query that loads the selected rows with their relations.
//! Grouping before paging keeps to-many joins from multiplying rows, so
//! pages are exact and disjoint.

use super::filter::FilterCompiler;
use super::join::{join_relation, root_alias};
use super::sort::{CompiledSort, SortCompiler};
use crate::catalog::{EntityMetadata, RelationDef, SchemaRegistry};
use crate::error::{Error, Issue};
use crate::sql::{Expr, OrderItem, Select, TableRef};
use ormapi_proto::{Page, Query, SortDirection};
use std::sync::Arc;

/// Alias of the derived table the count runs over.
const COUNT_ALIAS: &str = "sub";

/// Result column of the count statement.
pub(crate) const TOTAL_COLUMN: &str = "total";

/// A relation loaded by hydration.
#[derive(Debug, Clone)]
pub struct HydratedRelation {
    pub relation: RelationDef,
    pub target: Arc<EntityMetadata>,
    /// Selected properties of the target, without its primary key.
    pub fields: Vec<String>,
}

/// What the hydration query selects.
#[derive(Debug, Clone)]
pub struct HydrationPlan {
    /// Selected root properties, without the primary key.
    pub root_fields: Vec<String>,
    pub relations: Vec<HydratedRelation>,
}

impl HydrationPlan {
    /// Check whether a relation is hydrated.
    pub fn hydrates(&self, relation: &str) -> bool {
        self.relations.iter().any(|r| r.relation.name == relation)
    }
}

/// Result column alias of `column` on `alias` in the hydration query.
pub fn column_alias(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, column)
}

/// The statements of one collection read.
#[derive(Debug, Clone)]
pub struct ReadPlan {
    /// `SELECT COUNT(DISTINCT pk)` over the filtered rows.
    pub count: Select,
    /// Page of primary keys in sort order.
    pub ids: Select,
    pub sort: CompiledSort,
    pub hydration: HydrationPlan,
}

/// Builds read statements from a query.
pub struct ReadPlanner<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> ReadPlanner<'a> {
    /// Create a planner.
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Plan a collection read for an already normalised page.
    pub fn plan(&self, metadata: &EntityMetadata, query: &Query, page: Page) -> Result<ReadPlan, Error> {
        let sort = SortCompiler::new(self.registry).compile(metadata, query)?;
        let (filtered, hydration) = join_results(
            self.filtered_select(metadata, query, &sort),
            self.hydration_plan(metadata, query),
        )?;

        let root = root_alias(metadata);
        let count = Select::from(TableRef::Subquery {
            select: Box::new(filtered.clone()),
            alias: COUNT_ALIAS.to_string(),
        })
        .column_as(
            Expr::count_distinct(Expr::col(COUNT_ALIAS, &metadata.primary_key)),
            TOTAL_COLUMN,
        );

        let mut ids = filtered;
        ids.group_by = vec![Expr::col(root, &metadata.primary_key)];
        ids.order_by = sort.grouped_order(metadata);
        ids.limit = Some(page.size);
        ids.offset = Some(page.offset());

        Ok(ReadPlan {
            count,
            ids,
            sort,
            hydration,
        })
    }

    /// Root rows matching every filter, projecting the primary key.
    ///
    /// Joins the relations the sort needs plus the included relations that
    /// structural filters test through their joined alias.
    pub fn filtered_select(
        &self,
        metadata: &EntityMetadata,
        query: &Query,
        sort: &CompiledSort,
    ) -> Result<Select, Error> {
        let filters = FilterCompiler::new(self.registry);
        let (target, relation) = join_results(
            filters.compile_target_filters(metadata, query, sort),
            filters.compile_relation_filters(metadata, query, sort),
        )?;

        let root = root_alias(metadata);
        let mut select = Select::from_table(&metadata.table, root).column_as(
            Expr::col(root, &metadata.primary_key),
            &metadata.primary_key,
        );
        let mut joined = sort.relations();
        for name in filters.joined_relations(metadata, query, sort) {
            if !joined.contains(&name) {
                joined.push(name);
            }
        }
        for name in joined {
            let relation = metadata.relation(name).ok_or_else(|| {
                Error::Configuration(format!("unknown relation '{}'", name))
            })?;
            let target = self.registry.get(&relation.target)?;
            join_relation(&mut select, metadata, relation, &target);
        }
        Ok(select.filters(target).filters(relation))
    }

    /// Resolve sparse fieldsets and included relations.
    pub fn hydration_plan(&self, metadata: &EntityMetadata, query: &Query) -> Result<HydrationPlan, Error> {
        let mut issues = Vec::new();
        let fields = query.fields.as_ref();
        let mut relation_names: Vec<(&str, &str)> = query
            .included()
            .iter()
            .map(|name| (name.as_str(), "include"))
            .collect();

        let root_fields = match fields.and_then(|f| f.target.as_ref()) {
            Some(selected) => {
                let mut root_fields = Vec::new();
                for name in selected {
                    if metadata.is_relation(name) {
                        relation_names.push((name.as_str(), "fields"));
                    } else if metadata.property(name).is_some() {
                        if *name != metadata.primary_key && !root_fields.contains(name) {
                            root_fields.push(name.clone());
                        }
                    } else {
                        issues.push(
                            Issue::new(
                                "unknown_field",
                                format!("'{}' is not a field of '{}'", name, metadata.type_name),
                            )
                            .at(["fields", "target", name.as_str()]),
                        );
                    }
                }
                root_fields
            }
            None => metadata.attributes().map(|p| p.name.clone()).collect(),
        };
        if let Some(fields) = fields {
            relation_names.extend(fields.relations.keys().map(|name| (name.as_str(), "fields")));
        }

        let mut relations: Vec<HydratedRelation> = Vec::new();
        for (name, source) in relation_names {
            if relations.iter().any(|r| r.relation.name == name) {
                continue;
            }
            let Some(relation) = metadata.relation(name) else {
                issues.push(
                    Issue::new(
                        "unknown_relation",
                        format!("'{}' is not a relation of '{}'", name, metadata.type_name),
                    )
                    .at([source, name]),
                );
                continue;
            };
            let target = self.registry.get(&relation.target)?;
            let selected = match fields.and_then(|f| f.relations.get(name)) {
                Some(selected) => {
                    let mut chosen = Vec::new();
                    for field in selected {
                        if target.property(field).is_none() {
                            issues.push(
                                Issue::new(
                                    "unknown_field",
                                    format!(
                                        "'{}' is not a property of '{}'",
                                        field, target.type_name
                                    ),
                                )
                                .at(["fields", name, field.as_str()]),
                            );
                        } else if *field != target.primary_key && !chosen.contains(field) {
                            chosen.push(field.clone());
                        }
                    }
                    chosen
                }
                None => target.attributes().map(|p| p.name.clone()).collect(),
            };
            relations.push(HydratedRelation {
                relation: relation.clone(),
                target,
                fields: selected,
            });
        }

        if issues.is_empty() {
            Ok(HydrationPlan {
                root_fields,
                relations,
            })
        } else {
            Err(Error::InvalidQuery(issues))
        }
    }

    /// Hydration query restricted by `condition` on the root row.
    ///
    /// Every selected column is aliased `<alias>.<column>`; primary keys of
    /// the root and of each joined relation are always selected.
    pub fn hydration_select(
        &self,
        metadata: &EntityMetadata,
        plan: &HydrationPlan,
        sort: &CompiledSort,
        condition: Expr,
    ) -> Select {
        let root = root_alias(metadata);
        let mut select = Select::from_table(&metadata.table, root);
        select = select.column_as(
            Expr::col(root, &metadata.primary_key),
            column_alias(root, &metadata.primary_key),
        );
        for field in &plan.root_fields {
            select = select.column_as(Expr::col(root, field), column_alias(root, field));
        }

        for hydrated in &plan.relations {
            let alias = hydrated.relation.name.as_str();
            let target = &hydrated.target;
            join_relation(&mut select, metadata, &hydrated.relation, target);
            select = select.column_as(
                Expr::col(alias, &target.primary_key),
                column_alias(alias, &target.primary_key),
            );
            for field in &hydrated.fields {
                select = select.column_as(Expr::col(alias, field), column_alias(alias, field));
            }
        }

        select.order_by = sort.plain_order(metadata, |name| plan.hydrates(name));
        for hydrated in &plan.relations {
            select.order_by.push(OrderItem {
                expr: Expr::col(&hydrated.relation.name, &hydrated.target.primary_key),
                direction: SortDirection::Asc,
            });
        }
        select.filter(condition)
    }
}

/// Run two fallible steps and merge their invalid-query issues.
fn join_results<A, B>(a: Result<A, Error>, b: Result<B, Error>) -> Result<(A, B), Error> {
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(Error::InvalidQuery(mut first)), Err(Error::InvalidQuery(second))) => {
            first.extend(second);
            Err(Error::InvalidQuery(first))
        }
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PivotDef, PropertyDef, SemanticType};
    use crate::sql::{Compile, Dialect};
    use ormapi_proto::Operand;

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
                .with_property(PropertyDef::new("name", SemanticType::String))
                .with_property(PropertyDef::new("key", SemanticType::String)),
        ])
        .unwrap()
    }

    #[test]
    fn test_plan_statements() {
        let registry = registry();
        let users = registry.get("users").unwrap();
        let query = Query::new()
            .filter("login", Operand::Ne, "root")
            .with_sort("-roles.name".parse().unwrap());
        let plan = ReadPlanner::new(&registry)
            .plan(&users, &query, Page::new(3, 10))
            .unwrap();

        let filtered = "SELECT \"users\".\"id\" AS \"id\" FROM \"users\" \
            LEFT JOIN \"users_have_roles\" AS \"roles__pivot\" ON \"roles__pivot\".\"user_id\" = \"users\".\"id\" \
            LEFT JOIN \"roles\" ON \"roles\".\"id\" = \"roles__pivot\".\"role_id\" \
            WHERE \"users\".\"login\" <> ?";
        assert_eq!(
            plan.count.compile(Dialect::Sqlite).sql,
            format!(
                "SELECT COUNT(DISTINCT \"sub\".\"id\") AS \"total\" FROM ({}) AS \"sub\"",
                filtered
            )
        );
        assert_eq!(
            plan.ids.compile(Dialect::Sqlite).sql,
            format!(
                "{} GROUP BY \"users\".\"id\" ORDER BY MAX(\"roles\".\"name\") DESC, \"users\".\"id\" ASC LIMIT 10 OFFSET 20",
                filtered
            )
        );
    }

    #[test]
    fn test_hydration_columns() {
        let registry = registry();
        let users = registry.get("users").unwrap();
        let query = Query::new().with_relation_fields("roles", ["name"]);
        let planner = ReadPlanner::new(&registry);
        let plan = planner.hydration_plan(&users, &query).unwrap();
        assert!(plan.hydrates("roles"));
        assert_eq!(plan.root_fields, ["login"]);

        let sort = SortCompiler::new(&registry).compile(&users, &query).unwrap();
        let select = planner.hydration_select(
            &users,
            &plan,
            &sort,
            Expr::col("users", "id").in_list(vec![1.into(), 2.into()]),
        );
        let sql = select.compile(Dialect::Sqlite).sql;
        assert!(sql.starts_with(
            "SELECT \"users\".\"id\" AS \"users.id\", \"users\".\"login\" AS \"users.login\", \
             \"roles\".\"id\" AS \"roles.id\", \"roles\".\"name\" AS \"roles.name\" FROM \"users\""
        ));
        assert!(sql.ends_with(
            "WHERE \"users\".\"id\" IN (?, ?) ORDER BY \"users\".\"id\" ASC, \"roles\".\"id\" ASC"
        ));
    }

    #[test]
    fn test_unknown_include_and_fields() {
        let registry = registry();
        let users = registry.get("users").unwrap();
        let query = Query::new()
            .include("ghosts")
            .with_target_fields(["login", "nope"])
            .with_relation_fields("roles", ["missing"]);
        let err = ReadPlanner::new(&registry)
            .hydration_plan(&users, &query)
            .unwrap_err();
        let pointers: Vec<String> = err.issues().iter().map(|i| i.pointer()).collect();
        assert_eq!(
            pointers,
            ["fields.target.nope", "include.ghosts", "fields.roles.missing"]
        );
    }

    #[test]
    fn test_filter_and_sort_issues_merged() {
        let registry = registry();
        let users = registry.get("users").unwrap();
        let query = Query::new()
            .filter("ghost", Operand::Eq, 1)
            .filter_relation("roles", "ghost", Operand::Eq, 1);
        let err = ReadPlanner::new(&registry)
            .plan(&users, &query, Page::default())
            .unwrap_err();
        assert_eq!(err.issues().len(), 2);
    }
}

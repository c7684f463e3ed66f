//! Read explanation: the statements a collection read would run.

use super::join::root_alias;
use super::planner::ReadPlanner;
use crate::catalog::{EntityMetadata, SchemaRegistry};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::sql::{Compile, CompiledSql, Dialect, Expr, Select};
use ormapi_proto::Query;
use serde::Serialize;
use std::fmt;

/// Rendered statements of a collection read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadExplain {
    pub dialect: Dialect,
    /// Total row count.
    pub count: CompiledSql,
    /// Page of primary keys.
    pub ids: CompiledSql,
    /// Hydration, restricted by the id query as a subquery.
    pub hydration: CompiledSql,
}

impl fmt::Display for ReadExplain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-- count ({})", self.dialect)?;
        writeln!(f, "{};", self.count)?;
        writeln!(f, "-- ids")?;
        writeln!(f, "{};", self.ids)?;
        writeln!(f, "-- hydration")?;
        write!(f, "{};", self.hydration)
    }
}

/// Renders read plans without touching a store.
pub struct ExplainService<'a> {
    registry: &'a SchemaRegistry,
    config: &'a EngineConfig,
}

impl<'a> ExplainService<'a> {
    /// Create an explain service.
    pub fn new(registry: &'a SchemaRegistry, config: &'a EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Explain a collection read.
    pub fn explain(
        &self,
        metadata: &EntityMetadata,
        query: &Query,
        dialect: Dialect,
    ) -> Result<ReadExplain, Error> {
        let planner = ReadPlanner::new(self.registry);
        let plan = planner.plan(metadata, query, self.config.clamp_page(query.page))?;

        // A fresh projection keeps the subquery to the key column alone.
        let ids_subquery = Select {
            projection: Vec::new(),
            ..plan.ids.clone()
        }
        .column(Expr::col(root_alias(metadata), &metadata.primary_key));
        let condition =
            Expr::col(root_alias(metadata), &metadata.primary_key).in_subquery(ids_subquery);
        let hydration = planner.hydration_select(metadata, &plan.hydration, &plan.sort, condition);

        Ok(ReadExplain {
            dialect,
            count: plan.count.compile(dialect),
            ids: plan.ids.compile(dialect),
            hydration: hydration.compile(dialect),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PropertyDef, RelationDef, SemanticType};
    use ormapi_proto::Operand;

    #[test]
    fn test_explain_postgres() {
        let registry = SchemaRegistry::new([
            EntityMetadata::new("users")
                .with_property(PropertyDef::new("login", SemanticType::String))
                .with_relation(RelationDef::one_to_many("comments", "comments", "user_id")),
            EntityMetadata::new("comments")
                .with_property(PropertyDef::new("text", SemanticType::String)),
        ])
        .unwrap();
        let config = EngineConfig::default();
        let users = registry.get("users").unwrap();
        let query = Query::new()
            .filter("login", Operand::Like, "an")
            .include("comments");

        let explain = ExplainService::new(&registry, &config)
            .explain(&users, &query, Dialect::Postgres)
            .unwrap();

        assert!(explain.count.sql.contains("\"users\".\"login\" ILIKE $1"));
        assert!(explain.ids.sql.ends_with("LIMIT 20"));
        assert!(explain
            .hydration
            .sql
            .contains("WHERE \"users\".\"id\" IN (SELECT \"users\".\"id\" FROM \"users\""));
        assert_eq!(explain.hydration.params, vec![ormapi_proto::Value::from("%an%")]);
        assert!(explain.to_string().starts_with("-- count (postgres)\n"));
    }
}

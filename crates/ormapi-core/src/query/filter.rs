//! Filter compilation.
//!
//! Turns the query's target and relation filter trees into SQL conditions
//! on the root row. Relation tests either reuse a join that sorting or
//! inclusion already forces, or fall back to a correlated `EXISTS`; both
//! forms select the same rows.

use super::join::{correlated_subquery, root_alias, subquery_alias};
use super::sort::CompiledSort;
use crate::catalog::{
    EntityMetadata, PropertyDef, RelationDef, RelationKey, SchemaRegistry, SemanticType,
};
use crate::error::{Error, Issue};
use crate::sql::{CompareOp, Expr};
use ormapi_proto::{FieldConditions, Operand, Query, Value};
use tracing::debug;

/// Compiles filter trees against the catalog.
pub struct FilterCompiler<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> FilterCompiler<'a> {
    /// Create a filter compiler.
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Conditions for `filter.target`.
    pub fn compile_target_filters(
        &self,
        metadata: &EntityMetadata,
        query: &Query,
        sort: &CompiledSort,
    ) -> Result<Vec<Expr>, Error> {
        let Some(tree) = &query.filter.target else {
            return Ok(Vec::new());
        };
        let root = root_alias(metadata);
        let mut conditions = Vec::new();
        let mut issues = Vec::new();

        for (field, operands) in tree {
            if let Some(property) = metadata.property(field) {
                let column = Expr::col(root, field);
                let path = ["filter", field.as_str()];
                match scalar_conditions(column, property, operands, &path) {
                    Ok(mut exprs) => conditions.append(&mut exprs),
                    Err(mut errs) => issues.append(&mut errs),
                }
            } else if let Some(relation) = metadata.relation(field) {
                for (operand, value) in operands {
                    let condition =
                        self.structural_condition(metadata, relation, *operand, value, query, sort);
                    match condition {
                        Ok(expr) => conditions.push(expr),
                        Err(issue) => issues.push(issue),
                    }
                }
            } else {
                issues.push(
                    Issue::new(
                        "unknown_field",
                        format!("'{}' is not a field of '{}'", field, metadata.type_name),
                    )
                    .at(["filter", field.as_str()]),
                );
            }
        }

        if issues.is_empty() {
            Ok(conditions)
        } else {
            Err(Error::InvalidQuery(issues))
        }
    }

    /// Conditions for `filter.relation`: one group per relation.
    pub fn compile_relation_filters(
        &self,
        metadata: &EntityMetadata,
        query: &Query,
        sort: &CompiledSort,
    ) -> Result<Vec<Expr>, Error> {
        let Some(relations) = &query.filter.relation else {
            return Ok(Vec::new());
        };
        let mut conditions = Vec::new();
        let mut issues = Vec::new();

        for (name, tree) in relations {
            let Some(relation) = metadata.relation(name) else {
                issues.push(
                    Issue::new(
                        "unknown_relation",
                        format!("'{}' is not a relation of '{}'", name, metadata.type_name),
                    )
                    .at(["filter", name.as_str()]),
                );
                continue;
            };
            let target = self.registry.get(&relation.target)?;
            let joined = sort.has_relation(name) && !matches!(relation.key, RelationKey::Pivot(_));
            let alias = if joined {
                relation.name.clone()
            } else {
                subquery_alias(relation)
            };

            let mut group = Vec::new();
            for (field, operands) in tree {
                let Some(property) = target.property(field) else {
                    issues.push(
                        Issue::new(
                            "unknown_field",
                            format!("'{}' is not a property of '{}'", field, target.type_name),
                        )
                        .at(["filter", name.as_str(), field.as_str()]),
                    );
                    continue;
                };
                let column = Expr::col(&alias, field);
                let path = ["filter", name.as_str(), field.as_str()];
                match scalar_conditions(column, property, operands, &path) {
                    Ok(mut exprs) => group.append(&mut exprs),
                    Err(mut errs) => issues.append(&mut errs),
                }
            }
            if group.is_empty() {
                continue;
            }

            if joined {
                debug!(relation = %name, "relation filter on joined alias");
                conditions.append(&mut group);
            } else {
                debug!(relation = %name, "relation filter through EXISTS");
                conditions.push(Expr::exists(correlated_subquery(
                    metadata, relation, &target, &alias, group,
                )));
            }
        }

        if issues.is_empty() {
            Ok(conditions)
        } else {
            Err(Error::InvalidQuery(issues))
        }
    }

    /// Relations whose structural target filter tests an already-joined alias.
    ///
    /// The count sub-query must join these even when they are only included.
    pub fn joined_relations<'q>(
        &self,
        metadata: &EntityMetadata,
        query: &'q Query,
        sort: &CompiledSort,
    ) -> Vec<&'q str> {
        let Some(tree) = &query.filter.target else {
            return Vec::new();
        };
        tree.keys()
            .filter_map(|field| {
                let relation = metadata.relation(field)?;
                let uses_join = relation.owner_column().is_none()
                    && (sort.has_relation(field) || query.includes(field));
                uses_join.then_some(field.as_str())
            })
            .collect()
    }

    fn structural_condition(
        &self,
        metadata: &EntityMetadata,
        relation: &RelationDef,
        operand: Operand,
        value: &Value,
        query: &Query,
        sort: &CompiledSort,
    ) -> Result<Expr, Issue> {
        let path = ["filter", relation.name.as_str(), operand.as_str()];
        let absent = match operand {
            Operand::Eq if value.is_null_sentinel() => true,
            Operand::Ne if value.is_null_sentinel() => false,
            _ => {
                return Err(Issue::new(
                    "unsupported_operand",
                    format!(
                        "relation '{}' only supports eq/ne against null",
                        relation.name
                    ),
                )
                .at(path))
            }
        };
        let root = root_alias(metadata);

        if let Some(column) = relation.owner_column() {
            let fk = Expr::col(root, column);
            return Ok(if absent { fk.is_null() } else { fk.is_not_null() });
        }

        let target = self.registry.get(&relation.target).map_err(|e| {
            Issue::new("unknown_relation", e.to_string()).at(path)
        })?;
        if sort.has_relation(&relation.name) || query.includes(&relation.name) {
            debug!(relation = %relation.name, "structural filter on joined alias");
            let pk = Expr::col(&relation.name, &target.primary_key);
            return Ok(if absent { pk.is_null() } else { pk.is_not_null() });
        }

        debug!(relation = %relation.name, "structural filter through EXISTS");
        let alias = subquery_alias(relation);
        let subquery = correlated_subquery(metadata, relation, &target, &alias, Vec::new());
        Ok(if absent {
            Expr::not_exists(subquery)
        } else {
            Expr::exists(subquery)
        })
    }
}

fn literal(property: &PropertyDef, value: &Value, path: &[&str]) -> Result<Value, Issue> {
    property.semantic_type.coerce(value.clone()).map_err(|reason| {
        Issue::new(
            "invalid_value",
            format!("invalid value for '{}': {}", property.name, reason),
        )
        .at(path.iter().copied())
    })
}

/// Conditions for every operand on one scalar column.
fn scalar_conditions(
    column: Expr,
    property: &PropertyDef,
    operands: &FieldConditions,
    path: &[&str],
) -> Result<Vec<Expr>, Vec<Issue>> {
    let mut exprs = Vec::new();
    let mut issues = Vec::new();
    for (operand, value) in operands {
        let mut at: Vec<&str> = path.to_vec();
        at.push(operand.as_str());
        match scalar_condition(column.clone(), property, *operand, value, &at) {
            Ok(expr) => exprs.push(expr),
            Err(issue) => issues.push(issue),
        }
    }
    if issues.is_empty() {
        Ok(exprs)
    } else {
        Err(issues)
    }
}

fn scalar_condition(
    column: Expr,
    property: &PropertyDef,
    operand: Operand,
    value: &Value,
    path: &[&str],
) -> Result<Expr, Issue> {
    let compare = |op: CompareOp| -> Result<Expr, Issue> {
        Ok(column.clone().compare(op, Expr::Value(literal(property, value, path)?)))
    };
    match operand {
        Operand::Eq if value.is_null_sentinel() => Ok(column.is_null()),
        Operand::Ne if value.is_null_sentinel() => Ok(column.is_not_null()),
        Operand::Eq => compare(CompareOp::Eq),
        Operand::Ne => compare(CompareOp::Ne),
        Operand::Gt => compare(CompareOp::Gt),
        Operand::Lt => compare(CompareOp::Lt),
        Operand::Gte => compare(CompareOp::Ge),
        Operand::Lte => compare(CompareOp::Le),
        Operand::In | Operand::Nin => {
            let list = value
                .clone()
                .into_list()
                .iter()
                .map(|item| literal(property, item, path))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if operand == Operand::In {
                column.in_list(list)
            } else {
                column.not_in_list(list)
            })
        }
        Operand::Like => Ok(Expr::Like {
            expr: Box::new(column),
            pattern: Value::String(format!("%{}%", value)),
        }),
        Operand::Regexp => Ok(Expr::Regexp {
            expr: Box::new(column),
            pattern: Value::String(value.to_string()),
        }),
        Operand::Some => {
            if property.semantic_type != SemanticType::Array {
                return Err(Issue::new(
                    "unsupported_operand",
                    format!("'some' requires an array property, '{}' is not one", property.name),
                )
                .at(path.iter().copied()));
            }
            Ok(Expr::Overlaps {
                expr: Box::new(column),
                values: value.clone().into_list(),
            })
        }
    }
}

//! Join and correlated-subquery construction for relations.
//!
//! Aliases follow one scheme everywhere: the root row is aliased by its type
//! name, a joined relation by the relation name, its pivot by
//! `<relation>__pivot`, and a relation probed through a subquery by
//! `<relation>__sub`.

use crate::catalog::{EntityMetadata, RelationDef, RelationKey};
use crate::sql::{Expr, Join, Select};

/// Alias of the root row.
pub fn root_alias(metadata: &EntityMetadata) -> &str {
    &metadata.type_name
}

/// Alias of a relation probed through a correlated subquery.
pub fn subquery_alias(relation: &RelationDef) -> String {
    format!("{}__sub", relation.name)
}

fn pivot_alias(alias: &str) -> String {
    format!("{}__pivot", alias)
}

/// LEFT JOINs that attach `relation` (aliased `alias`) to the root row.
pub fn relation_joins(
    owner: &EntityMetadata,
    relation: &RelationDef,
    target: &EntityMetadata,
    alias: &str,
) -> Vec<Join> {
    let root = root_alias(owner);
    match &relation.key {
        RelationKey::Owner { column } => vec![Join {
            table: target.table.clone(),
            alias: alias.to_string(),
            on: Expr::col(alias, &target.primary_key).eq(Expr::col(root, column)),
        }],
        RelationKey::Target { column } => vec![Join {
            table: target.table.clone(),
            alias: alias.to_string(),
            on: Expr::col(alias, column).eq(Expr::col(root, &owner.primary_key)),
        }],
        RelationKey::Pivot(pivot) => {
            let through = pivot_alias(alias);
            vec![
                Join {
                    table: pivot.table.clone(),
                    alias: through.clone(),
                    on: Expr::col(&through, &pivot.owner_column)
                        .eq(Expr::col(root, &owner.primary_key)),
                },
                Join {
                    table: target.table.clone(),
                    alias: alias.to_string(),
                    on: Expr::col(alias, &target.primary_key)
                        .eq(Expr::col(&through, &pivot.target_column)),
                },
            ]
        }
    }
}

/// Append the joins for `relation` unless they are already present.
pub fn join_relation(
    select: &mut Select,
    owner: &EntityMetadata,
    relation: &RelationDef,
    target: &EntityMetadata,
) {
    if select.has_join(&relation.name) {
        return;
    }
    select
        .joins
        .extend(relation_joins(owner, relation, target, &relation.name));
}

/// `SELECT 1` over the related rows of the current root row.
///
/// Conditions on the related row go on `alias`; for many-to-many relations
/// the pivot drives the subquery and the target is joined onto it, so the
/// probe agrees with the joined form even for dangling pivot rows.
pub fn correlated_subquery(
    owner: &EntityMetadata,
    relation: &RelationDef,
    target: &EntityMetadata,
    alias: &str,
    conditions: Vec<Expr>,
) -> Select {
    let root = root_alias(owner);
    let select = match &relation.key {
        RelationKey::Owner { column } => Select::from_table(&target.table, alias)
            .filter(Expr::col(alias, &target.primary_key).eq(Expr::col(root, column))),
        RelationKey::Target { column } => Select::from_table(&target.table, alias)
            .filter(Expr::col(alias, column).eq(Expr::col(root, &owner.primary_key))),
        RelationKey::Pivot(pivot) => {
            let through = pivot_alias(alias);
            Select::from_table(&pivot.table, &through)
                .left_join(
                    &target.table,
                    alias,
                    Expr::col(alias, &target.primary_key)
                        .eq(Expr::col(&through, &pivot.target_column)),
                )
                .filter(
                    Expr::col(&through, &pivot.owner_column)
                        .eq(Expr::col(root, &owner.primary_key)),
                )
                // a pivot row counts only while its target row exists
                .filter(Expr::col(alias, &target.primary_key).is_not_null())
        }
    };
    select.column(Expr::One).filters(conditions)
}

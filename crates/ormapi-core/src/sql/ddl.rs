//! Table creation from the registry.

use super::render::{quote, CompiledSql, Dialect};
use crate::catalog::{EntityMetadata, KeyType, RelationKey, SchemaRegistry, SemanticType};
use crate::error::Error;
use std::collections::BTreeMap;

fn key_type_sql(key_type: KeyType, dialect: Dialect) -> &'static str {
    match (key_type, dialect) {
        (KeyType::Integer, Dialect::Sqlite) => "INTEGER",
        (KeyType::Integer, Dialect::Postgres) => "BIGINT",
        (KeyType::Uuid, Dialect::Postgres) => "UUID",
        (KeyType::Uuid | KeyType::String, _) => "TEXT",
    }
}

fn property_type_sql(semantic_type: SemanticType, dialect: Dialect) -> &'static str {
    match (semantic_type, dialect) {
        (SemanticType::String, _) => "TEXT",
        (SemanticType::Number, _) => "NUMERIC",
        (SemanticType::Boolean, Dialect::Sqlite) => "INTEGER",
        (SemanticType::Boolean, Dialect::Postgres) => "BOOLEAN",
        (SemanticType::Date, Dialect::Sqlite) => "TEXT",
        (SemanticType::Date, Dialect::Postgres) => "TIMESTAMPTZ",
        (SemanticType::Array, Dialect::Sqlite) => "TEXT",
        (SemanticType::Array, Dialect::Postgres) => "TEXT[]",
        (SemanticType::Object, Dialect::Sqlite) => "TEXT",
        (SemanticType::Object, Dialect::Postgres) => "JSONB",
    }
}

fn primary_key_sql(entity: &EntityMetadata, dialect: Dialect) -> String {
    let column = quote(&entity.primary_key);
    match (entity.primary_key_type, dialect) {
        (KeyType::Integer, Dialect::Sqlite) => format!("{} INTEGER PRIMARY KEY", column),
        (KeyType::Integer, Dialect::Postgres) => format!("{} BIGSERIAL PRIMARY KEY", column),
        (key_type, _) => format!("{} {} PRIMARY KEY", column, key_type_sql(key_type, dialect)),
    }
}

/// Generate `CREATE TABLE IF NOT EXISTS` statements for every registered type.
///
/// Foreign-key columns are added to whichever table holds them (the owner for
/// owner-side keys, the target for inverse keys); pivot tables are emitted
/// once even when both sides declare the relation.
pub fn create_tables(registry: &SchemaRegistry, dialect: Dialect) -> Result<Vec<CompiledSql>, Error> {
    // table -> (column -> type)
    let mut foreign_keys: BTreeMap<String, BTreeMap<String, &'static str>> = BTreeMap::new();
    let mut pivots: BTreeMap<String, [(String, &'static str); 2]> = BTreeMap::new();

    for entity in registry.entities() {
        for relation in &entity.relations {
            let target = registry.get(&relation.target)?;
            match &relation.key {
                RelationKey::Owner { column } => {
                    foreign_keys
                        .entry(entity.table.clone())
                        .or_default()
                        .insert(column.clone(), key_type_sql(target.primary_key_type, dialect));
                }
                RelationKey::Target { column } => {
                    foreign_keys
                        .entry(target.table.clone())
                        .or_default()
                        .insert(column.clone(), key_type_sql(entity.primary_key_type, dialect));
                }
                RelationKey::Pivot(pivot) => {
                    pivots.entry(pivot.table.clone()).or_insert_with(|| {
                        [
                            (
                                pivot.owner_column.clone(),
                                key_type_sql(entity.primary_key_type, dialect),
                            ),
                            (
                                pivot.target_column.clone(),
                                key_type_sql(target.primary_key_type, dialect),
                            ),
                        ]
                    });
                }
            }
        }
    }

    let mut statements = Vec::new();
    for entity in registry.entities() {
        let mut columns = vec![primary_key_sql(entity, dialect)];
        for property in entity.attributes() {
            let mut column = format!(
                "{} {}",
                quote(&property.name),
                property_type_sql(property.semantic_type, dialect)
            );
            if !property.nullable {
                column.push_str(" NOT NULL");
            }
            columns.push(column);
        }
        if let Some(fks) = foreign_keys.get(&entity.table) {
            for (name, sql_type) in fks {
                if entity.property(name).is_none() {
                    columns.push(format!("{} {}", quote(name), sql_type));
                }
            }
        }
        statements.push(CompiledSql::raw(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(&entity.table),
            columns.join(", ")
        )));
    }
    for (table, [(owner, owner_type), (target, target_type)]) in pivots {
        statements.push(CompiledSql::raw(format!(
            "CREATE TABLE IF NOT EXISTS {} ({} {} NOT NULL, {} {} NOT NULL, PRIMARY KEY ({}, {}))",
            quote(&table),
            quote(&owner),
            owner_type,
            quote(&target),
            target_type,
            quote(&owner),
            quote(&target)
        )));
    }
    Ok(statements)
}

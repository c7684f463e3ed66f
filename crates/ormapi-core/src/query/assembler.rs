//! Query assembler - runs read plans against a store and folds rows into
//! entities.

use super::join::root_alias;
use super::planner::{column_alias, HydrationPlan, ReadPlanner, TOTAL_COLUMN};
use super::sort::SortCompiler;
use super::value_codec::decode_value;
use crate::catalog::{EntityMetadata, SchemaRegistry};
use crate::config::EngineConfig;
use crate::error::{Error, Issue};
use crate::sql::{Compile, Expr};
use crate::store::{ResourceStore, Row};
use ormapi_proto::{Entity, PageResult, Query, Related, Value};
use std::collections::HashMap;
use tracing::debug;

/// Executes reads: count, id page, hydration.
pub struct QueryAssembler<'a> {
    registry: &'a SchemaRegistry,
    store: &'a dyn ResourceStore,
    config: &'a EngineConfig,
}

impl<'a> QueryAssembler<'a> {
    /// Create an assembler.
    pub fn new(
        registry: &'a SchemaRegistry,
        store: &'a dyn ResourceStore,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Read one page of a collection.
    pub fn get_all(&self, metadata: &EntityMetadata, query: &Query) -> Result<PageResult, Error> {
        let page = self.config.clamp_page(query.page);
        let planner = ReadPlanner::new(self.registry);
        let plan = planner.plan(metadata, query, page)?;
        let dialect = self.store.dialect();

        let total = self
            .store
            .query(&plan.count.compile(dialect))?
            .first()
            .and_then(|row| row.get(TOTAL_COLUMN).as_i64())
            .unwrap_or(0)
            .max(0) as u64;
        if total == 0 {
            debug!(type_name = %metadata.type_name, "empty count, skipping hydration");
            return Ok(PageResult::empty());
        }
        if page.offset() >= total {
            debug!(
                type_name = %metadata.type_name,
                total,
                page = page.number,
                "page past the last row"
            );
            return Ok(PageResult {
                total_items: total,
                items: Vec::new(),
            });
        }

        let ids: Vec<Value> = self
            .store
            .query(&plan.ids.compile(dialect))?
            .into_iter()
            .map(|mut row| row.take(&metadata.primary_key))
            .collect();
        debug!(
            type_name = %metadata.type_name,
            total,
            page = page.number,
            ids = ids.len(),
            "collected page ids"
        );
        if ids.is_empty() {
            return Ok(PageResult {
                total_items: total,
                items: Vec::new(),
            });
        }

        let condition =
            Expr::col(root_alias(metadata), &metadata.primary_key).in_list(ids.clone());
        let hydration = planner.hydration_select(metadata, &plan.hydration, &plan.sort, condition);
        let rows = self.store.query(&hydration.compile(dialect))?;
        let items = reorder(fold_rows(metadata, &plan.hydration, rows)?, &ids);
        Ok(PageResult {
            total_items: total,
            items,
        })
    }

    /// Read one resource by id.
    ///
    /// With filters present the id is first confirmed through the filtered
    /// query, so a row hidden by the filters reads as missing.
    pub fn get_one(&self, metadata: &EntityMetadata, id: &str, query: &Query) -> Result<Entity, Error> {
        let key = metadata
            .primary_key_type
            .parse_id(id)
            .ok_or_else(|| missing(metadata, id))?;
        let planner = ReadPlanner::new(self.registry);
        let sort = SortCompiler::new(self.registry).compile(metadata, query)?;
        let plan = planner.hydration_plan(metadata, query)?;
        let dialect = self.store.dialect();
        let by_key = Expr::col(root_alias(metadata), &metadata.primary_key).eq(Expr::Value(key));

        if !query.filter.is_empty() {
            let mut confirm = planner.filtered_select(metadata, query, &sort)?;
            confirm.filter.push(by_key.clone());
            confirm.limit = Some(1);
            if self.store.query(&confirm.compile(dialect))?.is_empty() {
                return Err(missing(metadata, id));
            }
        }

        let mut select = planner.hydration_select(metadata, &plan, &sort, by_key);
        if plan.relations.is_empty() {
            debug!(type_name = %metadata.type_name, id, "direct lookup");
            select.order_by.clear();
            select.limit = Some(1);
        }
        let rows = self.store.query(&select.compile(dialect))?;
        fold_rows(metadata, &plan, rows)?
            .into_iter()
            .next()
            .ok_or_else(|| missing(metadata, id))
    }
}

/// Not-found error for a missing row.
pub(crate) fn missing(metadata: &EntityMetadata, id: &str) -> Error {
    Error::not_found(Issue::new(
        "not_found",
        format!(
            "Resource '{}' with id '{}' does not exist",
            metadata.type_name, id
        ),
    ))
}

fn build_entity(
    metadata: &EntityMetadata,
    alias: &str,
    fields: &[String],
    id: Value,
    row: &mut Row,
) -> Result<Entity, Error> {
    let mut entity = Entity::new(metadata.type_name.clone(), id);
    for field in fields {
        let raw = row.take(&column_alias(alias, field));
        let value = match metadata.property(field) {
            Some(property) => decode_value(property.semantic_type, raw)?,
            None => raw,
        };
        entity.attributes.insert(field.clone(), value);
    }
    Ok(entity)
}

/// Fold joined rows into entities, deduplicating related rows by key.
///
/// Entities come out in first-seen row order.
fn fold_rows(
    metadata: &EntityMetadata,
    plan: &HydrationPlan,
    rows: Vec<Row>,
) -> Result<Vec<Entity>, Error> {
    let root = root_alias(metadata);
    let pk_column = column_alias(root, &metadata.primary_key);
    let mut order: Vec<String> = Vec::new();
    let mut entities: HashMap<String, Entity> = HashMap::new();

    for mut row in rows {
        let id = row.take(&pk_column);
        if id.is_null() {
            continue;
        }
        let key = id.to_id_string();
        if !entities.contains_key(&key) {
            let mut entity = build_entity(metadata, root, &plan.root_fields, id, &mut row)?;
            for hydrated in &plan.relations {
                let empty = if hydrated.relation.is_to_many() {
                    Related::Many(Vec::new())
                } else {
                    Related::One(None)
                };
                entity
                    .relationships
                    .insert(hydrated.relation.name.clone(), empty);
            }
            order.push(key.clone());
            entities.insert(key.clone(), entity);
        }
        let Some(entity) = entities.get_mut(&key) else {
            continue;
        };

        for hydrated in &plan.relations {
            let alias = hydrated.relation.name.as_str();
            let related_id = row.take(&column_alias(alias, &hydrated.target.primary_key));
            if related_id.is_null() {
                continue;
            }
            match entity.relationships.get_mut(alias) {
                Some(Related::Many(items)) => {
                    if !items.iter().any(|e| e.id == related_id) {
                        let related =
                            build_entity(&hydrated.target, alias, &hydrated.fields, related_id, &mut row)?;
                        items.push(related);
                    }
                }
                Some(Related::One(slot)) => {
                    if slot.is_none() {
                        let related =
                            build_entity(&hydrated.target, alias, &hydrated.fields, related_id, &mut row)?;
                        *slot = Some(Box::new(related));
                    }
                }
                None => {}
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|key| entities.remove(&key))
        .collect())
}

/// Put entities back in the order the id query returned.
fn reorder(entities: Vec<Entity>, ids: &[Value]) -> Vec<Entity> {
    let mut by_id: HashMap<String, Entity> = entities
        .into_iter()
        .map(|e| (e.id.to_id_string(), e))
        .collect();
    ids.iter()
        .filter_map(|id| by_id.remove(&id.to_id_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PivotDef, PropertyDef, RelationDef, SemanticType};
    use crate::query::planner::HydratedRelation;

    fn users() -> EntityMetadata {
        EntityMetadata::new("users")
            .with_property(PropertyDef::new("login", SemanticType::String))
            .with_property(PropertyDef::new("isActive", SemanticType::Boolean))
    }

    fn plan() -> HydrationPlan {
        HydrationPlan {
            root_fields: vec!["login".into(), "isActive".into()],
            relations: vec![HydratedRelation {
                relation: RelationDef::many_to_many(
                    "roles",
                    "roles",
                    PivotDef::new("users_have_roles", "user_id", "role_id"),
                ),
                target: std::sync::Arc::new(
                    EntityMetadata::new("roles")
                        .with_property(PropertyDef::new("name", SemanticType::String)),
                ),
                fields: vec!["name".into()],
            }],
        }
    }

    fn row(id: i64, login: &str, role: Option<(i64, &str)>) -> Row {
        let mut row: Row = [
            ("users.id", Value::Int(id)),
            ("users.login", Value::from(login)),
            ("users.isActive", Value::Int(1)),
        ]
        .into_iter()
        .collect();
        if let Some((role_id, name)) = role {
            row.insert("roles.id", Value::Int(role_id));
            row.insert("roles.name", Value::from(name));
        }
        row
    }

    #[test]
    fn test_fold_dedupes_related_rows() {
        let rows = vec![
            row(1, "ann", Some((10, "admin"))),
            row(1, "ann", Some((11, "dev"))),
            row(1, "ann", Some((10, "admin"))),
            row(2, "bob", None),
        ];
        let entities = fold_rows(&users(), &plan(), rows).unwrap();
        assert_eq!(entities.len(), 2);

        let ann = &entities[0];
        assert_eq!(ann.attribute("isActive"), Some(&Value::Bool(true)));
        let Some(Related::Many(roles)) = ann.relationships.get("roles") else {
            panic!("roles not hydrated");
        };
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[1].attribute("name"), Some(&Value::from("dev")));

        assert_eq!(
            entities[1].relationships.get("roles"),
            Some(&Related::Many(Vec::new()))
        );
    }

    #[test]
    fn test_reorder_follows_ids() {
        let entities = vec![
            Entity::new("users", Value::Int(1)),
            Entity::new("users", Value::Int(2)),
            Entity::new("users", Value::Int(3)),
        ];
        let ordered = reorder(entities, &[Value::Int(3), Value::Int(1), Value::Int(9)]);
        let ids: Vec<String> = ordered.iter().map(|e| e.id.to_id_string()).collect();
        assert_eq!(ids, ["3", "1"]);
    }
}

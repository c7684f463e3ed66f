//! Mutation orchestration: validate everything, then write, then re-read.

use super::relationship::RelationWriter;
use super::validator::{RelationshipValidator, ResolvedIds};
use crate::catalog::{Cardinality, EntityMetadata, KeyType, RelationDef, SchemaRegistry};
use crate::config::EngineConfig;
use crate::error::{Error, Issue};
use crate::query::{encode_value, missing, QueryAssembler};
use crate::sql::{Compile, Delete, Expr, Insert, Select, Update};
use crate::store::ResourceStore;
use ormapi_proto::{Entity, MutationPayload, Query, RelationshipData, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Validated relationship linkage of a payload, keyed by relation name.
type ResolvedRelations<'m> = Vec<(&'m RelationDef, ResolvedIds)>;

/// Runs create/update/delete and relationship operations.
pub struct MutationOrchestrator<'a> {
    registry: &'a SchemaRegistry,
    store: &'a dyn ResourceStore,
    config: &'a EngineConfig,
}

impl<'a> MutationOrchestrator<'a> {
    /// Create an orchestrator.
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

    fn writer(&self) -> RelationWriter<'a> {
        RelationWriter::new(self.registry, self.store)
    }

    fn assembler(&self) -> QueryAssembler<'a> {
        QueryAssembler::new(self.registry, self.store, self.config)
    }

    /// Create a resource.
    pub fn post_one(&self, metadata: &EntityMetadata, payload: &MutationPayload) -> Result<Entity, Error> {
        let key = match &payload.id {
            Some(raw) => Some(metadata.primary_key_type.parse_id(raw).ok_or_else(|| {
                Error::Unprocessable(vec![Issue::new(
                    "invalid_id",
                    format!("'{}' is not a valid id for '{}'", raw, metadata.type_name),
                )
                .at(["id"])])
            })?),
            None => metadata.primary_key_type.generate(),
        };
        if key.is_none() && metadata.primary_key_type != KeyType::Integer {
            return Err(Error::Unprocessable(vec![Issue::new(
                "missing_id",
                format!("'{}' requires a client-supplied id", metadata.type_name),
            )
            .at(["id"])]));
        }

        let (attributes, relations) = self.validate(metadata, payload, true)?;

        let mut columns: Vec<(String, Value)> = Vec::new();
        if let Some(key) = &key {
            columns.push((metadata.primary_key.clone(), key.clone()));
        }
        columns.extend(attributes);
        for (relation, resolved) in &relations {
            if let Some(column) = inline_column(relation) {
                let value = match resolved {
                    ResolvedIds::One(id) => id.clone(),
                    _ => Value::Null,
                };
                columns.push((column.to_string(), value));
            }
        }

        let dialect = self.store.dialect();
        let key = match key {
            Some(key) => {
                self.store
                    .execute(&Insert::row(&metadata.table, columns).compile(dialect))?;
                key
            }
            None => {
                let insert = Insert::row(&metadata.table, columns).returning(&metadata.primary_key);
                self.store
                    .query(&insert.compile(dialect))?
                    .into_iter()
                    .next()
                    .map(|mut row| row.take(&metadata.primary_key))
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| Error::Storage("insert returned no primary key".into()))?
            }
        };

        let writer = self.writer();
        for (relation, resolved) in &relations {
            if inline_column(relation).is_some() {
                continue;
            }
            match resolved {
                ResolvedIds::Many(ids) => writer.add(metadata, relation, &key, ids)?,
                ResolvedIds::One(id) => writer.set_one(metadata, relation, &key, Some(id))?,
                ResolvedIds::Null => {}
            }
        }
        info!(type_name = %metadata.type_name, id = %key, "resource created");

        self.reread(metadata, &key, payload)
    }

    /// Update a resource; only attributes and relationships present change.
    pub fn patch_one(
        &self,
        metadata: &EntityMetadata,
        id: &str,
        payload: &MutationPayload,
    ) -> Result<Entity, Error> {
        if payload.id.as_deref() != Some(id) {
            return Err(Error::Unprocessable(vec![Issue::new(
                "id_mismatch",
                "Data 'id' must be equal to url param",
            )
            .at(["id"])]));
        }
        let key = self.existing_key(metadata, id)?;
        let (attributes, relations) = self.validate(metadata, payload, false)?;

        if !attributes.is_empty() {
            let mut update = Update::table(&metadata.table)
                .filter(Expr::bare(&metadata.primary_key).eq(Expr::Value(key.clone())));
            update.assignments = attributes;
            self.store.execute(&update.compile(self.store.dialect()))?;
        }

        let writer = self.writer();
        for (relation, resolved) in &relations {
            match resolved {
                ResolvedIds::Many(ids) => writer.replace(metadata, relation, &key, ids)?,
                ResolvedIds::One(target) => writer.set_one(metadata, relation, &key, Some(target))?,
                ResolvedIds::Null => writer.set_one(metadata, relation, &key, None)?,
            }
        }
        info!(type_name = %metadata.type_name, id, "resource updated");

        self.reread(metadata, &key, payload)
    }

    /// Delete a resource and every link pointing at it. Missing rows are a
    /// no-op.
    pub fn delete_one(&self, metadata: &EntityMetadata, id: &str) -> Result<(), Error> {
        let Some(key) = metadata.primary_key_type.parse_id(id) else {
            debug!(type_name = %metadata.type_name, id, "delete of unparseable id ignored");
            return Ok(());
        };
        self.writer().detach_all(metadata, &key)?;
        let removed = self.store.execute(
            &Delete::from_table(&metadata.table)
                .filter(Expr::bare(&metadata.primary_key).eq(Expr::Value(key)))
                .compile(self.store.dialect()),
        )?;
        if removed == 0 {
            debug!(type_name = %metadata.type_name, id, "delete of missing row ignored");
        } else {
            info!(type_name = %metadata.type_name, id, "resource deleted");
        }
        Ok(())
    }

    /// Current linkage of a relation.
    pub fn get_relationship(
        &self,
        metadata: &EntityMetadata,
        id: &str,
        relation: &str,
    ) -> Result<RelationshipData, Error> {
        let relation = relation_of(metadata, relation)?;
        let key = self.existing_key(metadata, id)?;
        self.writer().read(metadata, relation, &key)
    }

    /// Add links: set union for to-many, set-if-unset for to-one.
    pub fn post_relationship(
        &self,
        metadata: &EntityMetadata,
        id: &str,
        relation: &str,
        data: &RelationshipData,
    ) -> Result<RelationshipData, Error> {
        let (relation, key, resolved) = self.prepare_relationship(metadata, id, relation, data)?;
        let writer = self.writer();
        match resolved {
            ResolvedIds::Many(ids) => writer.add(metadata, relation, &key, &ids)?,
            ResolvedIds::One(target) => {
                if writer.current_ids(metadata, relation, &key)?.is_empty() {
                    writer.set_one(metadata, relation, &key, Some(&target))?;
                } else {
                    debug!(relation = %relation.name, "to-one already set, post ignored");
                }
            }
            ResolvedIds::Null => {}
        }
        info!(type_name = %metadata.type_name, id, relation = %relation.name, "relationship added");
        writer.read(metadata, relation, &key)
    }

    /// Replace links: exact set for to-many, unconditional set for to-one.
    pub fn patch_relationship(
        &self,
        metadata: &EntityMetadata,
        id: &str,
        relation: &str,
        data: &RelationshipData,
    ) -> Result<RelationshipData, Error> {
        let (relation, key, resolved) = self.prepare_relationship(metadata, id, relation, data)?;
        let writer = self.writer();
        match resolved {
            ResolvedIds::Many(ids) => writer.replace(metadata, relation, &key, &ids)?,
            ResolvedIds::One(target) => writer.set_one(metadata, relation, &key, Some(&target))?,
            ResolvedIds::Null => writer.set_one(metadata, relation, &key, None)?,
        }
        info!(type_name = %metadata.type_name, id, relation = %relation.name, "relationship replaced");
        writer.read(metadata, relation, &key)
    }

    /// Remove links: set difference for to-many; for to-one the link is
    /// cleared only when it currently points at the requested target.
    pub fn delete_relationship(
        &self,
        metadata: &EntityMetadata,
        id: &str,
        relation: &str,
        data: &RelationshipData,
    ) -> Result<RelationshipData, Error> {
        let (relation, key, resolved) = self.prepare_relationship(metadata, id, relation, data)?;
        let writer = self.writer();
        match resolved {
            ResolvedIds::Many(ids) => writer.remove(metadata, relation, &key, &ids)?,
            ResolvedIds::One(target) => {
                let current = writer.current_ids(metadata, relation, &key)?;
                if current.iter().any(|c| c.to_id_string() == target.to_id_string()) {
                    writer.set_one(metadata, relation, &key, None)?;
                } else {
                    debug!(relation = %relation.name, "to-one points elsewhere, delete ignored");
                }
            }
            ResolvedIds::Null => {}
        }
        info!(type_name = %metadata.type_name, id, relation = %relation.name, "relationship removed");
        writer.read(metadata, relation, &key)
    }

    fn prepare_relationship<'m>(
        &self,
        metadata: &'m EntityMetadata,
        id: &str,
        relation: &str,
        data: &RelationshipData,
    ) -> Result<(&'m RelationDef, Value, ResolvedIds), Error> {
        let relation = relation_of(metadata, relation)?;
        let key = self.existing_key(metadata, id)?;
        let resolved = RelationshipValidator::new(self.registry, self.store).validate(relation, data)?;
        Ok((relation, key, resolved))
    }

    /// Parse `id` and confirm the row exists.
    fn existing_key(&self, metadata: &EntityMetadata, id: &str) -> Result<Value, Error> {
        let key = metadata
            .primary_key_type
            .parse_id(id)
            .ok_or_else(|| missing(metadata, id))?;
        let alias = metadata.table.as_str();
        let select = Select::from_table(&metadata.table, alias)
            .column(Expr::One)
            .filter(Expr::col(alias, &metadata.primary_key).eq(Expr::Value(key.clone())));
        if self.store.query(&select.compile(self.store.dialect()))?.is_empty() {
            return Err(missing(metadata, id));
        }
        Ok(key)
    }

    /// Validate attributes and every relationship before anything is written.
    fn validate<'m>(
        &self,
        metadata: &'m EntityMetadata,
        payload: &MutationPayload,
        creating: bool,
    ) -> Result<(Vec<(String, Value)>, ResolvedRelations<'m>), Error> {
        let mut errors = Vec::new();
        let attributes = match validate_attributes(metadata, &payload.attributes, creating) {
            Ok(attributes) => attributes,
            Err(issues) => {
                errors.push(Error::Unprocessable(issues));
                Vec::new()
            }
        };

        let validator = RelationshipValidator::new(self.registry, self.store);
        let mut relations = Vec::new();
        for (name, body) in &payload.relationships {
            let Some(relation) = metadata.relation(name) else {
                errors.push(Error::Unprocessable(vec![Issue::new(
                    "unknown_relation",
                    format!("'{}' is not a relation of '{}'", name, metadata.type_name),
                )
                .at(["relationships", name.as_str()])]));
                continue;
            };
            match validator.validate(relation, &body.data) {
                Ok(resolved) => relations.push((relation, resolved)),
                Err(err) => errors.push(err.with_prefix(&["relationships", name.as_str()])),
            }
        }

        match Error::combine(errors) {
            Some(err) => Err(err),
            None => Ok((attributes, relations)),
        }
    }

    fn reread(&self, metadata: &EntityMetadata, key: &Value, payload: &MutationPayload) -> Result<Entity, Error> {
        let mut query = Query::new();
        for name in payload.relationships.keys() {
            query = query.include(name.clone());
        }
        self.assembler().get_one(metadata, &key.to_id_string(), &query)
    }
}

/// Foreign key written together with the owner row. One-to-one owner keys
/// go through the writer so that other owners get detached first.
fn inline_column(relation: &RelationDef) -> Option<&str> {
    match relation.cardinality {
        Cardinality::ManyToOne => relation.owner_column(),
        _ => None,
    }
}

fn relation_of<'m>(metadata: &'m EntityMetadata, name: &str) -> Result<&'m RelationDef, Error> {
    metadata.relation(name).ok_or_else(|| {
        Error::invalid_query(
            Issue::new(
                "unknown_relation",
                format!("'{}' is not a relation of '{}'", name, metadata.type_name),
            )
            .at(["relationships", name]),
        )
    })
}

/// Coerce payload attributes to their semantic types.
///
/// On create every non-nullable attribute must be present.
fn validate_attributes(
    metadata: &EntityMetadata,
    attributes: &BTreeMap<String, Value>,
    creating: bool,
) -> Result<Vec<(String, Value)>, Vec<Issue>> {
    let mut issues = Vec::new();
    let mut columns = Vec::new();

    for (name, value) in attributes {
        let path = ["attributes", name.as_str()];
        let Some(property) = metadata.attributes().find(|p| &p.name == name) else {
            issues.push(
                Issue::new(
                    "unknown_attribute",
                    format!("'{}' is not an attribute of '{}'", name, metadata.type_name),
                )
                .at(path),
            );
            continue;
        };
        if value.is_null() && !property.nullable {
            issues.push(Issue::new("not_nullable", format!("'{}' cannot be null", name)).at(path));
            continue;
        }
        match encode_value(property.semantic_type, value.clone()) {
            Ok(encoded) => columns.push((name.clone(), encoded)),
            Err(reason) => issues.push(
                Issue::new("invalid_value", format!("invalid value for '{}': {}", name, reason))
                    .at(path),
            ),
        }
    }

    if creating {
        for property in metadata.attributes() {
            if !property.nullable && !attributes.contains_key(&property.name) {
                issues.push(
                    Issue::new("required", format!("'{}' is required", property.name))
                        .at(["attributes", property.name.as_str()]),
                );
            }
        }
    }

    if issues.is_empty() {
        Ok(columns)
    } else {
        Err(issues)
    }
}

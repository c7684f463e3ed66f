//! Relation write primitives, one strategy per key placement.

use crate::catalog::{Cardinality, EntityMetadata, RelationDef, RelationKey, SchemaRegistry};
use crate::error::Error;
use crate::sql::{Compile, CompareOp, Delete, Expr, Insert, Select, Update};
use crate::store::{ResourceStore, Row};
use ormapi_proto::{RelationshipData, SortDirection, Value};
use tracing::debug;

/// Reads and rewrites the links of one owner row.
pub struct RelationWriter<'a> {
    registry: &'a SchemaRegistry,
    store: &'a dyn ResourceStore,
}

impl<'a> RelationWriter<'a> {
    /// Create a writer.
    pub fn new(registry: &'a SchemaRegistry, store: &'a dyn ResourceStore) -> Self {
        Self { registry, store }
    }

    fn run_query(&self, select: Select) -> Result<Vec<Row>, Error> {
        self.store.query(&select.compile(self.store.dialect()))
    }

    fn run(&self, statement: &impl Compile) -> Result<u64, Error> {
        self.store.execute(&statement.compile(self.store.dialect()))
    }

    /// Keys currently linked to `owner_id`, ordered.
    pub fn current_ids(
        &self,
        owner: &EntityMetadata,
        relation: &RelationDef,
        owner_id: &Value,
    ) -> Result<Vec<Value>, Error> {
        const KEY: &str = "related_id";
        let select = match &relation.key {
            RelationKey::Owner { column } => Select::from_table(&owner.table, &owner.table)
                .column_as(Expr::col(&owner.table, column), KEY)
                .filter(Expr::col(&owner.table, &owner.primary_key).eq(Expr::Value(owner_id.clone())))
                .filter(Expr::col(&owner.table, column).is_not_null()),
            RelationKey::Target { column } => {
                let target = self.registry.get(&relation.target)?;
                Select::from_table(&target.table, &target.table)
                    .column_as(Expr::col(&target.table, &target.primary_key), KEY)
                    .filter(Expr::col(&target.table, column).eq(Expr::Value(owner_id.clone())))
                    .order_by(Expr::col(&target.table, &target.primary_key), SortDirection::Asc)
            }
            RelationKey::Pivot(pivot) => Select::from_table(&pivot.table, &pivot.table)
                .column_as(Expr::col(&pivot.table, &pivot.target_column), KEY)
                .filter(Expr::col(&pivot.table, &pivot.owner_column).eq(Expr::Value(owner_id.clone())))
                .order_by(Expr::col(&pivot.table, &pivot.target_column), SortDirection::Asc),
        };
        Ok(self
            .run_query(select)?
            .into_iter()
            .map(|mut row| row.take(KEY))
            .filter(|v| !v.is_null())
            .collect())
    }

    /// Current links as relationship data.
    pub fn read(
        &self,
        owner: &EntityMetadata,
        relation: &RelationDef,
        owner_id: &Value,
    ) -> Result<RelationshipData, Error> {
        let ids = self.current_ids(owner, relation, owner_id)?;
        Ok(if relation.is_to_many() {
            RelationshipData::many(&relation.target, ids.iter().map(Value::to_id_string))
        } else {
            match ids.first() {
                Some(id) => RelationshipData::one(relation.target.clone(), id.to_id_string()),
                None => RelationshipData::null(),
            }
        })
    }

    /// Link `ids` to the owner. For to-one relations only the first key is used.
    pub fn add(
        &self,
        owner: &EntityMetadata,
        relation: &RelationDef,
        owner_id: &Value,
        ids: &[Value],
    ) -> Result<(), Error> {
        if ids.is_empty() {
            return Ok(());
        }
        match &relation.key {
            RelationKey::Owner { column } => {
                let id = &ids[0];
                if relation.cardinality == Cardinality::OneToOne {
                    // Detach the target from any other owner first.
                    self.run(
                        &Update::table(&owner.table)
                            .set(column, Value::Null)
                            .filter(Expr::bare(column).eq(Expr::Value(id.clone())))
                            .filter(Expr::bare(&owner.primary_key).compare(
                                CompareOp::Ne,
                                Expr::Value(owner_id.clone()),
                            )),
                    )?;
                }
                self.run(
                    &Update::table(&owner.table)
                        .set(column, id.clone())
                        .filter(Expr::bare(&owner.primary_key).eq(Expr::Value(owner_id.clone()))),
                )?;
            }
            RelationKey::Target { column } => {
                let target = self.registry.get(&relation.target)?;
                if !relation.is_to_many() {
                    self.run(
                        &Update::table(&target.table)
                            .set(column, Value::Null)
                            .filter(Expr::bare(column).eq(Expr::Value(owner_id.clone()))),
                    )?;
                }
                let linked = if relation.is_to_many() { ids } else { &ids[..1] };
                self.run(
                    &Update::table(&target.table)
                        .set(column, owner_id.clone())
                        .filter(Expr::bare(&target.primary_key).in_list(linked.to_vec())),
                )?;
            }
            RelationKey::Pivot(pivot) => {
                let current: Vec<String> = self
                    .current_ids(owner, relation, owner_id)?
                    .iter()
                    .map(Value::to_id_string)
                    .collect();
                let mut insert = Insert::into_table(&pivot.table);
                insert.columns = vec![pivot.owner_column.clone(), pivot.target_column.clone()];
                for id in ids {
                    let key = id.to_id_string();
                    if current.contains(&key)
                        || insert.rows.iter().any(|r| r[1].to_id_string() == key)
                    {
                        continue;
                    }
                    insert.rows.push(vec![owner_id.clone(), id.clone()]);
                }
                if !insert.rows.is_empty() {
                    self.run(&insert)?;
                }
            }
        }
        debug!(relation = %relation.name, owner = %owner_id, count = ids.len(), "linked");
        Ok(())
    }

    /// Unlink `ids` from the owner; keys that are not linked are ignored.
    pub fn remove(
        &self,
        owner: &EntityMetadata,
        relation: &RelationDef,
        owner_id: &Value,
        ids: &[Value],
    ) -> Result<(), Error> {
        if ids.is_empty() {
            return Ok(());
        }
        let by_owner = |column: &str| Expr::bare(column).eq(Expr::Value(owner_id.clone()));
        match &relation.key {
            RelationKey::Owner { column } => {
                self.run(
                    &Update::table(&owner.table)
                        .set(column, Value::Null)
                        .filter(by_owner(owner.primary_key.as_str()))
                        .filter(Expr::bare(column).in_list(ids.to_vec())),
                )?;
            }
            RelationKey::Target { column } => {
                let target = self.registry.get(&relation.target)?;
                self.run(
                    &Update::table(&target.table)
                        .set(column, Value::Null)
                        .filter(by_owner(column.as_str()))
                        .filter(Expr::bare(&target.primary_key).in_list(ids.to_vec())),
                )?;
            }
            RelationKey::Pivot(pivot) => {
                self.run(
                    &Delete::from_table(&pivot.table)
                        .filter(by_owner(pivot.owner_column.as_str()))
                        .filter(Expr::bare(&pivot.target_column).in_list(ids.to_vec())),
                )?;
            }
        }
        debug!(relation = %relation.name, owner = %owner_id, count = ids.len(), "unlinked");
        Ok(())
    }

    /// Set or clear a to-one relation.
    pub fn set_one(
        &self,
        owner: &EntityMetadata,
        relation: &RelationDef,
        owner_id: &Value,
        id: Option<&Value>,
    ) -> Result<(), Error> {
        match id {
            Some(id) => self.add(owner, relation, owner_id, std::slice::from_ref(id)),
            None => {
                let current = self.current_ids(owner, relation, owner_id)?;
                self.remove(owner, relation, owner_id, &current)
            }
        }
    }

    /// Make the owner's links exactly `ids`: add the missing, remove the rest.
    pub fn replace(
        &self,
        owner: &EntityMetadata,
        relation: &RelationDef,
        owner_id: &Value,
        ids: &[Value],
    ) -> Result<(), Error> {
        let current = self.current_ids(owner, relation, owner_id)?;
        let wanted: Vec<String> = ids.iter().map(Value::to_id_string).collect();
        let stale: Vec<Value> = current
            .iter()
            .filter(|v| !wanted.contains(&v.to_id_string()))
            .cloned()
            .collect();
        let current: Vec<String> = current.iter().map(Value::to_id_string).collect();
        let fresh: Vec<Value> = ids
            .iter()
            .filter(|v| !current.contains(&v.to_id_string()))
            .cloned()
            .collect();
        self.remove(owner, relation, owner_id, &stale)?;
        self.add(owner, relation, owner_id, &fresh)
    }

    /// Drop every link that points at the row `id` of `metadata`.
    ///
    /// Foreign keys referencing the row are nulled wherever they live, and
    /// pivot rows naming it on either side are deleted, whichever type
    /// declares the relation.
    pub fn detach_all(&self, metadata: &EntityMetadata, id: &Value) -> Result<(), Error> {
        let key = || Expr::Value(id.clone());
        for entity in self.registry.entities() {
            let declared_here = entity.type_name == metadata.type_name;
            for relation in &entity.relations {
                let points_here = relation.target == metadata.type_name;
                match &relation.key {
                    RelationKey::Owner { column } if points_here => {
                        let cleared = self.run(
                            &Update::table(&entity.table)
                                .set(column, Value::Null)
                                .filter(Expr::bare(column).eq(key())),
                        )?;
                        debug!(table = %entity.table, column = %column, cleared, "references cleared");
                    }
                    RelationKey::Target { column } if declared_here => {
                        let target = self.registry.get(&relation.target)?;
                        let cleared = self.run(
                            &Update::table(&target.table)
                                .set(column, Value::Null)
                                .filter(Expr::bare(column).eq(key())),
                        )?;
                        debug!(table = %target.table, column = %column, cleared, "references cleared");
                    }
                    RelationKey::Pivot(pivot) => {
                        let mut sides = Vec::with_capacity(2);
                        if declared_here {
                            sides.push(&pivot.owner_column);
                        }
                        if points_here {
                            sides.push(&pivot.target_column);
                        }
                        for column in sides {
                            let removed = self.run(
                                &Delete::from_table(&pivot.table)
                                    .filter(Expr::bare(column).eq(key())),
                            )?;
                            debug!(pivot = %pivot.table, removed, "links deleted");
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

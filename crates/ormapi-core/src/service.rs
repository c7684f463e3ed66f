//! Resource service: every operation addressed by type name.

use crate::catalog::{EntityMetadata, SchemaRegistry};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::mutation::MutationOrchestrator;
use crate::query::{ExplainService, QueryAssembler, ReadExplain};
use crate::sql::Dialect;
use crate::store::ResourceStore;
use ormapi_proto::{Entity, MutationPayload, PageResult, Query, RelationshipData};
use std::sync::Arc;

/// Entry point wiring the registry, the store and the engine configuration.
///
/// Cloning is cheap; clones share the registry and the store.
#[derive(Clone)]
pub struct ResourceService {
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn ResourceStore>,
    config: EngineConfig,
}

impl ResourceService {
    /// Create a service with the default configuration.
    pub fn new(registry: Arc<SchemaRegistry>, store: Arc<dyn ResourceStore>) -> Self {
        Self::with_config(registry, store, EngineConfig::default())
    }

    /// Create a service with an explicit configuration.
    pub fn with_config(
        registry: Arc<SchemaRegistry>,
        store: Arc<dyn ResourceStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// The schema registry, for callers that reason about the same field and
    /// relation vocabulary (e.g. authorization layers).
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }

    fn metadata(&self, type_name: &str) -> Result<Arc<EntityMetadata>, Error> {
        self.registry.get(type_name)
    }

    fn assembler(&self) -> QueryAssembler<'_> {
        QueryAssembler::new(&self.registry, self.store.as_ref(), &self.config)
    }

    fn orchestrator(&self) -> MutationOrchestrator<'_> {
        MutationOrchestrator::new(&self.registry, self.store.as_ref(), &self.config)
    }

    /// Read one page of a collection.
    pub fn get_all(&self, type_name: &str, query: &Query) -> Result<PageResult, Error> {
        let metadata = self.metadata(type_name)?;
        self.assembler().get_all(&metadata, query)
    }

    /// Read a single resource.
    pub fn get_one(&self, type_name: &str, id: &str, query: &Query) -> Result<Entity, Error> {
        let metadata = self.metadata(type_name)?;
        self.assembler().get_one(&metadata, id, query)
    }

    /// Create a resource.
    pub fn post_one(&self, type_name: &str, payload: &MutationPayload) -> Result<Entity, Error> {
        let metadata = self.metadata(type_name)?;
        self.orchestrator().post_one(&metadata, payload)
    }

    /// Update a resource.
    pub fn patch_one(
        &self,
        type_name: &str,
        id: &str,
        payload: &MutationPayload,
    ) -> Result<Entity, Error> {
        let metadata = self.metadata(type_name)?;
        self.orchestrator().patch_one(&metadata, id, payload)
    }

    /// Delete a resource.
    pub fn delete_one(&self, type_name: &str, id: &str) -> Result<(), Error> {
        let metadata = self.metadata(type_name)?;
        self.orchestrator().delete_one(&metadata, id)
    }

    /// Read the linkage of a relation.
    pub fn get_relationship(
        &self,
        type_name: &str,
        id: &str,
        relation: &str,
    ) -> Result<RelationshipData, Error> {
        let metadata = self.metadata(type_name)?;
        self.orchestrator().get_relationship(&metadata, id, relation)
    }

    /// Add links to a relation.
    pub fn post_relationship(
        &self,
        type_name: &str,
        id: &str,
        relation: &str,
        data: &RelationshipData,
    ) -> Result<RelationshipData, Error> {
        let metadata = self.metadata(type_name)?;
        self.orchestrator()
            .post_relationship(&metadata, id, relation, data)
    }

    /// Replace the links of a relation.
    pub fn patch_relationship(
        &self,
        type_name: &str,
        id: &str,
        relation: &str,
        data: &RelationshipData,
    ) -> Result<RelationshipData, Error> {
        let metadata = self.metadata(type_name)?;
        self.orchestrator()
            .patch_relationship(&metadata, id, relation, data)
    }

    /// Remove links from a relation.
    pub fn delete_relationship(
        &self,
        type_name: &str,
        id: &str,
        relation: &str,
        data: &RelationshipData,
    ) -> Result<RelationshipData, Error> {
        let metadata = self.metadata(type_name)?;
        self.orchestrator()
            .delete_relationship(&metadata, id, relation, data)
    }

    /// Render the statements a collection read would run.
    pub fn explain(
        &self,
        type_name: &str,
        query: &Query,
        dialect: Dialect,
    ) -> Result<ReadExplain, Error> {
        let metadata = self.metadata(type_name)?;
        ExplainService::new(&self.registry, &self.config).explain(&metadata, query, dialect)
    }

    /// Run `f` inside a store transaction.
    ///
    /// Commits when `f` succeeds and rolls back when it fails. Other clones of
    /// the service sharing the store wait until the transaction has finished;
    /// nested calls roll back only their own writes.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Self) -> Result<T, Error>,
    {
        let mut f = Some(f);
        let mut value = None;
        self.store.transaction(&mut || {
            if let Some(f) = f.take() {
                value = Some(f(self)?);
            }
            Ok(())
        })?;
        value.ok_or_else(|| Error::Storage("transaction body did not run".into()))
    }
}

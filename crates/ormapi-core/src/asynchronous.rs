//! Tokio facade over [`ResourceService`].
//!
//! Store round trips are blocking, so each operation runs on the blocking
//! pool with an owned clone of the service.

use crate::error::Error;
use crate::query::ReadExplain;
use crate::service::ResourceService;
use crate::sql::Dialect;
use ormapi_proto::{Entity, MutationPayload, PageResult, Query, RelationshipData};
use tokio::task;

/// Async handle to a [`ResourceService`].
#[derive(Clone)]
pub struct AsyncResourceService {
    inner: ResourceService,
}

impl AsyncResourceService {
    /// Wrap a service.
    pub fn new(inner: ResourceService) -> Self {
        Self { inner }
    }

    /// The wrapped service.
    pub fn inner(&self) -> &ResourceService {
        &self.inner
    }

    async fn run<T, F>(&self, f: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(ResourceService) -> Result<T, Error> + Send + 'static,
    {
        let service = self.inner.clone();
        task::spawn_blocking(move || f(service))
            .await
            .map_err(|e| Error::Storage(format!("blocking task failed: {}", e)))?
    }

    pub async fn get_all(&self, type_name: &str, query: Query) -> Result<PageResult, Error> {
        let type_name = type_name.to_string();
        self.run(move |s| s.get_all(&type_name, &query)).await
    }

    pub async fn get_one(&self, type_name: &str, id: &str, query: Query) -> Result<Entity, Error> {
        let (type_name, id) = (type_name.to_string(), id.to_string());
        self.run(move |s| s.get_one(&type_name, &id, &query)).await
    }

    pub async fn post_one(&self, type_name: &str, payload: MutationPayload) -> Result<Entity, Error> {
        let type_name = type_name.to_string();
        self.run(move |s| s.post_one(&type_name, &payload)).await
    }

    pub async fn patch_one(
        &self,
        type_name: &str,
        id: &str,
        payload: MutationPayload,
    ) -> Result<Entity, Error> {
        let (type_name, id) = (type_name.to_string(), id.to_string());
        self.run(move |s| s.patch_one(&type_name, &id, &payload)).await
    }

    pub async fn delete_one(&self, type_name: &str, id: &str) -> Result<(), Error> {
        let (type_name, id) = (type_name.to_string(), id.to_string());
        self.run(move |s| s.delete_one(&type_name, &id)).await
    }

    pub async fn get_relationship(
        &self,
        type_name: &str,
        id: &str,
        relation: &str,
    ) -> Result<RelationshipData, Error> {
        let (type_name, id, relation) = (type_name.to_string(), id.to_string(), relation.to_string());
        self.run(move |s| s.get_relationship(&type_name, &id, &relation))
            .await
    }

    pub async fn post_relationship(
        &self,
        type_name: &str,
        id: &str,
        relation: &str,
        data: RelationshipData,
    ) -> Result<RelationshipData, Error> {
        let (type_name, id, relation) = (type_name.to_string(), id.to_string(), relation.to_string());
        self.run(move |s| s.post_relationship(&type_name, &id, &relation, &data))
            .await
    }

    pub async fn patch_relationship(
        &self,
        type_name: &str,
        id: &str,
        relation: &str,
        data: RelationshipData,
    ) -> Result<RelationshipData, Error> {
        let (type_name, id, relation) = (type_name.to_string(), id.to_string(), relation.to_string());
        self.run(move |s| s.patch_relationship(&type_name, &id, &relation, &data))
            .await
    }

    pub async fn delete_relationship(
        &self,
        type_name: &str,
        id: &str,
        relation: &str,
        data: RelationshipData,
    ) -> Result<RelationshipData, Error> {
        let (type_name, id, relation) = (type_name.to_string(), id.to_string(), relation.to_string());
        self.run(move |s| s.delete_relationship(&type_name, &id, &relation, &data))
            .await
    }

    /// Explaining never touches the store, so it runs inline.
    pub fn explain(&self, type_name: &str, query: &Query, dialect: Dialect) -> Result<ReadExplain, Error> {
        self.inner.explain(type_name, query, dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityMetadata, PropertyDef, SchemaRegistry, SemanticType};
    use crate::store::SqliteStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_post_then_read() {
        let registry = SchemaRegistry::new([EntityMetadata::new("tags")
            .with_property(PropertyDef::new("label", SemanticType::String))])
        .unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_schema(&registry).unwrap();
        let service =
            AsyncResourceService::new(ResourceService::new(Arc::new(registry), Arc::new(store)));

        let created = service
            .post_one("tags", MutationPayload::new().attribute("label", "rust"))
            .await
            .unwrap();
        let page = service.get_all("tags", Query::new()).await.unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].id, created.id);
    }
}

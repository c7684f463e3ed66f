//! Shared fixtures: a users/roles/comments/addresses schema on in-memory SQLite.

#![allow(dead_code)]

use ormapi_core::catalog::{EntityMetadata, PivotDef, PropertyDef, RelationDef, SemanticType};
use ormapi_core::sql::{CompiledSql, Dialect};
use ormapi_core::store::{ResourceStore, Row, SqliteStore};
use ormapi_core::{Error, ResourceService, SchemaRegistry};
use ormapi_proto::{MutationPayload, RelationshipData};
use parking_lot::Mutex;
use std::sync::Arc;

/// Store wrapper that records every statement it runs.
pub struct CountingStore {
    inner: SqliteStore,
    log: Mutex<Vec<String>>,
}

impl CountingStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Statements run since the last reset.
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn reset(&self) {
        self.log.lock().clear();
    }
}

impl ResourceStore for CountingStore {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn query(&self, statement: &CompiledSql) -> Result<Vec<Row>, Error> {
        self.log.lock().push(statement.sql.clone());
        self.inner.query(statement)
    }

    fn execute(&self, statement: &CompiledSql) -> Result<u64, Error> {
        self.log.lock().push(statement.sql.clone());
        self.inner.execute(statement)
    }

    fn transaction(&self, body: &mut dyn FnMut() -> Result<(), Error>) -> Result<(), Error> {
        self.inner.transaction(body)
    }
}

pub fn registry() -> SchemaRegistry {
    let users = EntityMetadata::new("users")
        .with_property(PropertyDef::new("login", SemanticType::String))
        .with_property(PropertyDef::optional("firstName", SemanticType::String))
        .with_property(PropertyDef::optional("lastName", SemanticType::String))
        .with_property(PropertyDef::optional("isActive", SemanticType::Boolean))
        .with_property(PropertyDef::optional("createdAt", SemanticType::Date))
        .with_property(PropertyDef::optional("tags", SemanticType::Array))
        .with_relation(RelationDef::many_to_many(
            "roles",
            "roles",
            PivotDef::new("users_have_roles", "user_id", "role_id"),
        ))
        .with_relation(RelationDef::one_to_many("comments", "comments", "user_id"))
        .with_relation(RelationDef::one_to_one("addresses", "addresses", "addresses_id"))
        .with_relation(RelationDef::many_to_one("manager", "users", "manager_id"));

    let roles = EntityMetadata::new("roles")
        .with_property(PropertyDef::new("name", SemanticType::String))
        .with_relation(RelationDef::many_to_many(
            "users",
            "users",
            PivotDef::new("users_have_roles", "role_id", "user_id"),
        ));

    let comments = EntityMetadata::new("comments")
        .with_property(PropertyDef::new("text", SemanticType::String))
        .with_property(PropertyDef::optional("kind", SemanticType::String))
        .with_relation(RelationDef::many_to_one("user", "users", "user_id"));

    let addresses = EntityMetadata::new("addresses")
        .with_property(PropertyDef::new("city", SemanticType::String))
        .with_property(PropertyDef::optional("state", SemanticType::String))
        .with_relation(RelationDef::one_to_one_inverse("resident", "users", "addresses_id"));

    SchemaRegistry::new([users, roles, comments, addresses]).expect("fixture schema is valid")
}

pub struct Fixture {
    pub service: ResourceService,
    pub store: Arc<CountingStore>,
}

pub fn fixture() -> Fixture {
    let registry = registry();
    let sqlite = SqliteStore::open_in_memory().expect("in-memory store");
    sqlite.create_schema(&registry).expect("schema created");
    let store = Arc::new(CountingStore::new(sqlite));
    let service = ResourceService::new(Arc::new(registry), store.clone());
    Fixture { service, store }
}

impl Fixture {
    pub fn role(&self, name: &str) -> String {
        let role = self
            .service
            .post_one("roles", &MutationPayload::new().attribute("name", name))
            .expect("role created");
        role.id.to_id_string()
    }

    pub fn user(&self, login: &str, roles: &[&str]) -> String {
        let payload = MutationPayload::new()
            .attribute("login", login)
            .relationship("roles", RelationshipData::many("roles", roles.iter().copied()));
        let user = self.service.post_one("users", &payload).expect("user created");
        user.id.to_id_string()
    }

    pub fn comment(&self, text: &str, user: &str) -> String {
        let payload = MutationPayload::new()
            .attribute("text", text)
            .relationship("user", RelationshipData::one("users", user));
        let comment = self.service.post_one("comments", &payload).expect("comment created");
        comment.id.to_id_string()
    }

    pub fn address(&self, city: &str) -> String {
        let address = self
            .service
            .post_one("addresses", &MutationPayload::new().attribute("city", city))
            .expect("address created");
        address.id.to_id_string()
    }
}

//! ormapi core - schema registry, query compiler and mutation engine.
//!
//! Resources are described once in a [`SchemaRegistry`]. Collection reads are
//! compiled into three statements (count, page of keys, hydration) and run
//! against a [`ResourceStore`]; writes validate attributes and relationship
//! linkage before touching the store.

pub mod catalog;
pub mod config;
pub mod error;
pub mod mutation;
pub mod query;
pub mod service;
pub mod sql;
pub mod store;

#[cfg(feature = "async")]
pub mod asynchronous;

pub use catalog::{
    Cardinality, EntityMetadata, KeyType, PivotDef, PropertyDef, RelationDef, RelationKey,
    SchemaDescription, SchemaRegistry, SemanticType,
};
pub use config::EngineConfig;
pub use error::{Error, Issue};
pub use mutation::{MutationOrchestrator, RelationWriter, RelationshipValidator, ResolvedIds};
pub use query::{ExplainService, QueryAssembler, ReadExplain, ReadPlanner};
pub use service::ResourceService;
pub use sql::{CompiledSql, Dialect};
pub use store::{ResourceStore, Row, SqliteStore, StoreConfig};

#[cfg(feature = "async")]
pub use asynchronous::AsyncResourceService;

/// Re-export protocol types.
pub use ormapi_proto as proto;

//! ormapi protocol types.
//!
//! This crate defines the shapes exchanged between a transport layer and the
//! resource engine: read queries, mutation payloads and hydrated results. All
//! types serialize to and from the natural JSON form with serde.
//!
//! # Modules
//!
//! - [`value`] - Runtime values for literals, attributes and results
//! - [`query`] - Filters, sorting, sparse fieldsets, inclusion and paging
//! - [`mutation`] - Create/update payloads and relationship linkage
//! - [`result`] - Hydrated entities and collection pages
//! - [`error`] - Protocol error types

pub mod error;
pub mod mutation;
pub mod query;
pub mod result;
pub mod value;

pub use error::Error;

pub use mutation::{MutationPayload, RefId, RelationshipBody, RelationshipData};
pub use query::{
    FieldConditions, Fields, FilterTree, Operand, Page, Query, QueryFilter, RelationSort,
    SortDirection, SortField, SortSpec, DEFAULT_PAGE_SIZE,
};
pub use result::{Entity, PageResult, Related};
pub use value::Value;

/// Decode a query from JSON text.
pub fn query_from_json(text: &str) -> Result<Query, Error> {
    Ok(serde_json::from_str(text)?)
}

/// Decode a mutation payload from JSON text.
pub fn payload_from_json(text: &str) -> Result<MutationPayload, Error> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_from_json_reports_sort_errors() {
        let err = query_from_json(r#"{"sort": "roles.users.login"}"#).unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn test_payload_from_json() {
        let payload = payload_from_json(r#"{"attributes": {"login": "ann"}}"#).unwrap();
        assert_eq!(payload.attributes["login"], Value::from("ann"));
        assert!(payload.relationships.is_empty());
    }
}

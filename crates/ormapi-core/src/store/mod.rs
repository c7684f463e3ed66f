//! Relational store interface.
//!
//! The engine only talks to storage through [`ResourceStore`]: it hands over
//! fully rendered statements and receives untyped rows back. Decoding into
//! semantic values happens in the query layer.

mod config;
mod sqlite;

pub use config::{StoreConfig, DEFAULT_BUSY_TIMEOUT_MS};
pub use sqlite::SqliteStore;

use crate::error::Error;
use crate::sql::{CompiledSql, Dialect};
use ormapi_proto::Value;
use std::collections::BTreeMap;

/// One result row keyed by result column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    /// Get a column value; missing columns read as null.
    pub fn get(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(column).unwrap_or(&NULL)
    }

    /// Take a column value out of the row.
    pub fn take(&mut self, column: &str) -> Value {
        self.values.remove(column).unwrap_or(Value::Null)
    }

    /// Column names in this row.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (S, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A relational backend able to run rendered statements.
pub trait ResourceStore: Send + Sync {
    /// Dialect the store expects statements in.
    fn dialect(&self) -> Dialect;

    /// Run a statement that returns rows.
    fn query(&self, statement: &CompiledSql) -> Result<Vec<Row>, Error>;

    /// Run a statement and return the number of affected rows.
    fn execute(&self, statement: &CompiledSql) -> Result<u64, Error>;

    /// Run `body` inside a transaction.
    ///
    /// Commits when `body` succeeds and rolls back when it fails; the error of
    /// `body` is returned unchanged. Nested calls on the same thread become
    /// savepoints. Statements from other callers wait until the outermost
    /// transaction has finished.
    fn transaction(&self, body: &mut dyn FnMut() -> Result<(), Error>) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_access() {
        let mut row: Row = [("users.id", Value::Int(1)), ("users.login", Value::from("ann"))]
            .into_iter()
            .collect();
        assert_eq!(row.get("users.id"), &Value::Int(1));
        assert_eq!(row.get("users.missing"), &Value::Null);
        assert_eq!(row.take("users.login"), Value::from("ann"));
        assert_eq!(row.columns().collect::<Vec<_>>(), ["users.id"]);
    }
}

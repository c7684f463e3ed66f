//! Relational IR, SQL rendering and DDL generation.

pub mod ast;
pub mod ddl;
pub mod render;

pub use ast::{
    AggregateFunc, ColumnRef, CompareOp, Delete, Expr, Insert, Join, OrderItem, Select,
    SelectItem, TableRef, Update,
};
pub use render::{quote, Compile, CompiledSql, Dialect};

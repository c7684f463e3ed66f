//! Query engine: filter and sort compilation, read planning and execution.

mod assembler;
mod explain;
mod filter;
mod join;
mod planner;
mod sort;
mod value_codec;

pub use assembler::QueryAssembler;
pub(crate) use assembler::missing;
pub use explain::{ExplainService, ReadExplain};
pub use filter::FilterCompiler;
pub use join::{correlated_subquery, relation_joins, root_alias, subquery_alias};
pub use planner::{column_alias, HydratedRelation, HydrationPlan, ReadPlan, ReadPlanner};
pub use sort::{CompiledSort, SortCompiler, SortKey};
pub use value_codec::{decode_value, encode_value};

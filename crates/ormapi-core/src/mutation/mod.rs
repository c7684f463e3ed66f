//! Mutations: relationship validation, relation writes and orchestration.

mod orchestrator;
mod relationship;
mod validator;

pub use orchestrator::MutationOrchestrator;
pub use relationship::RelationWriter;
pub use validator::{RelationshipValidator, ResolvedIds};

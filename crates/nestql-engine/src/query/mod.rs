//! Query processing pipeline.
//!
//! - **Compiler**: GraphQL document to a flat plan of actions
//! - **Expander**: action to ordered commands
//! - **Scheduler**: actions to dependency phases
//! - **Executor**: runs phases through the per-command pipeline
//! - **Assembler**: rebuilds the response tree
//! - **Processor**: orchestrates the stages above

pub mod action;
pub mod assembler;
pub mod compiler;
pub mod executor;
pub mod expander;
pub mod processor;
pub mod scheduler;

pub use action::{
    Action, ActionArgs, ActionFamily, ActionId, ActionKind, ActionPlan, ParentBinding,
    RelationLink, SelectionItem,
};
pub use assembler::{Location, Response, ResponseError, assemble};
pub use compiler::{CompiledQuery, compile};
pub use executor::{ActionOutcome, Execution, Executor};
pub use expander::{Command, expand};
pub use processor::{ExecutionResult, ExecutionSummary, QueryProcessor};
pub use scheduler::{DependencyGraph, Group, Phase, Schedule, schedule};

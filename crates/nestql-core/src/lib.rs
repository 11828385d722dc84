//! # nestql-core
//!
//! Core layer for nestql: the request pipeline and the command records that
//! travel through it.
//!
//! This crate depends only on `nestql-common`.
//!
//! ## Modules
//!
//! - [`pipeline`] - Pipeline composer (middleware trait, builder, stage observers)
//! - [`middleware`] - Standard per-command stages, from failure handlers to the database call
//! - [`request`] - Request context, command arguments, command request/response records
//! - [`database`] - Interface implemented by database adapters

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod database;
pub mod middleware;
pub mod pipeline;
pub mod request;

// Re-export commonly used types
pub use database::Database;
pub use middleware::{CommandPipeline, StageSettings, standard_pipeline};
pub use pipeline::{Middleware, Next, Pipeline, PipelineBuilder, StageObserver};
pub use request::{CommandArgs, CommandRequest, CommandResponse, DataRef, RequestContext, SortKey};

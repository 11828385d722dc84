//! # nestql-engine
//!
//! The main entry point for nestql: schema catalog, configuration, and the
//! query pipeline that turns one nested GraphQL request into phased database
//! commands and back into a response tree.
//!
//! ## Modules
//!
//! - [`engine`] - Engine struct: catalog, config and database wiring
//! - [`session`] - Per-request execution and response rendering
//! - [`config`] - Configuration options
//! - [`catalog`] - Models, attributes and relations
//! - [`query`] - Compiler, expander, scheduler, executor, assembler

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod config;
pub mod engine;
pub mod query;
pub mod session;

pub use catalog::{Catalog, CatalogError};
pub use config::{Config, ErrorPolicy};
pub use engine::Engine;
pub use query::{ExecutionResult, ExecutionSummary, Response, ResponseError};
pub use session::{QueryRequest, QuerySource, Session};

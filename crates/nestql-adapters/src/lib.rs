//! # nestql-adapters
//!
//! Adapters layer for nestql: query language parsers and database backends.
//!
//! ## Modules
//!
//! - [`query`] - Query language parsers (GraphQL)
//! - [`storage`] - Database adapters (in-memory)

pub mod query;
pub mod storage;

//! # nestql
//!
//! Nested CRUD queries over schema-defined models, in one round trip.
//!
//! Start with [`Engine`]: give it a [`Catalog`] describing your models and a
//! [`Database`] adapter, open a [`Session`], and execute GraphQL-shaped
//! requests. Each request is compiled into collection-level actions, layered
//! into dependency phases, run through the per-command pipeline, and
//! reassembled into a response tree in the order the client asked for.
//!
//! ## Features
//!
//! | Feature | Provides | Notes |
//! | ------- | -------- | ----- |
//! | `graphql` | GraphQL lexer and parser | enabled by default |
//! | `memory` | [`MemoryDatabase`] adapter | enabled by default |
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use nestql::{Catalog, Engine, MemoryDatabase, Model, QueryRequest, Relation};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let catalog = Catalog::builder()
//!     .model(
//!         Model::new("author", "authors")
//!             .scalar("name")
//!             .relation("books", Relation::many("book").inverse("author_id")),
//!     )
//!     .model(Model::new("book", "books").scalar("title").scalar("author_id"))
//!     .build()?;
//!
//! let engine = Engine::new(catalog, Arc::new(MemoryDatabase::new()));
//! let result = engine
//!     .session()
//!     .execute(QueryRequest::new(
//!         r#"mutation {
//!             create_author(data: {name: "Le Guin", books: [{title: "Earthsea"}]}) {
//!                 name
//!                 books { title }
//!             }
//!         }"#,
//!     ))
//!     .await;
//!
//! assert_eq!(result.summary.phases, 2);
//! assert_eq!(
//!     result.response.data.unwrap()["create_author"]["books"][0]["title"],
//!     "Earthsea"
//! );
//! # Ok::<(), nestql::CatalogError>(())
//! # }).unwrap();
//! ```

// Re-export the main engine API
pub use nestql_engine::catalog::{Attribute, Model, Relation};
pub use nestql_engine::{
    Catalog, CatalogError, Config, Engine, ErrorPolicy, ExecutionResult, ExecutionSummary,
    QueryRequest, QuerySource, Response, ResponseError, Session,
};

// Re-export the extension points: adapters and pipeline stages
pub use nestql_core::{
    CommandArgs, CommandRequest, CommandResponse, Database, Middleware, Next, Pipeline,
    PipelineBuilder, RequestContext, SortKey, StageObserver,
};

// Re-export core types
pub use nestql_common::types::{CommandType, Path, PathSegment, Row, Value};
pub use nestql_common::utils::error::{Error, ErrorKind, Result};

#[cfg(feature = "memory")]
pub use nestql_adapters::storage::MemoryDatabase;

/// Lower-level access to the workspace crates.
pub mod engine {
    pub use nestql_engine::*;
}

/// Query text parsing.
#[cfg(feature = "graphql")]
pub mod graphql {
    pub use nestql_adapters::query::graphql::*;
}

//! # nestql-common
//!
//! Foundation layer for nestql: paths, command types, rows and errors.
//!
//! This crate provides the vocabulary shared by every other nestql crate.
//! It has no internal dependencies and should be kept minimal.
//!
//! ## Modules
//!
//! - [`types`] - Core type definitions (Path, CommandType, Row, Value)
//! - [`utils`] - Utility functions and helpers (errors)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod types;
pub mod utils;

// Re-export commonly used types at crate root
pub use types::{CommandType, Path, PathSegment, Row, Value};
pub use utils::error::{Error, ErrorKind, Result};

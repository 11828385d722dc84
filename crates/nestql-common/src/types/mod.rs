//! Core type definitions for nestql.
//!
//! This module contains the fundamental types used throughout the query pipeline:
//! - Addressing ([`Path`], [`PathSegment`])
//! - Command vocabulary ([`CommandType`])
//! - Document types ([`Row`], [`Value`])

mod command;
mod path;
mod row;

pub use command::CommandType;
pub use path::{Path, PathSegment};
pub use row::{ID_ATTR, Row, Value, row_id, value_key};

//! Query language parsers.
//!
//! Each parser turns query text into an AST the engine compiles into actions.
//!
//! | Module | Language | Standard | Feature |
//! | ------ | -------- | -------- | ------- |
//! | [`graphql`] | GraphQL | October 2021 edition, executable documents | `graphql` (default) |

#[cfg(feature = "graphql")]
pub mod graphql;

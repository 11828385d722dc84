//! GraphQL executable documents.
//!
//! Only what clients send is supported: operations, fragments, variables and
//! directives. Type system definitions are the schema collaborator's job.

pub mod ast;
mod lexer;
mod parser;

pub use ast::Document;
pub use parser::Parser;

use nestql_common::utils::error::Result;

/// Parses a GraphQL document.
///
/// # Errors
///
/// Returns a syntax error located in the query text.
pub fn parse(query: &str) -> Result<Document> {
    let mut parser = Parser::new(query);
    parser.parse()
}

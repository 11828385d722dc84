//! Interface to database adapters.

use async_trait::async_trait;
use nestql_common::types::Row;
use nestql_common::utils::error::Result;

use crate::request::CommandRequest;

/// A database adapter: the collaborator behind the terminal pipeline stage.
///
/// Adapters receive fully resolved commands. Compensation or rollback of
/// writes that were already applied is the adapter's responsibility.
#[async_trait]
pub trait Database: Send + Sync {
    /// Adapter name, used in logs and downstream errors.
    fn name(&self) -> &'static str;

    /// Executes one command and returns the rows it read or affected.
    ///
    /// - `create` returns the created rows, in payload order.
    /// - `read` returns the matching rows, sorted and paginated.
    /// - `update` returns the rows after the change.
    /// - `delete` returns the removed rows.
    async fn execute(&self, request: &CommandRequest) -> Result<Vec<Row>>;
}

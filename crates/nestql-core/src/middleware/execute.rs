//! Terminal stage: the database call.

use async_trait::async_trait;
use nestql_common::utils::error::Result;
use std::sync::Arc;
use std::time::Instant;

use crate::database::Database;
use crate::pipeline::{Middleware, Next};
use crate::request::{CommandRequest, CommandResponse};

/// Hands the resolved command to the database adapter. Never calls `next`.
pub struct DatabaseExecute {
    database: Arc<dyn Database>,
}

impl DatabaseExecute {
    /// Creates the stage around an adapter.
    #[must_use]
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl Middleware<CommandRequest, CommandResponse> for DatabaseExecute {
    fn name(&self) -> &'static str {
        "database_execute"
    }

    async fn handle(
        &self,
        input: CommandRequest,
        _next: Next<'_, CommandRequest, CommandResponse>,
    ) -> Result<CommandResponse> {
        let started = Instant::now();
        let rows = self.database.execute(&input).await?;
        tracing::debug!(
            request_id = %input.context.request_id,
            adapter = self.database.name(),
            path = %input.path,
            model = %input.model,
            command = %input.command,
            rows = rows.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "database command executed"
        );
        Ok(CommandResponse::rows(rows))
    }
}

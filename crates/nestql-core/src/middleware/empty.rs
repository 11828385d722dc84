//! Short-circuit for commands that cannot match any row.

use async_trait::async_trait;
use nestql_common::types::{CommandType, Value};
use nestql_common::utils::error::Result;

use crate::pipeline::{Middleware, Next};
use crate::request::{CommandRequest, CommandResponse};

/// Returns an empty response without calling the database when the filter
/// requires membership in an empty list.
///
/// This is the common case for nested reads under a parent that returned no
/// rows: the synthesized `id` filter is `[]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyCommand;

fn is_empty_command(request: &CommandRequest) -> bool {
    if request.command == CommandType::Create {
        return false;
    }
    // Substitutions carry their targets in `data`, not in the filter.
    if request.args.current_data.is_some() {
        return false;
    }
    request.args.filter.as_ref().is_some_and(|filter| {
        filter
            .values()
            .any(|value| matches!(value, Value::Array(values) if values.is_empty()))
    })
}

#[async_trait]
impl Middleware<CommandRequest, CommandResponse> for EmptyCommand {
    fn name(&self) -> &'static str {
        "empty_command"
    }

    async fn handle(
        &self,
        input: CommandRequest,
        next: Next<'_, CommandRequest, CommandResponse>,
    ) -> Result<CommandResponse> {
        if is_empty_command(&input) {
            tracing::debug!(
                request_id = %input.context.request_id,
                path = %input.path,
                model = %input.model,
                "command short-circuited on empty filter"
            );
            return Ok(CommandResponse::empty());
        }
        next.run(input).await
    }
}

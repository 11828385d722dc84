//! System-defined argument defaults.

use async_trait::async_trait;
use nestql_common::types::{CommandType, ID_ATTR};
use nestql_common::utils::error::Result;

use super::StageSettings;
use crate::pipeline::{Middleware, Next};
use crate::request::{CommandRequest, CommandResponse, SortKey};

/// Applies defaults the client did not specify: reads are sorted by `id`
/// ascending, and paginated reads get the configured page size.
#[derive(Debug, Clone, Copy)]
pub struct SystemDefaults {
    default_page_size: u64,
}

impl SystemDefaults {
    /// Creates the stage.
    #[must_use]
    pub fn new(settings: StageSettings) -> Self {
        Self {
            default_page_size: settings.default_page_size,
        }
    }
}

#[async_trait]
impl Middleware<CommandRequest, CommandResponse> for SystemDefaults {
    fn name(&self) -> &'static str {
        "system_defaults"
    }

    async fn handle(
        &self,
        mut input: CommandRequest,
        next: Next<'_, CommandRequest, CommandResponse>,
    ) -> Result<CommandResponse> {
        if input.command == CommandType::Read {
            let args = &mut input.args;
            if args.order_by.is_empty() {
                args.order_by.push(SortKey::asc(ID_ATTR));
            }
            if args.paginate && args.page_size.is_none() {
                args.page_size = Some(self.default_page_size);
            }
        }
        next.run(input).await
    }
}

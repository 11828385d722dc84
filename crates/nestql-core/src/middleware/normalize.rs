//! Removes empty values from write payloads.

use async_trait::async_trait;
use nestql_common::types::{CommandType, Row};
use nestql_common::utils::error::Result;

use crate::pipeline::{Middleware, Next};
use crate::request::{CommandRequest, CommandResponse};

/// Drops `null` attributes from created and substituted rows, so that an
/// absent attribute and a `null` one are stored the same way.
///
/// Patches keep their `null`s: there they mean "unset this attribute".
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizeEmpty;

fn strip_nulls(row: &mut Row) {
    row.retain(|_, value| !value.is_null());
}

#[async_trait]
impl Middleware<CommandRequest, CommandResponse> for NormalizeEmpty {
    fn name(&self) -> &'static str {
        "normalize_empty"
    }

    async fn handle(
        &self,
        mut input: CommandRequest,
        next: Next<'_, CommandRequest, CommandResponse>,
    ) -> Result<CommandResponse> {
        let is_patch = input.command == CommandType::Update && input.args.current_data.is_none();
        if input.command.is_write() && !is_patch {
            input.args.data.iter_mut().for_each(strip_nulls);
        }
        next.run(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::testing::{request, row};
    use crate::pipeline::Pipeline;
    use crate::request::CommandArgs;
    use nestql_common::utils::error::Error;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Middleware<CommandRequest, CommandResponse> for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn handle(
            &self,
            input: CommandRequest,
            _next: Next<'_, CommandRequest, CommandResponse>,
        ) -> std::result::Result<CommandResponse, Error> {
            Ok(CommandResponse::rows(input.args.data))
        }
    }

    #[tokio::test]
    async fn test_create_payload_is_stripped() {
        let pipeline = Pipeline::builder().stage(NormalizeEmpty).stage(Echo).build();
        let args = CommandArgs {
            data: vec![row(json!({"id": 1, "title": null, "body": "b"}))],
            ..CommandArgs::default()
        };
        let response = pipeline.call(request(CommandType::Create, args)).await.unwrap();
        assert_eq!(response.data, vec![row(json!({"id": 1, "body": "b"}))]);
    }

    #[tokio::test]
    async fn test_patch_keeps_nulls() {
        let pipeline = Pipeline::builder().stage(NormalizeEmpty).stage(Echo).build();
        let args = CommandArgs {
            data: vec![row(json!({"title": null}))],
            ..CommandArgs::default()
        };
        let response = pipeline.call(request(CommandType::Update, args)).await.unwrap();
        assert_eq!(response.data, vec![row(json!({"title": null}))]);
    }
}

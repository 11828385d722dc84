//! Failure handling stages.
//!
//! The pair is nested: [`FailureHandler`] runs first and guards
//! [`ErrorHandler`], which turns every downstream error into a
//! [`CommandResponse`] carrying it. Whatever escapes the inner handler
//! (a panic in any stage, including the handler itself) is caught by the
//! outer one.

use async_trait::async_trait;
use futures::FutureExt;
use nestql_common::utils::error::{Error, Result};
use std::any::Any;
use std::panic::AssertUnwindSafe;

use crate::pipeline::{Middleware, Next};
use crate::request::{CommandRequest, CommandResponse};

/// Outer guard around the error handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailureHandler;

#[async_trait]
impl Middleware<CommandRequest, CommandResponse> for FailureHandler {
    fn name(&self) -> &'static str {
        "failure_handler"
    }

    async fn handle(
        &self,
        input: CommandRequest,
        next: Next<'_, CommandRequest, CommandResponse>,
    ) -> Result<CommandResponse> {
        let request_id = input.context.request_id.clone();
        let path = input.path.to_string();

        match AssertUnwindSafe(next.run(input)).catch_unwind().await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => {
                tracing::error!(%request_id, %path, %error, "error handler failed");
                Ok(CommandResponse::failed(error))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(%request_id, %path, %message, "pipeline stage panicked");
                Ok(CommandResponse::failed(Error::Internal(message)))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "pipeline stage panicked".to_string()
    }
}

/// Finalizes downstream failures into the response.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorHandler;

#[async_trait]
impl Middleware<CommandRequest, CommandResponse> for ErrorHandler {
    fn name(&self) -> &'static str {
        "error_handler"
    }

    async fn handle(
        &self,
        input: CommandRequest,
        next: Next<'_, CommandRequest, CommandResponse>,
    ) -> Result<CommandResponse> {
        let request_id = input.context.request_id.clone();
        let model = input.model.clone();
        let command = input.command;
        let path = input.path.to_string();

        match next.run(input).await {
            Ok(response) => Ok(response),
            Err(error) => {
                if error.kind().is_client_error() {
                    tracing::debug!(%request_id, %path, %model, %command, %error, "command rejected");
                } else {
                    tracing::warn!(%request_id, %path, %model, %command, %error, "command failed");
                }
                Ok(CommandResponse::failed(error))
            }
        }
    }
}

/// Refuses to start a command once the request deadline has passed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadlineCheck;

#[async_trait]
impl Middleware<CommandRequest, CommandResponse> for DeadlineCheck {
    fn name(&self) -> &'static str {
        "deadline_check"
    }

    async fn handle(
        &self,
        input: CommandRequest,
        next: Next<'_, CommandRequest, CommandResponse>,
    ) -> Result<CommandResponse> {
        if input.context.is_expired() {
            return Err(Error::Timeout(format!(
                "before {} on {}",
                input.command, input.model
            )));
        }
        next.run(input).await
    }
}

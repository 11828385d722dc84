//! Session management.

use std::sync::Arc;
use std::time::Instant;

use nestql_adapters::query::graphql::{self, ast::Document};
use nestql_common::types::Row;
use nestql_common::utils::error::Result;
use nestql_core::request::RequestContext;
use tracing::Instrument;

use crate::config::Config;
use crate::query::{ExecutionResult, ExecutionSummary, QueryProcessor, Response};

/// Query text or an already parsed document.
#[derive(Debug, Clone)]
pub enum QuerySource {
    /// GraphQL text, parsed per request.
    Text(String),
    /// Parsed document.
    Document(Arc<Document>),
}

/// One client request.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// The query.
    pub source: QuerySource,
    /// Variable values.
    pub variables: Row,
    /// Operation to run when the document holds several.
    pub operation_name: Option<String>,
    /// Request context; a fresh one is created when absent.
    pub context: Option<RequestContext>,
}

impl QueryRequest {
    /// Creates a request from query text.
    pub fn new(query: impl Into<String>) -> Self {
        Self::from_source(QuerySource::Text(query.into()))
    }

    /// Creates a request from a parsed document.
    pub fn document(document: impl Into<Arc<Document>>) -> Self {
        Self::from_source(QuerySource::Document(document.into()))
    }

    fn from_source(source: QuerySource) -> Self {
        Self {
            source,
            variables: Row::new(),
            operation_name: None,
            context: None,
        }
    }

    /// Sets the variable values.
    #[must_use]
    pub fn with_variables(mut self, variables: Row) -> Self {
        self.variables = variables;
        self
    }

    /// Selects an operation by name.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Uses a caller-built context.
    #[must_use]
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// A handle for running requests against an engine.
///
/// Sessions are cheap to create and hold no per-request state.
#[derive(Clone)]
pub struct Session {
    processor: QueryProcessor,
    config: Config,
}

impl Session {
    pub(crate) fn new(processor: QueryProcessor, config: Config) -> Self {
        Self { processor, config }
    }

    /// Executes a request.
    ///
    /// Failures are rendered into the response rather than returned.
    pub async fn execute(&self, request: QueryRequest) -> ExecutionResult {
        let started = Instant::now();
        let context = Arc::new(self.prepare_context(request.context.clone()));
        let span = tracing::info_span!(
            "request",
            request_id = %context.request_id,
            operation = tracing::field::Empty,
        );

        async {
            match self.run(&request, &context).await {
                Ok(mut result) => {
                    result.summary.elapsed = started.elapsed();
                    tracing::Span::current().record("operation", result.summary.operation.as_str());
                    tracing::debug!(
                        commands = result.summary.commands,
                        phases = result.summary.phases,
                        rows = result.summary.rows,
                        elapsed_us = result.summary.elapsed.as_micros() as u64,
                        "request completed"
                    );
                    result
                }
                Err(error) => {
                    if error.kind().is_client_error() {
                        tracing::debug!(%error, "request rejected");
                    } else {
                        tracing::warn!(%error, "request failed");
                    }
                    ExecutionResult {
                        response: Response::failed(&error),
                        summary: ExecutionSummary {
                            elapsed: started.elapsed(),
                            ..ExecutionSummary::default()
                        },
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Executes a request and returns failures as errors.
    ///
    /// # Errors
    ///
    /// Returns parse, compile, scheduling and deadline errors, and action
    /// failures under the request error policy.
    pub async fn try_execute(&self, request: QueryRequest) -> Result<ExecutionResult> {
        let context = Arc::new(self.prepare_context(request.context.clone()));
        self.run(&request, &context).await
    }

    /// Configuration the session runs with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying processor.
    #[must_use]
    pub fn processor(&self) -> &QueryProcessor {
        &self.processor
    }

    async fn run(
        &self,
        request: &QueryRequest,
        context: &Arc<RequestContext>,
    ) -> Result<ExecutionResult> {
        let parsed;
        let document = match &request.source {
            QuerySource::Text(text) => {
                parsed = graphql::parse(text)?;
                &parsed
            }
            QuerySource::Document(document) => document.as_ref(),
        };
        self.processor
            .process(
                document,
                &request.variables,
                request.operation_name.as_deref(),
                context,
            )
            .await
    }

    fn prepare_context(&self, context: Option<RequestContext>) -> RequestContext {
        let context = context.unwrap_or_default();
        match (context.deadline, self.config.request_timeout()) {
            (None, Some(timeout)) => context.with_timeout(timeout),
            _ => context,
        }
    }
}

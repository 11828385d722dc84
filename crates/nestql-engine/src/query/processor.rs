//! Orchestration: compile, schedule, execute, assemble.

use std::sync::Arc;
use std::time::Duration;

use nestql_adapters::query::graphql::ast::Document;
use nestql_common::types::Row;
use nestql_common::utils::error::Result;
use nestql_core::request::RequestContext;

use super::assembler::{Response, assemble};
use super::compiler::{CompiledQuery, compile};
use super::executor::Executor;
use super::scheduler::DependencyGraph;
use crate::catalog::Catalog;
use crate::config::ErrorPolicy;

/// Counters describing one processed request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Compact action tree, e.g. `create_authors{books}`.
    pub operation: String,
    /// Actions compiled.
    pub actions: usize,
    /// Commands dispatched to the pipeline.
    pub commands: usize,
    /// Phases run.
    pub phases: usize,
    /// Rows returned by successful actions, internal ones included.
    pub rows: usize,
    /// Wall-clock time spent on the request.
    pub elapsed: Duration,
}

/// Response plus summary.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Client-facing response.
    pub response: Response,
    /// Request counters.
    pub summary: ExecutionSummary,
}

/// Runs compiled plans end to end.
#[derive(Clone)]
pub struct QueryProcessor {
    catalog: Arc<Catalog>,
    executor: Executor,
    policy: ErrorPolicy,
}

impl QueryProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, executor: Executor, policy: ErrorPolicy) -> Self {
        Self {
            catalog,
            executor,
            policy,
        }
    }

    /// Compiles the selected operation of a document.
    ///
    /// # Errors
    ///
    /// Returns schema and input errors found while compiling.
    pub fn compile(
        &self,
        document: &Document,
        variables: &Row,
        operation_name: Option<&str>,
    ) -> Result<CompiledQuery> {
        compile(document, &self.catalog, variables, operation_name)
    }

    /// Compiles and runs a document.
    ///
    /// # Errors
    ///
    /// Returns compile, scheduling and deadline errors, and action failures
    /// under [`ErrorPolicy::Request`].
    pub async fn process(
        &self,
        document: &Document,
        variables: &Row,
        operation_name: Option<&str>,
        context: &Arc<RequestContext>,
    ) -> Result<ExecutionResult> {
        let compiled = self.compile(document, variables, operation_name)?;
        let graph = DependencyGraph::from_plan(&compiled.plan)?;
        self.run(&compiled, &graph, context).await
    }

    /// Runs a compiled plan under a given dependency graph.
    ///
    /// # Errors
    ///
    /// Same as [`QueryProcessor::process`], minus compile errors.
    pub async fn run(
        &self,
        compiled: &CompiledQuery,
        graph: &DependencyGraph,
        context: &Arc<RequestContext>,
    ) -> Result<ExecutionResult> {
        let started = std::time::Instant::now();
        let operation = compiled.summary();
        let schedule = graph.schedule(&compiled.plan)?;
        tracing::debug!(
            request_id = %context.request_id,
            %operation,
            actions = compiled.plan.len(),
            phases = schedule.len(),
            "plan scheduled"
        );

        let execution = self
            .executor
            .execute(&compiled.plan, &schedule, context)
            .await?;
        let response = assemble(&compiled.plan, &execution, self.policy)?;

        Ok(ExecutionResult {
            response,
            summary: ExecutionSummary {
                operation,
                actions: compiled.plan.len(),
                commands: execution.commands,
                phases: execution.phases,
                rows: execution.row_count(),
                elapsed: started.elapsed(),
            },
        })
    }
}

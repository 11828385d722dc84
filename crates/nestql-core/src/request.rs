//! Records exchanged between the executor, the pipeline stages and the
//! database adapter.

use nestql_common::types::{CommandType, Path, Row, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Request-scoped state shared by every command of one client request.
///
/// Nothing here is process-wide: the context is created per request by the
/// protocol layer and dropped with it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier, used for tracing.
    pub request_id: String,
    /// Point in time after which no further work may start.
    pub deadline: Option<Instant>,
    /// Request-level settings forwarded to the database adapter.
    pub settings: Row,
}

impl RequestContext {
    /// Creates a context with a fresh UUID v4 request id and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            deadline: None,
            settings: Row::new(),
        }
    }

    /// Uses a caller-supplied request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Adds a request-level setting.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Time left before the deadline, `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// One sort key of `order_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Attribute to sort on.
    pub attribute: String,
    /// Sort descending instead of ascending.
    pub descending: bool,
}

impl SortKey {
    /// Ascending sort on `attribute`.
    pub fn asc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            descending: false,
        }
    }

    /// Descending sort on `attribute`.
    pub fn desc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            descending: true,
        }
    }
}

/// Source of rows a command consumes from an earlier command.
#[derive(Debug, Clone, PartialEq)]
pub enum DataRef {
    /// Result of the command at this position in the owning action's list.
    /// Only valid before dispatch.
    Command(usize),
    /// Resolved rows.
    Rows(Vec<Row>),
}

/// Resolved arguments of one command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs {
    /// Equality filter; an array value means membership.
    pub filter: Option<Row>,
    /// Create payload, patch (single row) or substitution rows.
    pub data: Vec<Row>,
    /// Current state of the rows being substituted (replace).
    pub current_data: Option<DataRef>,
    /// Sort keys.
    pub order_by: Vec<SortKey>,
    /// Whether output pagination applies to this command.
    pub paginate: bool,
    /// Requested 1-based page.
    pub page: Option<u64>,
    /// Requested page size.
    pub page_size: Option<u64>,
    /// Rows to skip, computed from `page`.
    pub offset: Option<usize>,
    /// Maximum rows to return, computed from `page_size`.
    pub limit: Option<usize>,
}

impl CommandArgs {
    /// Arguments with only a filter.
    #[must_use]
    pub fn with_filter(filter: Row) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    /// Rows of a resolved `current_data`, empty when absent.
    #[must_use]
    pub fn current_rows(&self) -> &[Row] {
        match &self.current_data {
            Some(DataRef::Rows(rows)) => rows,
            _ => &[],
        }
    }
}

/// Resolved intent of one command, the input of the per-command pipeline.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Target model.
    pub model: String,
    /// Operation to perform.
    pub command: CommandType,
    /// Resolved arguments.
    pub args: CommandArgs,
    /// Path of the owning action.
    pub path: Path,
    /// Whether the command only serves bookkeeping.
    pub internal: bool,
    /// Request-scoped context.
    pub context: Arc<RequestContext>,
}

impl CommandRequest {
    /// Creates a request.
    pub fn new(
        model: impl Into<String>,
        command: CommandType,
        args: CommandArgs,
        context: Arc<RequestContext>,
    ) -> Self {
        Self {
            model: model.into(),
            command,
            args,
            path: Path::root(),
            internal: false,
            context,
        }
    }

    /// Sets the owning action's path.
    #[must_use]
    pub fn at(mut self, path: Path) -> Self {
        self.path = path;
        self
    }

    /// Marks the command as bookkeeping-only.
    #[must_use]
    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }
}

/// Output of the per-command pipeline.
#[derive(Debug, Clone, Default)]
pub struct CommandResponse {
    /// Rows returned or affected.
    pub data: Vec<Row>,
    /// Failures finalized by the error handlers.
    pub errors: Vec<nestql_common::Error>,
}

impl CommandResponse {
    /// A successful response.
    #[must_use]
    pub fn rows(data: Vec<Row>) -> Self {
        Self {
            data,
            errors: Vec::new(),
        }
    }

    /// A successful response with no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A failed response.
    #[must_use]
    pub fn failed(error: nestql_common::Error) -> Self {
        Self {
            data: Vec::new(),
            errors: vec![error],
        }
    }

    /// Converts back into a `Result`, keeping the first error.
    pub fn into_result(self) -> nestql_common::Result<Vec<Row>> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

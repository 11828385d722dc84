//! Error types shared across the query pipeline.
//!
//! Every failure the engine can report maps onto one [`ErrorKind`]. The kind
//! decides where the failure is allowed to surface: user input errors are
//! rendered to clients verbatim, scheduling invariants never are.

use std::fmt;
use thiserror::Error;

/// Result type alias used throughout nestql.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Query text could not be parsed.
    Syntax,
    /// The query references an unknown model or field.
    SchemaMismatch,
    /// Arguments reaching a command are malformed.
    InputValidation,
    /// Dependency cycle or ordering contradiction inside the planner.
    SchedulingInvariant,
    /// A pipeline stage or database adapter failed.
    DownstreamFailure,
    /// The request deadline was exceeded.
    Timeout,
    /// Any other internal failure.
    Internal,
}

impl ErrorKind {
    /// Stable identifier rendered in responses and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "SYNTAX_VALIDATION",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::InputValidation => "INPUT_VALIDATION",
            Self::SchedulingInvariant => "SCHEDULING_INVARIANT",
            Self::DownstreamFailure => "DOWNSTREAM_FAILURE",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "SERVER_ERROR",
        }
    }

    /// Returns `true` when the client caused the failure.
    #[must_use]
    pub const fn is_client_error(self) -> bool {
        matches!(
            self,
            Self::Syntax | Self::SchemaMismatch | Self::InputValidation
        )
    }

    /// Returns `true` when the message may be shown to clients unchanged.
    #[must_use]
    pub const fn is_exposable(self) -> bool {
        !matches!(self, Self::SchedulingInvariant | Self::Internal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Query parsing error.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Unknown model, operation or attribute.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Malformed arguments.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// The planner produced an inconsistent schedule.
    #[error("scheduling invariant violated: {0}")]
    SchedulingInvariant(String),

    /// A stage or adapter below the planner failed.
    #[error("{stage} failed: {message}")]
    Downstream {
        /// Stage or adapter that failed.
        stage: String,
        /// Failure description.
        message: String,
        /// Whether the adapter considers a retry worthwhile.
        retryable: bool,
    },

    /// The request deadline was exceeded.
    #[error("request deadline exceeded {0}")]
    Timeout(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a non-retryable downstream failure.
    pub fn downstream(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Downstream {
            stage: stage.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns the taxonomy entry of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Query(_) => ErrorKind::Syntax,
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::InputValidation(_) => ErrorKind::InputValidation,
            Self::SchedulingInvariant(_) => ErrorKind::SchedulingInvariant,
            Self::Downstream { .. } => ErrorKind::DownstreamFailure,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` if the failing adapter flagged the error as retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Downstream { retryable: true, .. })
    }

    /// Message safe to send to a client.
    ///
    /// Internal and scheduling failures collapse to a generic message; the
    /// detailed text stays in the server logs.
    #[must_use]
    pub fn client_message(&self) -> String {
        if self.kind().is_exposable() {
            self.to_string()
        } else {
            "An internal server error occurred".to_string()
        }
    }
}

/// Kind of a query text error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Invalid token.
    Lexer,
    /// Invalid grammar.
    Syntax,
}

/// A location in query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl SourceSpan {
    /// Creates a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// An error located in query text.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    /// Error kind.
    pub kind: QueryErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Where the error occurred.
    pub span: Option<SourceSpan>,
    /// The query text, for rendering context.
    pub source: Option<String>,
}

impl QueryError {
    /// Creates a new query error.
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            source: None,
        }
    }

    /// Attaches a span.
    #[must_use]
    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Attaches the query text.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            QueryErrorKind::Lexer => "lexer error",
            QueryErrorKind::Syntax => "syntax error",
        };
        write!(f, "{kind}: {}", self.message)?;
        if let Some(span) = self.span {
            write!(f, " at line {}, column {}", span.line, span.column)?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryError {}

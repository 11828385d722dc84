//! Standard per-command stages.
//!
//! Every command the executor dispatches runs through the same chain:
//!
//! | Stage | Role |
//! | ----- | ---- |
//! | [`FailureHandler`] | outer guard: catches panics and failures of the error handler |
//! | [`ErrorHandler`] | finalizes downstream failures into the response |
//! | [`DeadlineCheck`] | refuses to start once the request deadline passed |
//! | [`ValidateArgs`] | command-level argument checks |
//! | [`NormalizeEmpty`] | drops null attributes from write payloads |
//! | [`SystemDefaults`] | default sort order and page size |
//! | [`Pagination`] | turns `page`/`page_size` into offset/limit |
//! | [`EmptyCommand`] | short-circuits commands that cannot match anything |
//! | [`DatabaseExecute`] | calls the database adapter |

mod defaults;
mod empty;
mod execute;
mod failure;
mod normalize;
mod pagination;
mod validate;

pub use defaults::SystemDefaults;
pub use empty::EmptyCommand;
pub use execute::DatabaseExecute;
pub use failure::{DeadlineCheck, ErrorHandler, FailureHandler};
pub use normalize::NormalizeEmpty;
pub use pagination::Pagination;
pub use validate::ValidateArgs;

use std::sync::Arc;

use crate::database::Database;
use crate::pipeline::{Pipeline, StageObserver};
use crate::request::{CommandRequest, CommandResponse};

/// The per-command pipeline type.
pub type CommandPipeline = Pipeline<CommandRequest, CommandResponse>;

/// Limits the standard stages enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSettings {
    /// Largest accepted `page_size`.
    pub max_page_size: u64,
    /// `page_size` applied when a paginated read does not specify one.
    pub default_page_size: u64,
    /// Largest accepted serialized write payload, in bytes.
    pub max_data_length: usize,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            max_page_size: 100,
            default_page_size: 100,
            max_data_length: 1_000_000,
        }
    }
}

/// Builds the standard per-command pipeline around a database adapter.
#[must_use]
pub fn standard_pipeline(settings: StageSettings, database: Arc<dyn Database>) -> CommandPipeline {
    standard_pipeline_observed(settings, database, Vec::new())
}

/// Same as [`standard_pipeline`], with extra stage observers.
#[must_use]
pub fn standard_pipeline_observed(
    settings: StageSettings,
    database: Arc<dyn Database>,
    observers: Vec<Arc<dyn StageObserver>>,
) -> CommandPipeline {
    let mut builder = Pipeline::builder()
        .before(FailureHandler)
        .before(ErrorHandler)
        .stage(DeadlineCheck)
        .stage(ValidateArgs::new(settings))
        .stage(NormalizeEmpty)
        .stage(SystemDefaults::new(settings))
        .stage(Pagination::new(settings))
        .stage(EmptyCommand)
        .after(DatabaseExecute::new(database));
    for observer in observers {
        builder = builder.observe(observer);
    }
    builder.build()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers shared by the stage tests.

    use async_trait::async_trait;
    use nestql_common::types::{CommandType, Row};
    use nestql_common::utils::error::Result;
    use parking_lot::Mutex;
    use std::sync::Arc;

    use crate::database::Database;
    use crate::request::{CommandArgs, CommandRequest, RequestContext};

    /// Records every request and answers with canned rows.
    #[derive(Default)]
    pub struct RecordingDatabase {
        pub requests: Mutex<Vec<CommandRequest>>,
        pub rows: Vec<Row>,
    }

    #[async_trait]
    impl Database for RecordingDatabase {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn execute(&self, request: &CommandRequest) -> Result<Vec<Row>> {
            self.requests.lock().push(request.clone());
            Ok(self.rows.clone())
        }
    }

    pub fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    pub fn request(command: CommandType, args: CommandArgs) -> CommandRequest {
        CommandRequest::new("post", command, args, Arc::new(RequestContext::new()))
    }
}

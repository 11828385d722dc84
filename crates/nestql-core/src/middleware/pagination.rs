//! Offset pagination of read output.

use async_trait::async_trait;
use nestql_common::types::CommandType;
use nestql_common::utils::error::{Error, Result};

use super::StageSettings;
use crate::pipeline::{Middleware, Next};
use crate::request::{CommandRequest, CommandResponse};

/// Validates `page`/`page_size` and converts them into `offset`/`limit`.
///
/// Only reads flagged `paginate` are paginated. Nested and bookkeeping reads
/// must see every matching row, so they pass through untouched.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    max_page_size: u64,
}

impl Pagination {
    /// Creates the stage.
    #[must_use]
    pub fn new(settings: StageSettings) -> Self {
        Self {
            max_page_size: settings.max_page_size,
        }
    }
}

#[async_trait]
impl Middleware<CommandRequest, CommandResponse> for Pagination {
    fn name(&self) -> &'static str {
        "pagination"
    }

    async fn handle(
        &self,
        mut input: CommandRequest,
        next: Next<'_, CommandRequest, CommandResponse>,
    ) -> Result<CommandResponse> {
        if input.command != CommandType::Read || !input.args.paginate {
            return next.run(input).await;
        }

        let args = &mut input.args;
        let page = args.page.unwrap_or(1);
        if page < 1 {
            return Err(Error::InputValidation(
                "'page' must be greater than or equal to 1".to_string(),
            ));
        }
        if let Some(page_size) = args.page_size {
            if page_size < 1 || page_size > self.max_page_size {
                return Err(Error::InputValidation(format!(
                    "'page_size' must be between 1 and {}",
                    self.max_page_size
                )));
            }
            let offset = (page - 1)
                .checked_mul(page_size)
                .and_then(|offset| usize::try_from(offset).ok())
                .ok_or_else(|| {
                    Error::InputValidation(format!("'page' {page} is out of range"))
                })?;
            args.limit = Some(page_size as usize);
            args.offset = Some(offset);
        }

        next.run(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::testing::{RecordingDatabase, request};
    use crate::middleware::DatabaseExecute;
    use crate::pipeline::Pipeline;
    use crate::request::CommandArgs;
    use std::sync::Arc;

    fn pipeline(db: Arc<RecordingDatabase>) -> Pipeline<CommandRequest, CommandResponse> {
        Pipeline::builder()
            .stage(Pagination::new(StageSettings {
                max_page_size: 50,
                ..StageSettings::default()
            }))
            .after(DatabaseExecute::new(db))
            .build()
    }

    #[tokio::test]
    async fn test_page_to_offset() {
        let db = Arc::new(RecordingDatabase::default());
        let args = CommandArgs {
            paginate: true,
            page: Some(3),
            page_size: Some(20),
            ..CommandArgs::default()
        };
        pipeline(db.clone())
            .call(request(CommandType::Read, args))
            .await
            .unwrap();

        let seen = db.requests.lock();
        assert_eq!(seen[0].args.offset, Some(40));
        assert_eq!(seen[0].args.limit, Some(20));
    }

    #[tokio::test]
    async fn test_bounds() {
        let db = Arc::new(RecordingDatabase::default());
        for (page, page_size) in [(0, 10), (1, 0), (1, 51)] {
            let args = CommandArgs {
                paginate: true,
                page: Some(page),
                page_size: Some(page_size),
                ..CommandArgs::default()
            };
            let err = pipeline(db.clone())
                .call(request(CommandType::Read, args))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InputValidation(_)));
        }
        assert!(db.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_huge_page_is_rejected() {
        let db = Arc::new(RecordingDatabase::default());
        let args = CommandArgs {
            paginate: true,
            page: Some(i64::MAX as u64),
            page_size: Some(50),
            ..CommandArgs::default()
        };
        let err = pipeline(db.clone())
            .call(request(CommandType::Read, args))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InputValidation(_)));
        assert!(db.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unpaginated_reads_pass_through() {
        let db = Arc::new(RecordingDatabase::default());
        let args = CommandArgs {
            page_size: Some(1000),
            ..CommandArgs::default()
        };
        pipeline(db.clone())
            .call(request(CommandType::Read, args))
            .await
            .unwrap();
        assert_eq!(db.requests.lock()[0].args.limit, None);
    }
}

//! Command-level argument validation.
//!
//! Argument shapes are validated against the public contract before the
//! compiler sees them. This stage only checks what the compiler and expander
//! cannot guarantee on their own: payload presence per command, identifier
//! rules, payload size, and that sibling results were threaded in.

use async_trait::async_trait;
use hashbrown::HashSet;
use nestql_common::types::{CommandType, ID_ATTR, Row, row_id, value_key};
use nestql_common::utils::error::{Error, Result};

use super::StageSettings;
use crate::pipeline::{Middleware, Next};
use crate::request::{CommandArgs, CommandRequest, CommandResponse, DataRef};

/// Rejects malformed command arguments with `INPUT_VALIDATION`.
#[derive(Debug, Clone, Copy)]
pub struct ValidateArgs {
    max_data_length: usize,
}

impl ValidateArgs {
    /// Creates the stage.
    #[must_use]
    pub fn new(settings: StageSettings) -> Self {
        Self {
            max_data_length: settings.max_data_length,
        }
    }

    fn validate(&self, request: &CommandRequest) -> Result<()> {
        let args = &request.args;
        match request.command {
            CommandType::Create => {
                if args.data.is_empty() {
                    return Err(invalid(request, "'data' must contain at least one model"));
                }
                check_unique_ids(request, &args.data)?;
            }
            CommandType::Update => match &args.current_data {
                Some(DataRef::Command(index)) => {
                    return Err(Error::Internal(format!(
                        "'currentData' of {} still references command {index}",
                        request.path
                    )));
                }
                Some(DataRef::Rows(_)) => {
                    if args.data.iter().any(|row| row_id(row).is_none()) {
                        return Err(invalid(request, "every model in 'data' must have an 'id'"));
                    }
                    check_unique_ids(request, &args.data)?;
                }
                None => {
                    if args.data.len() != 1 {
                        return Err(invalid(request, "'data' must be a single patch object"));
                    }
                    if args.data[0].contains_key(ID_ATTR) {
                        return Err(invalid(request, "'id' cannot be modified"));
                    }
                }
            },
            CommandType::Read | CommandType::Delete => {
                if !args.data.is_empty() {
                    return Err(invalid(request, "'data' is not allowed"));
                }
            }
        }

        self.check_length(request, args)
    }

    fn check_length(&self, request: &CommandRequest, args: &CommandArgs) -> Result<()> {
        if args.data.is_empty() {
            return Ok(());
        }
        let length = serde_json::to_string(&args.data)
            .map_err(|e| Error::Internal(e.to_string()))?
            .len();
        if length > self.max_data_length {
            return Err(invalid(
                request,
                &format!(
                    "'data' is {length} bytes long, the maximum is {}",
                    self.max_data_length
                ),
            ));
        }
        Ok(())
    }
}

fn check_unique_ids(request: &CommandRequest, data: &[Row]) -> Result<()> {
    let mut seen = HashSet::new();
    for id in data.iter().filter_map(row_id) {
        if !seen.insert(value_key(id)) {
            return Err(invalid(
                request,
                &format!("'data' contains the id {id} more than once"),
            ));
        }
    }
    Ok(())
}

fn invalid(request: &CommandRequest, message: &str) -> Error {
    Error::InputValidation(format!(
        "{} on '{}': {message}",
        request.command, request.model
    ))
}

#[async_trait]
impl Middleware<CommandRequest, CommandResponse> for ValidateArgs {
    fn name(&self) -> &'static str {
        "validate_args"
    }

    async fn handle(
        &self,
        input: CommandRequest,
        next: Next<'_, CommandRequest, CommandResponse>,
    ) -> Result<CommandResponse> {
        self.validate(&input)?;
        next.run(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::testing::{request, row};
    use serde_json::json;

    fn stage() -> ValidateArgs {
        ValidateArgs::new(StageSettings::default())
    }

    #[test]
    fn test_create_requires_data() {
        let err = stage()
            .validate(&request(CommandType::Create, CommandArgs::default()))
            .unwrap_err();
        assert!(matches!(err, Error::InputValidation(_)));
    }

    #[test]
    fn test_create_rejects_duplicate_ids() {
        let args = CommandArgs {
            data: vec![row(json!({"id": 1})), row(json!({"id": 1}))],
            ..CommandArgs::default()
        };
        assert!(stage().validate(&request(CommandType::Create, args)).is_err());
    }

    #[test]
    fn test_patch_cannot_change_id() {
        let args = CommandArgs {
            data: vec![row(json!({"id": 2, "title": "x"}))],
            ..CommandArgs::default()
        };
        assert!(stage().validate(&request(CommandType::Update, args)).is_err());

        let args = CommandArgs {
            data: vec![row(json!({"title": "x"}))],
            ..CommandArgs::default()
        };
        assert!(stage().validate(&request(CommandType::Update, args)).is_ok());
    }

    #[test]
    fn test_substitution_needs_resolved_current_data() {
        let args = CommandArgs {
            data: vec![row(json!({"id": 5, "title": "x"}))],
            current_data: Some(DataRef::Command(0)),
            ..CommandArgs::default()
        };
        let err = stage().validate(&request(CommandType::Update, args)).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));

        let args = CommandArgs {
            data: vec![row(json!({"id": 5, "title": "x"}))],
            current_data: Some(DataRef::Rows(vec![row(json!({"id": 5}))])),
            ..CommandArgs::default()
        };
        assert!(stage().validate(&request(CommandType::Update, args)).is_ok());
    }

    #[test]
    fn test_data_length_limit() {
        let settings = StageSettings {
            max_data_length: 10,
            ..StageSettings::default()
        };
        let args = CommandArgs {
            data: vec![row(json!({"title": "a very long title"}))],
            ..CommandArgs::default()
        };
        let err = ValidateArgs::new(settings)
            .validate(&request(CommandType::Create, args))
            .unwrap_err();
        assert!(err.to_string().contains("maximum is 10"));
    }

    #[test]
    fn test_read_rejects_data() {
        let args = CommandArgs {
            data: vec![row(json!({"title": "x"}))],
            ..CommandArgs::default()
        };
        assert!(stage().validate(&request(CommandType::Read, args)).is_err());
    }
}

//! Action to command expansion.
//!
//! Most actions map to exactly one command. `replace` expands to a read of
//! the current rows followed by an update that substitutes them, the update
//! referring to the read by position.

use nestql_common::types::{CommandType, ID_ATTR, Row, Value, row_id};
use nestql_core::request::{CommandArgs, DataRef};

use super::action::{Action, ActionKind};

/// One command of an action, before parent bindings are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Operation to perform.
    pub command: CommandType,
    /// Arguments; `current_data` may still be a [`DataRef::Command`].
    pub args: CommandArgs,
    /// Whether the command only serves bookkeeping.
    pub internal: bool,
}

/// Expands an action into its ordered command list.
#[must_use]
pub fn expand(action: &Action) -> Vec<Command> {
    let args = &action.args;
    let base = CommandArgs {
        filter: args.filter.clone(),
        data: args.data.clone(),
        current_data: None,
        order_by: args.order_by.clone(),
        paginate: args.paginate,
        page: args.page,
        page_size: args.page_size,
        offset: None,
        limit: None,
    };

    if action.family.kind != ActionKind::Replace {
        return vec![Command {
            command: action.family.kind.command_type(),
            args: base,
            internal: action.internal,
        }];
    }

    let ids: Vec<Value> = args.data.iter().filter_map(row_id).cloned().collect();
    let mut filter = Row::new();
    filter.insert(ID_ATTR.to_string(), Value::Array(ids));

    vec![
        Command {
            command: CommandType::Read,
            args: CommandArgs::with_filter(filter),
            internal: true,
        },
        Command {
            command: CommandType::Update,
            args: CommandArgs {
                current_data: Some(DataRef::Command(0)),
                ..base
            },
            internal: action.internal,
        },
    ]
}

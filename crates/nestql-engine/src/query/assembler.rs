//! Response assembly.
//!
//! Nests each action's rows under its parent's rows along the relation that
//! links them, projects the client's selection, and places failures
//! according to the error policy. Internal actions are never rendered; their
//! failures surface at the nearest visible ancestor.

use hashbrown::{HashMap, HashSet};
use nestql_common::types::{Path, Row, Value, row_id, value_key};
use nestql_common::utils::error::{Error, Result};
use serde::Serialize;

use super::action::{Action, ActionPlan, RelationLink, SelectionItem};
use super::executor::{ActionOutcome, Execution};
use crate::config::ErrorPolicy;

/// Client-facing response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Result tree, `null` when the request failed as a whole.
    pub data: Option<Value>,
    /// Failures, in declaration order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ResponseError>,
}

impl Response {
    /// A successful response.
    #[must_use]
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// A response for a request that failed as a whole.
    #[must_use]
    pub fn failed(error: &Error) -> Self {
        Self {
            data: None,
            errors: vec![ResponseError::from_error(error, None)],
        }
    }

    /// Returns `true` if any error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Renders the response as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// One rendered failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseError {
    /// Message safe to show to the client.
    pub message: String,
    /// Stable error code.
    #[serde(rename = "type")]
    pub kind: String,
    /// Response path of the node the failure belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    /// Query text positions, for syntax errors.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
}

/// Line and column in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

impl ResponseError {
    /// Renders an error, optionally located at a response node.
    #[must_use]
    pub fn from_error(error: &Error, path: Option<&Path>) -> Self {
        let locations = match error {
            Error::Query(query) => query
                .span
                .map(|span| Location {
                    line: span.line,
                    column: span.column,
                })
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };
        Self {
            message: error.client_message(),
            kind: error.kind().as_str().to_string(),
            path: path.map(Path::to_response_path),
            locations,
        }
    }
}

/// Builds the response tree of an executed plan.
///
/// # Errors
///
/// Under [`ErrorPolicy::Request`], returns the first failure in declaration
/// order.
pub fn assemble(plan: &ActionPlan, execution: &Execution, policy: ErrorPolicy) -> Result<Response> {
    let mut failed: HashSet<Path> = HashSet::new();
    let mut errors = Vec::new();

    for action in plan.iter() {
        let Some(ActionOutcome::Failed(error)) = execution.outcome(&action.path) else {
            continue;
        };
        if policy == ErrorPolicy::Request {
            return Err(error.clone());
        }
        let owner = visible_owner(plan, action);
        tracing::debug!(path = %action.path, owner = %owner, %error, "failure nulls response node");
        errors.push(ResponseError::from_error(error, Some(&owner)));
        failed.insert(owner);
    }

    let assembler = Assembler {
        plan,
        failed: &failed,
        indexes: index_children(plan, execution),
    };

    let mut data = Row::new();
    for root in plan.roots() {
        let value = if assembler.failed.contains(&root.path) {
            Value::Null
        } else {
            match execution.rows(&root.path) {
                Some(rows) => assembler.render_rows(root, rows.iter()),
                None => Value::Null,
            }
        };
        data.insert(root.response_key(), value);
    }

    Ok(Response {
        data: Some(Value::Object(data)),
        errors,
    })
}

/// Nearest ancestor-or-self that is rendered.
fn visible_owner(plan: &ActionPlan, action: &Action) -> Path {
    let mut current = action;
    while current.internal {
        match plan.parent_of(current) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current.path.clone()
}

/// Rows of one child action, keyed for lookup from a parent row.
struct ChildIndex<'e> {
    link: RelationLink,
    by_key: HashMap<String, Vec<&'e Row>>,
}

fn index_children<'e>(plan: &ActionPlan, execution: &'e Execution) -> HashMap<Path, ChildIndex<'e>> {
    let mut indexes = HashMap::new();
    for action in plan.iter() {
        let (Some(link), Some(rows)) = (action.binding.link(), execution.rows(&action.path)) else {
            continue;
        };
        let mut by_key: HashMap<String, Vec<&Row>> = HashMap::new();
        for row in rows {
            let key = match &link {
                RelationLink::Inverse(inverse) => row.get(inverse),
                RelationLink::Ids(_) => row_id(row),
            };
            if let Some(key) = key.filter(|key| !key.is_null()) {
                by_key.entry(value_key(key)).or_default().push(row);
            }
        }
        indexes.insert(action.path.clone(), ChildIndex { link, by_key });
    }
    indexes
}

struct Assembler<'a> {
    plan: &'a ActionPlan,
    failed: &'a HashSet<Path>,
    indexes: HashMap<Path, ChildIndex<'a>>,
}

impl<'a> Assembler<'a> {
    fn render_rows<'r>(&self, action: &Action, mut rows: impl Iterator<Item = &'r Row>) -> Value {
        if action.family.multiple {
            Value::Array(rows.map(|row| self.render_row(action, row)).collect())
        } else {
            rows.next()
                .map_or(Value::Null, |row| self.render_row(action, row))
        }
    }

    fn render_row(&self, action: &Action, row: &Row) -> Value {
        let mut object = Row::new();
        for item in &action.selection {
            let value = match item {
                SelectionItem::Attribute { attribute, .. } => {
                    row.get(attribute).cloned().unwrap_or(Value::Null)
                }
                SelectionItem::Typename { .. } => Value::String(action.model.clone()),
                SelectionItem::Relation { child, .. } => self.render_relation(child, row),
            };
            object.insert(item.key().to_string(), value);
        }
        Value::Object(object)
    }

    fn render_relation(&self, child: &Path, parent_row: &Row) -> Value {
        if self.failed.contains(child) {
            return Value::Null;
        }
        let Some(action) = self.plan.by_path(child) else {
            return Value::Null;
        };
        let Some(index) = self.indexes.get(child) else {
            return if action.family.multiple {
                Value::Array(Vec::new())
            } else {
                Value::Null
            };
        };

        let related: Vec<&Row> = match &index.link {
            RelationLink::Inverse(_) => row_id(parent_row)
                .and_then(|id| index.by_key.get(&value_key(id)))
                .cloned()
                .unwrap_or_default(),
            RelationLink::Ids(attribute) => {
                let ids: Vec<&Value> = match parent_row.get(attribute) {
                    Some(Value::Array(items)) => items.iter().collect(),
                    Some(Value::Null) | None => Vec::new(),
                    Some(other) => vec![other],
                };
                let mut seen = HashSet::new();
                ids.into_iter()
                    .filter(|id| seen.insert(value_key(id)))
                    .filter_map(|id| index.by_key.get(&value_key(id)))
                    .flatten()
                    .copied()
                    .collect()
            }
        };
        self.render_rows(action, related.into_iter())
    }
}

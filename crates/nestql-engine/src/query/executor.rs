//! Phase-by-phase execution of a scheduled plan.
//!
//! Phases run strictly one after another. Within a phase, actions run
//! concurrently up to a bound; the commands of one action run in order.
//! Every command goes through the per-command pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::{StreamExt, stream};
use hashbrown::{HashMap, HashSet};
use nestql_common::types::{Path, Row, Value, row_id, value_key};
use nestql_common::utils::error::{Error, Result};
use nestql_core::middleware::CommandPipeline;
use nestql_core::request::{CommandArgs, CommandRequest, DataRef, RequestContext};
use parking_lot::Mutex;

use super::action::{Action, ActionId, ActionKind, ActionPlan, ParentBinding, RelationLink};
use super::expander::expand;
use super::scheduler::Schedule;

/// What happened to one action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Rows returned by the action's final command.
    Rows(Vec<Row>),
    /// The action failed.
    Failed(Error),
    /// Not run because its parent failed or was skipped.
    Skipped,
}

/// Outcomes of every action of a plan.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    outcomes: HashMap<Path, ActionOutcome>,
    /// Commands handed to the pipeline.
    pub commands: usize,
    /// Phases run.
    pub phases: usize,
}

impl Execution {
    /// Outcome of the action at `path`.
    #[must_use]
    pub fn outcome(&self, path: &Path) -> Option<&ActionOutcome> {
        self.outcomes.get(path)
    }

    /// Rows of the action at `path`, if it succeeded.
    #[must_use]
    pub fn rows(&self, path: &Path) -> Option<&[Row]> {
        match self.outcomes.get(path) {
            Some(ActionOutcome::Rows(rows)) => Some(rows),
            _ => None,
        }
    }

    pub(crate) fn record(&mut self, path: Path, outcome: ActionOutcome) {
        self.outcomes.insert(path, outcome);
    }

    /// Total rows returned by successful actions.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.outcomes
            .values()
            .map(|outcome| match outcome {
                ActionOutcome::Rows(rows) => rows.len(),
                _ => 0,
            })
            .sum()
    }
}

/// Runs scheduled plans against a command pipeline.
#[derive(Clone)]
pub struct Executor {
    pipeline: CommandPipeline,
    max_concurrency: usize,
}

impl Executor {
    /// Creates an executor dispatching at most `max_concurrency` actions at
    /// once.
    #[must_use]
    pub fn new(pipeline: CommandPipeline, max_concurrency: usize) -> Self {
        Self {
            pipeline,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Runs every phase of `schedule`.
    ///
    /// Action failures are recorded as outcomes; the returned error is
    /// reserved for the request deadline.
    ///
    /// # Errors
    ///
    /// Returns `TIMEOUT` once the context deadline passes. Work in flight is
    /// abandoned.
    pub async fn execute(
        &self,
        plan: &ActionPlan,
        schedule: &Schedule,
        context: &Arc<RequestContext>,
    ) -> Result<Execution> {
        let outcomes: Mutex<HashMap<Path, ActionOutcome>> =
            Mutex::new(HashMap::with_capacity(plan.len()));
        let commands = AtomicUsize::new(0);

        for (index, phase) in schedule.phases.iter().enumerate() {
            if context.is_expired() {
                return Err(deadline_exceeded(index));
            }

            let ids: Vec<ActionId> = phase.actions().collect();
            tracing::debug!(
                request_id = %context.request_id,
                phase = index,
                actions = ids.len(),
                "running phase"
            );

            let run = stream::iter(ids.iter().copied())
                .map(|id| self.run_action(plan, id, &outcomes, context, &commands))
                .buffer_unordered(self.max_concurrency)
                .collect::<Vec<()>>();

            match context.remaining() {
                Some(remaining) => {
                    tokio::time::timeout(remaining, run)
                        .await
                        .map_err(|_| deadline_exceeded(index))?;
                }
                None => {
                    run.await;
                }
            }

            // A command can hit the deadline inside a phase that still joins.
            let timed_out = {
                let outcomes = outcomes.lock();
                ids.iter().filter_map(|id| plan.get(*id)).any(|action| {
                    matches!(
                        outcomes.get(&action.path),
                        Some(ActionOutcome::Failed(Error::Timeout(_)))
                    )
                })
            };
            if timed_out || context.is_expired() {
                return Err(deadline_exceeded(index));
            }
        }

        Ok(Execution {
            outcomes: outcomes.into_inner(),
            commands: commands.into_inner(),
            phases: schedule.phases.len(),
        })
    }

    /// Runs one action and records its outcome under its path.
    async fn run_action(
        &self,
        plan: &ActionPlan,
        id: ActionId,
        outcomes: &Mutex<HashMap<Path, ActionOutcome>>,
        context: &Arc<RequestContext>,
        counter: &AtomicUsize,
    ) {
        let Some(action) = plan.get(id) else {
            tracing::error!(request_id = %context.request_id, id = id.0, "action is not in the plan");
            return;
        };

        let parent_rows = match &action.parent {
            None => Vec::new(),
            Some(parent) => {
                let parent_outcome = outcomes.lock().get(parent).cloned();
                match parent_outcome {
                    Some(ActionOutcome::Rows(rows)) => rows,
                    Some(ActionOutcome::Failed(_) | ActionOutcome::Skipped) => {
                        tracing::debug!(
                            request_id = %context.request_id,
                            path = %action.path,
                            "skipped after parent failure"
                        );
                        outcomes.lock().insert(action.path.clone(), ActionOutcome::Skipped);
                        return;
                    }
                    None => {
                        let error = Error::SchedulingInvariant(format!(
                            "'{}' ran before its parent '{parent}'",
                            action.path
                        ));
                        outcomes
                            .lock()
                            .insert(action.path.clone(), ActionOutcome::Failed(error));
                        return;
                    }
                }
            }
        };

        let outcome = match self.run_commands(action, &parent_rows, context, counter).await {
            Ok(rows) => ActionOutcome::Rows(rows),
            Err(error) => {
                tracing::debug!(
                    request_id = %context.request_id,
                    path = %action.path,
                    %error,
                    "action failed"
                );
                ActionOutcome::Failed(error)
            }
        };
        outcomes.lock().insert(action.path.clone(), outcome);
    }

    async fn run_commands(
        &self,
        action: &Action,
        parent_rows: &[Row],
        context: &Arc<RequestContext>,
        counter: &AtomicUsize,
    ) -> Result<Vec<Row>> {
        let mut results: Vec<Vec<Row>> = Vec::new();

        for command in expand(action) {
            let mut args = command.args;
            bind_parent(action, &mut args, parent_rows)?;

            if let Some(DataRef::Command(index)) = args.current_data {
                let current = results.get(index).cloned().ok_or_else(|| {
                    Error::Internal(format!(
                        "'{}' refers to command {index}, which has not run",
                        action.path
                    ))
                })?;
                if action.family.kind == ActionKind::Replace {
                    check_replaced_ids(action, &args.data, &current)?;
                }
                args.current_data = Some(DataRef::Rows(current));
            }

            let request = CommandRequest::new(
                action.model.clone(),
                command.command,
                args,
                Arc::clone(context),
            )
            .at(action.path.clone())
            .internal(command.internal);

            counter.fetch_add(1, Ordering::Relaxed);
            let rows = self.pipeline.call(request).await?.into_result()?;
            results.push(rows);
        }

        Ok(results.pop().unwrap_or_default())
    }
}

fn deadline_exceeded(phase: usize) -> Error {
    Error::Timeout(format!("before phase {phase} completed"))
}

/// Narrows or fills `args` from the parent's rows.
fn bind_parent(action: &Action, args: &mut CommandArgs, parent_rows: &[Row]) -> Result<()> {
    match &action.binding {
        ParentBinding::Root => Ok(()),
        ParentBinding::Filter(link) => {
            let values = related_values(link, parent_rows);
            let key = link.child_attribute().to_string();
            let filter = args.filter.get_or_insert_with(Row::new);
            let bound = match filter.remove(&key) {
                None => values,
                Some(existing) => intersect(values, &existing),
            };
            filter.insert(key, Value::Array(bound));
            Ok(())
        }
        ParentBinding::Data {
            inverse,
            parent_indices,
        } => {
            if args.data.is_empty() {
                return Ok(());
            }
            if parent_indices.len() != args.data.len() {
                return Err(Error::Internal(format!(
                    "'{}' has {} rows but {} parent links",
                    action.path,
                    args.data.len(),
                    parent_indices.len()
                )));
            }
            for (row, &index) in args.data.iter_mut().zip(parent_indices) {
                let id = parent_rows.get(index).and_then(row_id).ok_or_else(|| {
                    Error::Internal(format!(
                        "parent row {index} of '{}' is missing or has no id",
                        action.path
                    ))
                })?;
                row.insert(inverse.clone(), id.clone());
            }
            Ok(())
        }
    }
}

/// Values the child attribute must take to relate to `parent_rows`, in
/// parent order and deduplicated.
fn related_values(link: &RelationLink, parent_rows: &[Row]) -> Vec<Value> {
    let candidates: Vec<&Value> = match link {
        RelationLink::Inverse(_) => parent_rows.iter().filter_map(row_id).collect(),
        RelationLink::Ids(attribute) => parent_rows
            .iter()
            .filter_map(|row| row.get(attribute))
            .flat_map(|value| match value {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                Value::Null => Vec::new(),
                other => vec![other],
            })
            .collect(),
    };

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|value| seen.insert(value_key(value)))
        .cloned()
        .collect()
}

fn intersect(values: Vec<Value>, existing: &Value) -> Vec<Value> {
    let allowed: HashSet<String> = match existing {
        Value::Array(items) => items.iter().map(value_key).collect(),
        other => std::iter::once(value_key(other)).collect(),
    };
    values
        .into_iter()
        .filter(|value| allowed.contains(&value_key(value)))
        .collect()
}

fn check_replaced_ids(action: &Action, data: &[Row], current: &[Row]) -> Result<()> {
    let present: HashSet<String> = current.iter().filter_map(row_id).map(value_key).collect();
    for row in data {
        if let Some(id) = row_id(row) {
            if !present.contains(&value_key(id)) {
                return Err(Error::InputValidation(format!(
                    "'{}' with id {id} not found",
                    action.model
                )));
            }
        }
    }
    Ok(())
}

//! In-memory database adapter.
//!
//! Rows live in per-model maps keyed by identifier, in insertion order.
//! Every command takes the store lock once, so each command is atomic on its
//! own; there are no cross-command transactions.

use async_trait::async_trait;
use hashbrown::HashMap;
use indexmap::IndexMap;
use nestql_common::types::{CommandType, ID_ATTR, Row, Value, row_id, value_key};
use nestql_common::utils::error::{Error, Result};
use nestql_core::database::Database;
use nestql_core::request::{CommandArgs, CommandRequest, SortKey};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

type Table = IndexMap<String, Row>;

/// A database adapter keeping every model in memory.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: RwLock<HashMap<String, Table>>,
    commands: AtomicUsize,
}

impl MemoryDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds rows into a model. Rows without an identifier are skipped.
    #[must_use]
    pub fn with_rows(self, model: &str, rows: impl IntoIterator<Item = Row>) -> Self {
        self.insert(model, rows);
        self
    }

    /// Inserts or overwrites rows of a model.
    pub fn insert(&self, model: &str, rows: impl IntoIterator<Item = Row>) {
        let mut tables = self.tables.write();
        let table = tables.entry(model.to_string()).or_default();
        for row in rows {
            if let Some(id) = row_id(&row) {
                table.insert(value_key(id), row);
            }
        }
    }

    /// Snapshot of a model's rows in insertion order.
    #[must_use]
    pub fn rows(&self, model: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(model)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of commands executed so far.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.load(AtomicOrdering::SeqCst)
    }

    fn create(table: &mut Table, model: &str, data: &[Row]) -> Result<Vec<Row>> {
        let mut prepared = Vec::with_capacity(data.len());
        for row in data {
            let mut row = row.clone();
            if row_id(&row).is_none() {
                row.insert(
                    ID_ATTR.to_string(),
                    Value::String(uuid::Uuid::new_v4().to_string()),
                );
            }
            let key = row_id(&row).map(value_key).unwrap_or_default();
            if table.contains_key(&key) {
                return Err(Error::InputValidation(format!(
                    "'{model}' with id {key} already exists"
                )));
            }
            prepared.push((key, row));
        }
        for (key, row) in &prepared {
            table.insert(key.clone(), row.clone());
        }
        Ok(prepared.into_iter().map(|(_, row)| row).collect())
    }

    fn read(table: &Table, args: &CommandArgs) -> Vec<Row> {
        let mut rows: Vec<Row> = table
            .values()
            .filter(|row| matches_filter(row, args.filter.as_ref()))
            .cloned()
            .collect();
        sort_rows(&mut rows, &args.order_by);

        let offset = args.offset.unwrap_or(0);
        let limit = args.limit.unwrap_or(usize::MAX);
        rows.into_iter().skip(offset).take(limit).collect()
    }

    fn update(table: &mut Table, model: &str, args: &CommandArgs) -> Result<Vec<Row>> {
        if args.current_data.is_some() {
            // Substitution: every row replaces the stored row with its id.
            for row in &args.data {
                let key = row_id(row).map(value_key).unwrap_or_default();
                if !table.contains_key(&key) {
                    return Err(Error::InputValidation(format!(
                        "'{model}' with id {key} not found"
                    )));
                }
            }
            let mut updated = Vec::with_capacity(args.data.len());
            for row in &args.data {
                let key = row_id(row).map(value_key).unwrap_or_default();
                table.insert(key, row.clone());
                updated.push(row.clone());
            }
            return Ok(updated);
        }

        let Some(patch) = args.data.first() else {
            return Ok(Vec::new());
        };
        let mut updated = Vec::new();
        for row in table.values_mut() {
            if matches_filter(row, args.filter.as_ref()) {
                for (attribute, value) in patch {
                    row.insert(attribute.clone(), value.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    fn delete(table: &mut Table, args: &CommandArgs) -> Vec<Row> {
        let doomed: Vec<String> = table
            .iter()
            .filter(|(_, row)| matches_filter(row, args.filter.as_ref()))
            .map(|(key, _)| key.clone())
            .collect();
        doomed
            .iter()
            .filter_map(|key| table.shift_remove(key))
            .collect()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn execute(&self, request: &CommandRequest) -> Result<Vec<Row>> {
        self.commands.fetch_add(1, AtomicOrdering::SeqCst);
        let model = request.model.as_str();
        let args = &request.args;

        let rows = match request.command {
            CommandType::Read => self
                .tables
                .read()
                .get(model)
                .map(|table| Self::read(table, args))
                .unwrap_or_default(),
            CommandType::Create => {
                let mut tables = self.tables.write();
                Self::create(tables.entry(model.to_string()).or_default(), model, &args.data)?
            }
            CommandType::Update => {
                let mut tables = self.tables.write();
                Self::update(tables.entry(model.to_string()).or_default(), model, args)?
            }
            CommandType::Delete => {
                let mut tables = self.tables.write();
                tables
                    .get_mut(model)
                    .map(|table| Self::delete(table, args))
                    .unwrap_or_default()
            }
        };

        tracing::trace!(
            request_id = %request.context.request_id,
            model,
            command = %request.command,
            rows = rows.len(),
            "memory command applied"
        );
        Ok(rows)
    }
}

/// Equality filter; an array value means membership.
fn matches_filter(row: &Row, filter: Option<&Row>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    filter.iter().all(|(attribute, expected)| {
        let actual = row.get(attribute).unwrap_or(&Value::Null);
        match expected {
            Value::Array(candidates) => candidates.iter().any(|candidate| candidate == actual),
            other => other == actual,
        }
    })
}

fn sort_rows(rows: &mut [Row], order_by: &[SortKey]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        order_by
            .iter()
            .map(|key| {
                let ordering = compare_values(
                    a.get(&key.attribute).unwrap_or(&Value::Null),
                    b.get(&key.attribute).unwrap_or(&Value::Null),
                );
                if key.descending { ordering.reverse() } else { ordering }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Total order over JSON values: null, booleans, numbers, strings, then
/// anything else by its rendering.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ if rank(a) == rank(b) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestql_core::request::{DataRef, RequestContext};
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn request(model: &str, command: CommandType, args: CommandArgs) -> CommandRequest {
        CommandRequest::new(model, command, args, Arc::new(RequestContext::new()))
    }

    fn seeded() -> MemoryDatabase {
        MemoryDatabase::new().with_rows(
            "book",
            vec![
                row(json!({"id": 1, "title": "Dune", "year": 1965, "author_id": 10})),
                row(json!({"id": 2, "title": "Emma", "year": 1815, "author_id": 20})),
                row(json!({"id": 3, "title": "Ubik", "year": 1969, "author_id": 10})),
            ],
        )
    }

    #[tokio::test]
    async fn test_read_filter_and_membership() {
        let db = seeded();
        let args = CommandArgs::with_filter(row(json!({"author_id": 10})));
        let rows = db.execute(&request("book", CommandType::Read, args)).await.unwrap();
        assert_eq!(rows.len(), 2);

        let args = CommandArgs::with_filter(row(json!({"id": [2, 3]})));
        let rows = db.execute(&request("book", CommandType::Read, args)).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_read_sort_and_page() {
        let db = seeded();
        let args = CommandArgs {
            order_by: vec![SortKey::desc("year")],
            offset: Some(1),
            limit: Some(1),
            ..CommandArgs::default()
        };
        let rows = db.execute(&request("book", CommandType::Read, args)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], json!("Dune"));
    }

    #[tokio::test]
    async fn test_read_unknown_model_is_empty() {
        let db = MemoryDatabase::new();
        let rows = db
            .execute(&request("ghost", CommandType::Read, CommandArgs::default()))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_create_assigns_ids_in_payload_order() {
        let db = MemoryDatabase::new();
        let args = CommandArgs {
            data: vec![row(json!({"name": "a"})), row(json!({"id": 7, "name": "b"}))],
            ..CommandArgs::default()
        };
        let rows = db.execute(&request("author", CommandType::Create, args)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0]["id"].is_string());
        assert_eq!(rows[1]["id"], json!(7));
        assert_eq!(db.rows("author").len(), 2);
    }

    #[tokio::test]
    async fn test_create_duplicate_id_writes_nothing() {
        let db = seeded();
        let args = CommandArgs {
            data: vec![row(json!({"id": 9})), row(json!({"id": 1}))],
            ..CommandArgs::default()
        };
        let err = db
            .execute(&request("book", CommandType::Create, args))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InputValidation(_)));
        assert_eq!(db.rows("book").len(), 3);
    }

    #[tokio::test]
    async fn test_patch_update() {
        let db = seeded();
        let args = CommandArgs {
            filter: Some(row(json!({"author_id": 10}))),
            data: vec![row(json!({"year": 2000}))],
            ..CommandArgs::default()
        };
        let rows = db.execute(&request("book", CommandType::Update, args)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["year"] == json!(2000)));
        assert_eq!(db.rows("book")[1]["year"], json!(1815));
    }

    #[tokio::test]
    async fn test_substitution_update() {
        let db = seeded();
        let current = db.rows("book")[..1].to_vec();
        let args = CommandArgs {
            data: vec![row(json!({"id": 1, "title": "Dune Messiah"}))],
            current_data: Some(DataRef::Rows(current)),
            ..CommandArgs::default()
        };
        let rows = db.execute(&request("book", CommandType::Update, args)).await.unwrap();
        assert_eq!(rows[0], row(json!({"id": 1, "title": "Dune Messiah"})));
        assert!(db.rows("book")[0].get("year").is_none());

        let args = CommandArgs {
            data: vec![row(json!({"id": 99}))],
            current_data: Some(DataRef::Rows(Vec::new())),
            ..CommandArgs::default()
        };
        let err = db
            .execute(&request("book", CommandType::Update, args))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InputValidation(_)));
    }

    #[tokio::test]
    async fn test_delete_returns_removed_rows() {
        let db = seeded();
        let args = CommandArgs::with_filter(row(json!({"author_id": [10]})));
        let rows = db.execute(&request("book", CommandType::Delete, args)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(db.rows("book").len(), 1);
        assert_eq!(db.command_count(), 1);
    }

    #[test]
    fn test_compare_values_ranks_types() {
        assert_eq!(compare_values(&json!(null), &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(1), &json!("1")), Ordering::Less);
    }

    proptest! {
        #[test]
        fn prop_sort_is_ordered(values in proptest::collection::vec(-1000i64..1000, 0..40)) {
            let mut rows: Vec<Row> = values
                .iter()
                .enumerate()
                .map(|(i, v)| row(json!({"id": i, "n": v})))
                .collect();
            sort_rows(&mut rows, &[SortKey::asc("n")]);
            for pair in rows.windows(2) {
                prop_assert!(pair[0]["n"].as_i64() <= pair[1]["n"].as_i64());
            }
        }
    }
}

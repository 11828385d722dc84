//! End-to-end tests: GraphQL text in, response tree and database commands out.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nestql_adapters::query::graphql;
use nestql_adapters::storage::MemoryDatabase;
use nestql_common::types::{CommandType, Row};
use nestql_common::utils::error::{Error, Result};
use nestql_common::{ErrorKind, Path};
use nestql_core::database::Database;
use nestql_core::request::{CommandRequest, DataRef, RequestContext};
use nestql_engine::catalog::{Model, Relation};
use nestql_engine::query::{ActionId, DependencyGraph};
use nestql_engine::{Catalog, Config, Engine, ErrorPolicy, QueryRequest};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::{Value, json};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn catalog() -> Catalog {
    Catalog::builder()
        .model(
            Model::new("author", "authors")
                .scalar("name")
                .relation("books", Relation::many("book").inverse("author_id")),
        )
        .model(
            Model::new("book", "books")
                .scalar("title")
                .scalar("author_id")
                .relation("author", Relation::one("author")),
        )
        .model(Model::new("post", "posts").scalar("title").scalar("body"))
        .build()
        .unwrap()
}

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

/// Memory database that logs every command with its result, and can be told
/// to fail a model or to answer with varying delays.
#[derive(Default)]
struct TestDatabase {
    inner: MemoryDatabase,
    log: Mutex<Vec<(CommandRequest, Vec<Row>)>>,
    failing: Option<&'static str>,
    delays_ms: Vec<u64>,
    stall_first_call: Option<Duration>,
    calls: AtomicUsize,
}

impl TestDatabase {
    fn new(inner: MemoryDatabase) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    fn commands(&self) -> Vec<(CommandType, bool)> {
        self.log
            .lock()
            .iter()
            .map(|(request, _)| (request.command, request.internal))
            .collect()
    }
}

#[async_trait]
impl Database for TestDatabase {
    fn name(&self) -> &'static str {
        "test"
    }

    async fn execute(&self, request: &CommandRequest) -> Result<Vec<Row>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(stall) = self.stall_first_call.filter(|_| call == 0) {
            // Blocks the runtime thread, so no timer fires until the call returns.
            std::thread::sleep(stall);
        }
        if !self.delays_ms.is_empty() {
            let delay = self.delays_ms[call % self.delays_ms.len()];
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing == Some(request.model.as_str()) {
            return Err(Error::downstream("test", format!("{} is unavailable", request.model)));
        }
        let rows = self.inner.execute(request).await?;
        self.log.lock().push((request.clone(), rows.clone()));
        Ok(rows)
    }
}

fn engine(db: &Arc<TestDatabase>) -> Engine {
    Engine::new(catalog(), Arc::clone(db) as Arc<dyn Database>)
}

fn seeded_library() -> MemoryDatabase {
    MemoryDatabase::new()
        .with_rows(
            "author",
            [row(json!({"id": 1, "name": "Le Guin"})), row(json!({"id": 2, "name": "Herbert"}))],
        )
        .with_rows(
            "book",
            [
                row(json!({"id": 10, "title": "Dune", "author_id": 2, "author": 2})),
                row(json!({"id": 11, "title": "Earthsea", "author_id": 1, "author": 1})),
                row(json!({"id": 12, "title": "Lathe", "author_id": 1, "author": 1})),
            ],
        )
        .with_rows(
            "post",
            (1..=5).map(|i| row(json!({"id": i, "title": format!("post {i}")}))),
        )
}

#[tokio::test]
async fn test_nested_create_runs_in_two_phases() {
    init_tracing();
    let db = Arc::new(TestDatabase::new(MemoryDatabase::new()));
    let result = engine(&db)
        .session()
        .execute(QueryRequest::new(
            r#"mutation {
                create_authors(data: [
                    {name: "A", books: [{title: "a1"}, {title: "a2"}]},
                    {name: "B", books: [{title: "b1"}]}
                ]) { id name books { title author_id } }
            }"#,
        ))
        .await;

    assert!(!result.response.has_errors(), "{:?}", result.response.errors);
    assert_eq!(result.summary.phases, 2);
    assert_eq!(result.summary.commands, 2);
    assert_eq!(result.summary.operation, "create_authors{books}");
    assert_eq!(
        db.commands(),
        vec![(CommandType::Create, false), (CommandType::Create, false)]
    );

    let data = result.response.data.unwrap();
    let authors = data["create_authors"].as_array().unwrap();
    assert_eq!(authors.len(), 2);
    assert_eq!(authors[0]["name"], json!("A"));
    let titles: Vec<_> = authors[0]["books"]
        .as_array()
        .unwrap()
        .iter()
        .map(|book| book["title"].clone())
        .collect();
    assert_eq!(titles, vec![json!("a1"), json!("a2")]);
    for author in authors {
        for book in author["books"].as_array().unwrap() {
            assert_eq!(book["author_id"], author["id"]);
        }
    }
    assert_eq!(db.inner.rows("book").len(), 3);
}

#[tokio::test]
async fn test_unselected_nested_write_stays_out_of_response() {
    let db = Arc::new(TestDatabase::new(MemoryDatabase::new()));
    let result = engine(&db)
        .session()
        .execute(QueryRequest::new(
            r#"mutation { create_author(data: {name: "A", books: [{title: "t"}]}) { name } }"#,
        ))
        .await;

    assert_eq!(result.response.data.unwrap(), json!({"create_author": {"name": "A"}}));
    assert_eq!(db.commands(), vec![(CommandType::Create, false), (CommandType::Create, true)]);
    assert_eq!(db.inner.rows("book").len(), 1);
}

#[tokio::test]
async fn test_replace_reads_current_state_before_update() {
    let memory = MemoryDatabase::new().with_rows(
        "post",
        [row(json!({"id": 5, "title": "old", "body": "text"}))],
    );
    let db = Arc::new(TestDatabase::new(memory));
    let result = engine(&db)
        .session()
        .execute(QueryRequest::new(
            r#"mutation { replace_post(id: 5, data: {title: "new"}) { id title body } }"#,
        ))
        .await;

    assert_eq!(
        result.response.data.unwrap(),
        json!({"replace_post": {"id": 5, "title": "new", "body": null}})
    );
    assert_eq!(db.commands(), vec![(CommandType::Read, true), (CommandType::Update, false)]);

    let log = db.log.lock();
    let read_rows = log[0].1.clone();
    assert_eq!(read_rows, vec![row(json!({"id": 5, "title": "old", "body": "text"}))]);
    assert_eq!(log[1].0.args.current_data, Some(DataRef::Rows(read_rows)));
}

#[tokio::test]
async fn test_replace_of_missing_row_fails() {
    let db = Arc::new(TestDatabase::new(MemoryDatabase::new()));
    let result = engine(&db)
        .session()
        .execute(QueryRequest::new(
            r#"mutation { replace_post(id: 6, data: {title: "new"}) { id } }"#,
        ))
        .await;

    assert_eq!(result.response.data, None);
    assert_eq!(result.response.errors[0].kind, "INPUT_VALIDATION");
    assert!(result.response.errors[0].message.contains("'post' with id 6 not found"));
    assert_eq!(db.commands(), vec![(CommandType::Read, true)]);
}

#[tokio::test]
async fn test_forced_cycle_executes_nothing() {
    let db = Arc::new(TestDatabase::new(seeded_library()));
    let session = engine(&db).session();
    let document = graphql::parse("{ find_authors { id books { id } } }").unwrap();
    let compiled = session
        .processor()
        .compile(&document, &Row::new(), None)
        .unwrap();

    let mut graph = DependencyGraph::from_plan(&compiled.plan).unwrap();
    graph.add_edge(ActionId(0), ActionId(1)).unwrap();
    let context = Arc::new(RequestContext::new());
    let err = session
        .processor()
        .run(&compiled, &graph, &context)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SchedulingInvariant);
    assert_eq!(db.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_read_only_query_has_one_phase_per_depth() {
    let db = Arc::new(TestDatabase::new(seeded_library()));
    let result = engine(&db)
        .session()
        .execute(QueryRequest::new(
            "{ find_authors { name books { title author { name } } } }",
        ))
        .await;

    assert_eq!(result.summary.phases, 3);
    assert_eq!(result.summary.commands, 3);
    assert_eq!(
        result.response.data.unwrap(),
        json!({"find_authors": [
            {"name": "Le Guin", "books": [
                {"title": "Earthsea", "author": {"name": "Le Guin"}},
                {"title": "Lathe", "author": {"name": "Le Guin"}}
            ]},
            {"name": "Herbert", "books": [
                {"title": "Dune", "author": {"name": "Herbert"}}
            ]}
        ]})
    );
}

#[tokio::test]
async fn test_pagination_and_filters() {
    let db = Arc::new(TestDatabase::new(seeded_library()));
    let session = engine(&db).session();

    let result = session
        .execute(QueryRequest::new(
            r#"{ page: find_posts(page: 2, page_size: 2) { id } one: find_post(id: 4) { title } }"#,
        ))
        .await;
    assert_eq!(
        result.response.data.unwrap(),
        json!({"page": [{"id": 3}, {"id": 4}], "one": {"title": "post 4"}})
    );

    let result = session
        .execute(QueryRequest::new("{ find_posts(page_size: 1000) { id } }"))
        .await;
    assert_eq!(result.response.errors[0].kind, "INPUT_VALIDATION");
}

#[tokio::test]
async fn test_variables_and_operation_name() {
    let db = Arc::new(TestDatabase::new(seeded_library()));
    let request = QueryRequest::new(
        r#"query Authors { find_authors { id } }
           query Books($title: String!) { find_books(filter: {title: $title}) { id title } }"#,
    )
    .with_operation_name("Books")
    .with_variables(row(json!({"title": "Dune"})));

    let result = engine(&db).session().execute(request).await;
    assert_eq!(
        result.response.data.unwrap(),
        json!({"find_books": [{"id": 10, "title": "Dune"}]})
    );
}

#[tokio::test]
async fn test_field_policy_keeps_siblings() {
    let db = Arc::new(TestDatabase {
        failing: Some("book"),
        ..TestDatabase::new(seeded_library())
    });
    let config = Config::default().with_error_policy(ErrorPolicy::Field);
    let engine = Engine::with_config(catalog(), Arc::clone(&db) as Arc<dyn Database>, config).unwrap();

    let result = engine
        .session()
        .execute(QueryRequest::new(
            "{ find_authors { name books { title } } find_posts(page_size: 1) { id } }",
        ))
        .await;

    assert_eq!(
        result.response.data.clone().unwrap(),
        json!({
            "find_authors": [
                {"name": "Le Guin", "books": null},
                {"name": "Herbert", "books": null}
            ],
            "find_posts": [{"id": 1}]
        })
    );
    assert_eq!(result.response.errors.len(), 1);
    assert_eq!(result.response.errors[0].kind, "DOWNSTREAM_FAILURE");
    assert_eq!(
        result.response.errors[0].path,
        Some(Path::from_fields(["find_authors", "books"]).to_response_path())
    );
}

#[tokio::test]
async fn test_request_policy_fails_whole_request() {
    let db = Arc::new(TestDatabase {
        failing: Some("book"),
        ..TestDatabase::new(seeded_library())
    });
    let result = engine(&db)
        .session()
        .execute(QueryRequest::new("{ find_authors { name books { title } } }"))
        .await;

    assert_eq!(
        result.response.to_json(),
        json!({"data": null, "errors": [
            {"message": "test failed: book is unavailable", "type": "DOWNSTREAM_FAILURE"}
        ]})
    );
}

#[tokio::test]
async fn test_deadline_abandons_slow_phase() {
    let db = Arc::new(TestDatabase {
        delays_ms: vec![500],
        ..TestDatabase::new(seeded_library())
    });
    let request = QueryRequest::new("{ find_authors { id } }")
        .with_context(RequestContext::new().with_timeout(Duration::from_millis(20)));

    let result = engine(&db).session().execute(request).await;
    assert_eq!(result.response.errors[0].kind, "TIMEOUT");
    assert!(db.log.lock().is_empty());
}

#[tokio::test]
async fn test_deadline_inside_phase_fails_request() {
    let db = Arc::new(TestDatabase {
        stall_first_call: Some(Duration::from_millis(40)),
        ..TestDatabase::new(seeded_library())
    });
    let config = Config::default().with_error_policy(ErrorPolicy::Field);
    let engine = Engine::with_config(catalog(), Arc::clone(&db) as Arc<dyn Database>, config).unwrap();
    let request = QueryRequest::new(r#"mutation { replace_post(id: 5, data: {title: "new"}) { id title } }"#)
        .with_context(RequestContext::new().with_timeout(Duration::from_millis(20)));

    let result = engine.session().execute(request).await;
    assert!(result.response.data.is_none());
    assert_eq!(result.response.errors.len(), 1);
    assert_eq!(result.response.errors[0].kind, "TIMEOUT");
    assert!(result.response.errors[0].path.is_none());
    assert_eq!(db.commands(), vec![(CommandType::Read, true)]);
}

#[tokio::test]
async fn test_written_relation_cannot_be_read_back_twice() {
    let db = Arc::new(TestDatabase {
        delays_ms: vec![0, 50],
        ..TestDatabase::new(MemoryDatabase::new())
    });
    let result = engine(&db)
        .session()
        .execute(QueryRequest::new(
            r#"mutation {
                create_author(data: {name: "A", books: [{title: "t"}]}) {
                    id a: books { title } b: books { title }
                }
            }"#,
        ))
        .await;

    assert!(result.response.data.is_none());
    assert_eq!(result.response.errors[0].kind, "INPUT_VALIDATION");
    assert_eq!(db.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_client_errors_are_rendered() {
    let db = Arc::new(TestDatabase::new(MemoryDatabase::new()));
    let session = engine(&db).session();

    let result = session.execute(QueryRequest::new("{ find_posts { id }")).await;
    let error = &result.response.errors[0];
    assert_eq!(error.kind, "SYNTAX_VALIDATION");
    assert_eq!(error.locations.len(), 1);

    let result = session.execute(QueryRequest::new("{ find_comments { id } }")).await;
    assert_eq!(result.response.errors[0].kind, "SCHEMA_MISMATCH");

    let result = session
        .try_execute(QueryRequest::new("{ find_posts { id body(x: 1) } }"))
        .await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InputValidation);
    assert_eq!(db.calls.load(Ordering::SeqCst), 0);
}

fn shuffled_query_response(delays_ms: Vec<u64>) -> (String, usize) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    runtime.block_on(async move {
        let db = Arc::new(TestDatabase {
            delays_ms,
            ..TestDatabase::new(seeded_library())
        });
        let result = engine(&db)
            .session()
            .execute(QueryRequest::new(
                "{ d: find_posts { id } a: find_authors { name books { title } }
                   c: find_books { title } b: find_post(id: 2) { title } }",
            ))
            .await;
        (result.response.to_json().to_string(), result.summary.commands)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_response_order_ignores_completion_order(
        delays in prop::collection::vec(0u64..6, 1..6)
    ) {
        let (expected, _) = shuffled_query_response(Vec::new());
        let (actual, commands) = shuffled_query_response(delays);
        prop_assert_eq!(commands, 5);
        prop_assert_eq!(actual, expected);
    }
}

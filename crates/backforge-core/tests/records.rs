//! Record operations through a healthy remote backend.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use backforge_core::config::DataConfig;
use backforge_core::query::{Direction, Query};
use backforge_core::tenant::Namespace;
use backforge_test_utils::{RemoteOp, TestContext, column_values, init_test_logging, record};
use serde_json::json;

#[tokio::test]
async fn inserts_get_sequential_ids() {
    init_test_logging();
    let ctx = TestContext::new();

    let mut ids = Vec::new();
    for title in ["a", "b", "c"] {
        let rows = ctx
            .layer
            .query(
                "todos",
                Query::insert(record(json!({"title": title}))),
                Some(&ctx.tenant),
            )
            .await
            .expect("insert");
        ids.push(rows[0].numeric_id().expect("numeric id"));
    }

    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(ctx.remote.rows(&ctx.namespace(), "todos").len(), 3);
    assert!(ctx.fallback.tables(&ctx.namespace()).unwrap().is_empty());
}

#[tokio::test]
async fn tenant_namespace_is_created_once() {
    let ctx = TestContext::new();

    for _ in 0..3 {
        ctx.layer
            .query("todos", Query::select(), Some(&ctx.tenant))
            .await
            .expect("select");
    }

    let schema = ctx.tenant.schema_name();
    assert!(ctx.remote.has_schema(&schema));
    let creates = ctx
        .remote
        .statements()
        .into_iter()
        .filter(|sql| sql.starts_with("CREATE SCHEMA"))
        .count();
    assert_eq!(creates, 1);
    assert!(ctx.layer.router().is_ensured(&schema));
}

#[tokio::test]
async fn select_filters_by_equality() {
    let ctx = TestContext::new();
    for (title, done) in [("a", false), ("b", true), ("c", false)] {
        ctx.layer
            .query(
                "todos",
                Query::insert(record(json!({"title": title, "done": done}))),
                Some(&ctx.tenant),
            )
            .await
            .expect("insert");
    }

    let rows = ctx
        .layer
        .query_options(
            "todos",
            &json!({"method": "select", "where": {"done": false}}),
            Some(&ctx.tenant),
        )
        .await
        .expect("select");

    assert_eq!(column_values(&rows, "title"), vec![json!("a"), json!("c")]);
}

#[tokio::test]
async fn inserted_row_reads_back_with_id_and_timestamp() {
    let ctx = TestContext::new();
    let inserted = ctx
        .layer
        .query(
            "notes",
            Query::insert(record(json!({"body": "hello", "tags": ["x", "y"]}))),
            Some(&ctx.tenant),
        )
        .await
        .expect("insert")
        .remove(0);

    let rows = ctx
        .layer
        .query(
            "notes",
            Query::select().filter("id", inserted.numeric_id().unwrap()),
            Some(&ctx.tenant),
        )
        .await
        .expect("select");

    assert_eq!(rows, vec![inserted.clone()]);
    assert_eq!(inserted.get("body"), Some(&json!("hello")));
    assert_eq!(inserted.get("tags"), Some(&json!(["x", "y"])));
    assert!(inserted.contains("created_at"));
}

#[tokio::test]
async fn update_merges_and_returns_matching_rows() {
    let ctx = TestContext::new();
    ctx.layer
        .query(
            "todos",
            Query::insert(record(json!({"title": "a", "done": false}))),
            Some(&ctx.tenant),
        )
        .await
        .expect("insert");

    let updated = ctx
        .layer
        .query(
            "todos",
            Query::update(record(json!({"done": true}))).filter("id", 1),
            Some(&ctx.tenant),
        )
        .await
        .expect("update");

    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].get("title"), Some(&json!("a")));
    assert_eq!(updated[0].get("done"), Some(&json!(true)));

    let none = ctx
        .layer
        .query(
            "todos",
            Query::update(record(json!({"done": false}))).filter("id", 99),
            Some(&ctx.tenant),
        )
        .await
        .expect("update of nothing");
    assert!(none.is_empty());
}

#[tokio::test]
async fn delete_removes_matching_rows() {
    let ctx = TestContext::new();
    for title in ["a", "b"] {
        ctx.layer
            .query(
                "todos",
                Query::insert(record(json!({"title": title}))),
                Some(&ctx.tenant),
            )
            .await
            .expect("insert");
    }

    let deleted = ctx
        .layer
        .query("todos", Query::delete().filter("title", "a"), Some(&ctx.tenant))
        .await
        .expect("delete");
    assert_eq!(column_values(&deleted, "title"), vec![json!("a")]);

    let remaining = ctx
        .layer
        .query("todos", Query::select(), Some(&ctx.tenant))
        .await
        .expect("select");
    assert_eq!(column_values(&remaining, "title"), vec![json!("b")]);
}

#[tokio::test]
async fn descending_order_keeps_ties_in_insertion_order() {
    let ctx = TestContext::new();
    for (title, priority) in [("a", 1), ("b", 2), ("c", 2), ("d", 3)] {
        ctx.layer
            .query(
                "todos",
                Query::insert(record(json!({"title": title, "priority": priority}))),
                Some(&ctx.tenant),
            )
            .await
            .expect("insert");
    }

    let rows = ctx
        .layer
        .query(
            "todos",
            Query::select().order_by("priority", Direction::Desc),
            Some(&ctx.tenant),
        )
        .await
        .expect("select");

    assert_eq!(
        column_values(&rows, "title"),
        vec![json!("d"), json!("b"), json!("c"), json!("a")]
    );
}

#[tokio::test]
async fn offset_without_limit_pages_by_default_size() {
    let ctx = TestContext::with_config(DataConfig {
        default_page_size: 3,
        ..DataConfig::default()
    });
    let rows: Vec<_> = (1..=8).map(|n| record(json!({"n": n}))).collect();
    ctx.layer
        .query("items", Query::insert_many(rows), Some(&ctx.tenant))
        .await
        .expect("insert");

    let page = ctx
        .layer
        .query("items", Query::select().offset(3), Some(&ctx.tenant))
        .await
        .expect("select");
    assert_eq!(column_values(&page, "n"), vec![json!(4), json!(5), json!(6)]);

    let tail = ctx
        .layer
        .query("items", Query::select().offset(6).limit(10), Some(&ctx.tenant))
        .await
        .expect("select");
    assert_eq!(column_values(&tail, "n"), vec![json!(7), json!(8)]);
}

#[tokio::test]
async fn tenants_are_isolated_and_global_tables_are_shared() {
    let a = TestContext::new();
    let b = backforge_test_utils::unique_tenant();

    a.layer
        .query("todos", Query::insert(record(json!({"title": "secret"}))), Some(&a.tenant))
        .await
        .expect("insert");
    a.layer
        .query(
            "projects",
            Query::insert(record(json!({"name": "todo-api"}))),
            Some(&a.tenant),
        )
        .await
        .expect("insert project");

    let other = a
        .layer
        .query("todos", Query::select(), Some(&b))
        .await
        .expect("select");
    assert!(other.is_empty());

    let projects = a
        .layer
        .query("projects", Query::select(), Some(&b))
        .await
        .expect("select projects");
    assert_eq!(column_values(&projects, "name"), vec![json!("todo-api")]);

    let writes = a.remote.writes_to("projects");
    assert!(matches!(
        &writes[0],
        RemoteOp::Insert { schema, .. } if schema == "public"
    ));
    assert_eq!(a.remote.rows(&Namespace::Global, "projects").len(), 1);
}

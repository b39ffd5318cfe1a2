//! In-memory remote backend with schema enforcement and operation tracing.
//!
//! [`SchemaRemote`] behaves like a PostgREST backend closely enough to drive
//! the data layer through its healing and fallback paths:
//!
//! - tenant namespaces must be created with `CREATE SCHEMA` before use
//! - tables declared through DDL (or [`SchemaRemote::declare_table`]) reject
//!   unknown payload columns with `PGRST204`
//! - non-integer `id` values are rejected with `22P02`
//! - failures can be injected for every call, per method, or for DDL

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use backforge_core::error::{RemoteError, RemoteErrorKind, RemoteResult};
use backforge_core::fallback::FallbackStore;
use backforge_core::query::{Method, Query};
use backforge_core::record::{CREATED_AT_COLUMN, ID_COLUMN, Record, as_i64};
use backforge_core::remote::RemoteBackend;
use backforge_core::tenant::{GLOBAL_SCHEMA, Namespace};

/// Record of a remote call for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOp {
    /// Select call.
    Select {
        /// Schema that was read.
        schema: String,
        /// Table that was read.
        table: String,
    },
    /// Insert call.
    Insert {
        /// Schema that was written.
        schema: String,
        /// Table that was written.
        table: String,
        /// Records as sent.
        records: Vec<Record>,
    },
    /// Update call.
    Update {
        /// Schema that was written.
        schema: String,
        /// Table that was written.
        table: String,
        /// Patch as sent.
        patch: Record,
    },
    /// Delete call.
    Delete {
        /// Schema that was written.
        schema: String,
        /// Table that was written.
        table: String,
    },
    /// Raw statement.
    Statement {
        /// SQL text.
        sql: String,
    },
}

impl RemoteOp {
    /// Table the call targeted, if any.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Select { table, .. }
            | Self::Insert { table, .. }
            | Self::Update { table, .. }
            | Self::Delete { table, .. } => Some(table),
            Self::Statement { .. } => None,
        }
    }

    /// True for insert, update and delete calls.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Insert { .. } | Self::Update { .. } | Self::Delete { .. }
        )
    }
}

/// In-memory PostgREST stand-in.
///
/// Clones share state, so a test can keep one handle for assertions while the
/// data layer owns another.
#[derive(Debug, Clone, Default)]
pub struct SchemaRemote {
    rows: Arc<FallbackStore>,
    schemas: Arc<Mutex<HashSet<String>>>,
    declared: Arc<Mutex<HashMap<(String, String), Vec<String>>>>,
    constraints: Arc<Mutex<HashSet<String>>>,
    operations: Arc<Mutex<Vec<RemoteOp>>>,
    outage: Arc<Mutex<Option<RemoteError>>>,
    method_failures: Arc<Mutex<Vec<(Method, RemoteError)>>>,
    statement_failure: Arc<Mutex<Option<RemoteError>>>,
}

impl SchemaRemote {
    /// Creates an empty backend where only the global schema exists.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a table with the given columns (plus `id` and `created_at`),
    /// creating its schema if needed.
    pub fn declare_table(&self, namespace: &Namespace, table: &str, columns: &[&str]) {
        let schema = namespace.schema_name();
        self.schemas.lock().expect("lock").insert(schema.clone());
        let mut all = vec![ID_COLUMN.to_string(), CREATED_AT_COLUMN.to_string()];
        all.extend(columns.iter().map(|c| (*c).to_string()));
        self.declared
            .lock()
            .expect("lock")
            .insert((schema, table.to_string()), all);
    }

    /// Declared columns of a table, or `None` if it was never declared.
    #[must_use]
    pub fn columns(&self, namespace: &Namespace, table: &str) -> Option<Vec<String>> {
        self.declared
            .lock()
            .expect("lock")
            .get(&(namespace.schema_name(), table.to_string()))
            .cloned()
    }

    /// Returns true if the schema exists.
    #[must_use]
    pub fn has_schema(&self, schema: &str) -> bool {
        schema == GLOBAL_SCHEMA || self.schemas.lock().expect("lock").contains(schema)
    }

    /// Rows currently stored in a table.
    #[must_use]
    pub fn rows(&self, namespace: &Namespace, table: &str) -> Vec<Record> {
        self.rows
            .select(namespace, table, &Query::select())
            .expect("select")
    }

    /// Fails every call with `error` until cleared.
    pub fn fail_all(&self, error: RemoteError) {
        *self.outage.lock().expect("lock") = Some(error);
    }

    /// Fails every call of `method` with `error` until cleared.
    pub fn fail_method(&self, method: Method, error: RemoteError) {
        self.method_failures
            .lock()
            .expect("lock")
            .push((method, error));
    }

    /// Fails every raw statement with `error` until cleared.
    pub fn fail_statements(&self, error: RemoteError) {
        *self.statement_failure.lock().expect("lock") = Some(error);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        *self.outage.lock().expect("lock") = None;
        *self.statement_failure.lock().expect("lock") = None;
        self.method_failures.lock().expect("lock").clear();
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<RemoteOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Write calls that targeted `table`.
    #[must_use]
    pub fn writes_to(&self, table: &str) -> Vec<RemoteOp> {
        self.operations()
            .into_iter()
            .filter(|op| op.is_write() && op.table() == Some(table))
            .collect()
    }

    /// Raw statements received, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                RemoteOp::Statement { sql } => Some(sql),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: RemoteOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, method: Method) -> RemoteResult<()> {
        if let Some(err) = self.outage.lock().expect("lock").clone() {
            return Err(err);
        }
        let failures = self.method_failures.lock().expect("lock");
        match failures.iter().find(|(m, _)| *m == method) {
            Some((_, err)) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn check_schema(&self, namespace: &Namespace) -> RemoteResult<()> {
        let schema = namespace.schema_name();
        if self.has_schema(&schema) {
            return Ok(());
        }
        Err(RemoteError::new(
            RemoteErrorKind::NotFound,
            format!("The schema must be one of the following: {GLOBAL_SCHEMA} ({schema})"),
        )
        .with_code("PGRST106"))
    }

    fn check_records<'a>(
        &self,
        namespace: &Namespace,
        table: &str,
        records: impl IntoIterator<Item = &'a Record>,
    ) -> RemoteResult<()> {
        let declared = self.columns(namespace, table);
        for record in records {
            if let Some(declared) = &declared {
                if let Some(column) = record.columns().find(|c| !declared.iter().any(|d| d.as_str() == *c))
                {
                    return Err(RemoteError::unknown_column(
                        column,
                        format!(
                            "Could not find the '{column}' column of '{table}' in the schema cache"
                        ),
                    )
                    .with_code("PGRST204"));
                }
            }
            if let Some(id) = record.id() {
                if !id.is_null() && as_i64(id).is_none() {
                    let literal = id.as_str().map_or_else(|| id.to_string(), str::to_string);
                    return Err(RemoteError::new(
                        RemoteErrorKind::TypeMismatch,
                        format!("invalid input syntax for type integer: \"{literal}\""),
                    )
                    .with_code("22P02"));
                }
            }
        }
        Ok(())
    }

    fn apply_statement(&self, sql: &str) -> RemoteResult<()> {
        let idents = quoted_idents(sql);
        if sql.starts_with("CREATE SCHEMA") {
            if let Some(schema) = idents.first() {
                self.schemas.lock().expect("lock").insert(schema.clone());
            }
            return Ok(());
        }

        let (Some(schema), Some(table)) = (idents.first(), idents.get(1)) else {
            return Err(RemoteError::new(RemoteErrorKind::Rejected, "syntax error").with_code("42601"));
        };
        if !self.has_schema(schema) {
            return Err(RemoteError::new(
                RemoteErrorKind::NotFound,
                format!("schema \"{schema}\" does not exist"),
            )
            .with_code("3F000"));
        }
        let key = (schema.clone(), table.clone());

        if sql.starts_with("CREATE TABLE") {
            let body = sql.find('(').map_or("", |i| &sql[i + 1..]);
            let columns = body
                .split(", ")
                .filter(|part| part.starts_with('"'))
                .filter_map(|part| quoted_idents(part).into_iter().next())
                .collect();
            self.declared
                .lock()
                .expect("lock")
                .entry(key)
                .or_insert(columns);
            return Ok(());
        }

        if sql.contains(" ADD COLUMN ") {
            let mut declared = self.declared.lock().expect("lock");
            let Some(columns) = declared.get_mut(&key) else {
                return Err(RemoteError::new(
                    RemoteErrorKind::NotFound,
                    format!("relation \"{schema}.{table}\" does not exist"),
                )
                .with_code("42P01"));
            };
            if let Some(column) = idents.get(2) {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
            return Ok(());
        }

        if sql.contains(" ADD CONSTRAINT ") {
            let name = idents.get(2).cloned().unwrap_or_default();
            if !self.constraints.lock().expect("lock").insert(name.clone()) {
                return Err(RemoteError::new(
                    RemoteErrorKind::AlreadyExists,
                    format!("constraint \"{name}\" for relation \"{table}\" already exists"),
                )
                .with_code("42710"));
            }
        }
        Ok(())
    }
}

fn quoted_idents(sql: &str) -> Vec<String> {
    sql.split('"')
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

fn into_remote(err: &backforge_core::Error) -> RemoteError {
    RemoteError::new(RemoteErrorKind::Rejected, err.to_string())
}

#[async_trait::async_trait]
impl RemoteBackend for SchemaRemote {
    async fn select(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>> {
        self.record(RemoteOp::Select {
            schema: namespace.schema_name(),
            table: table.to_string(),
        });
        self.check_failure(Method::Select)?;
        self.check_schema(namespace)?;

        self.rows
            .select(namespace, table, query)
            .map_err(|e| into_remote(&e))
    }

    async fn insert(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>> {
        let payload = query.payload().map_err(|e| into_remote(&e))?;
        self.record(RemoteOp::Insert {
            schema: namespace.schema_name(),
            table: table.to_string(),
            records: payload.records().to_vec(),
        });
        self.check_failure(Method::Insert)?;
        self.check_schema(namespace)?;
        self.check_records(namespace, table, payload.records())?;

        self.rows
            .insert(namespace, table, query)
            .map_err(|e| into_remote(&e))
    }

    async fn update(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>> {
        let patch = query
            .payload()
            .and_then(|p| p.single())
            .map_err(|e| into_remote(&e))?;
        self.record(RemoteOp::Update {
            schema: namespace.schema_name(),
            table: table.to_string(),
            patch: patch.clone(),
        });
        self.check_failure(Method::Update)?;
        self.check_schema(namespace)?;
        self.check_records(namespace, table, [patch])?;

        self.rows
            .update(namespace, table, query)
            .map_err(|e| into_remote(&e))
    }

    async fn delete(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>> {
        self.record(RemoteOp::Delete {
            schema: namespace.schema_name(),
            table: table.to_string(),
        });
        self.check_failure(Method::Delete)?;
        self.check_schema(namespace)?;

        self.rows
            .delete(namespace, table, query)
            .map_err(|e| into_remote(&e))
    }

    async fn execute_statement(&self, sql: &str) -> RemoteResult<()> {
        self.record(RemoteOp::Statement {
            sql: sql.to_string(),
        });
        if let Some(err) = self.outage.lock().expect("lock").clone() {
            return Err(err);
        }
        if let Some(err) = self.statement_failure.lock().expect("lock").clone() {
            return Err(err);
        }
        self.apply_statement(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backforge_core::schema::{ColumnDef, ColumnType, TableDef, create_schema_sql, create_table_sql};
    use backforge_core::tenant::TenantId;
    use serde_json::json;

    fn tenant() -> Namespace {
        Namespace::Tenant(TenantId::new("acme").expect("tenant"))
    }

    fn record(value: serde_json::Value) -> Record {
        Record::from_json(value).expect("record")
    }

    #[tokio::test]
    async fn tenant_schema_must_exist() {
        let remote = SchemaRemote::new();
        let err = remote
            .select(&tenant(), "todos", &Query::select())
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);

        remote
            .execute_statement(&create_schema_sql(&tenant()))
            .await
            .expect("schema");
        assert!(remote.has_schema("tenant_acme"));
        assert!(remote.select(&tenant(), "todos", &Query::select()).await.is_ok());
    }

    #[tokio::test]
    async fn ddl_declares_columns() {
        let remote = SchemaRemote::new();
        let def = TableDef::new(
            "todos",
            vec![
                ColumnDef::new("title", ColumnType::Text),
                ColumnDef::new("done", ColumnType::Boolean).default_sql("false"),
            ],
        )
        .expect("def");
        remote
            .execute_statement(&create_schema_sql(&tenant()))
            .await
            .expect("schema");
        remote
            .execute_statement(&create_table_sql(&tenant(), &def))
            .await
            .expect("table");

        let columns = remote.columns(&tenant(), "todos").expect("declared");
        assert!(columns.contains(&"title".to_string()));
        assert!(columns.contains(&"done".to_string()));
        assert!(columns.contains(&"created_at".to_string()));
    }

    #[tokio::test]
    async fn declared_tables_reject_unknown_columns() {
        let remote = SchemaRemote::new();
        remote.declare_table(&tenant(), "todos", &["title"]);

        let err = remote
            .insert(
                &tenant(),
                "todos",
                &Query::insert(record(json!({"title": "a", "color": "red"}))),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.kind,
            RemoteErrorKind::UnknownColumn {
                column: Some("color".into())
            }
        );
        assert_eq!(err.code.as_deref(), Some("PGRST204"));
        assert_eq!(remote.writes_to("todos").len(), 1);
    }

    #[tokio::test]
    async fn non_integer_ids_are_type_mismatches() {
        let remote = SchemaRemote::new();
        let err = remote
            .insert(
                &Namespace::Global,
                "projects",
                &Query::insert(record(json!({"id": "proj-1"}))),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::TypeMismatch);
        assert!(err.message.contains("\"proj-1\""));
    }

    #[tokio::test]
    async fn failure_injection() {
        let remote = SchemaRemote::new();
        remote.fail_method(Method::Select, RemoteError::transient("timeout"));
        assert!(remote.select(&Namespace::Global, "projects", &Query::select()).await.is_err());
        assert!(
            remote
                .insert(&Namespace::Global, "projects", &Query::insert(record(json!({"a": 1}))))
                .await
                .is_ok()
        );

        remote.clear_failures();
        remote.fail_all(RemoteError::transient("down"));
        assert!(remote.execute_statement("CREATE SCHEMA IF NOT EXISTS \"x\"").await.is_err());
    }
}

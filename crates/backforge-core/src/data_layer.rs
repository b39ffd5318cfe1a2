//! The data layer: single entry point for generated resources and internal
//! bookkeeping.
//!
//! Every record operation follows the same cascade:
//!
//! 1. resolve placement with the [`TenantRouter`];
//! 2. try the remote backend;
//! 3. on a healable write error, repair the query and retry exactly once;
//! 4. on any remaining failure (or no remote at all), run the same query
//!    against the [`FallbackStore`] and return its rows as if nothing failed.
//!
//! Only [`Error::UnsupportedMethod`], invalid identifiers, and the case where
//! both backends fail ever reach the caller.
//!
//! Schema setup never returns an error. It reports a [`SchemaOutcome`] that
//! says whether the remote backend took the change or only the fallback did.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use crate::config::{Config, DataConfig};
use crate::error::{Error, RemoteError, RemoteErrorKind, RemoteResult, Result};
use crate::fallback::FallbackStore;
use crate::healing::{HealingPolicy, IdentifierPolicy};
use crate::metrics;
use crate::observability::{query_span, schema_span};
use crate::query::{Direction, Method, Query};
use crate::record::{CREATED_AT_COLUMN, Record};
use crate::remote::{PostgrestClient, RemoteBackend};
use crate::schema::{
    ColumnDef, Relationship, RelationshipKind, TableDef, add_column_sql, create_table_sql,
    relationship_sql, validate_identifier,
};
use crate::tenant::{Namespace, TenantId, TenantRouter};

/// Bookkeeping table of generated projects.
pub const PROJECTS_TABLE: &str = "projects";

/// Bookkeeping table of deployments.
pub const DEPLOYMENTS_TABLE: &str = "deployments";

/// Result of a schema setup operation.
///
/// `success` means the table (or namespace) is usable. When the remote
/// backend refused the change but the fallback store took it, `success` is
/// true, `is_fallback` is true and `message` carries the remote error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaOutcome {
    /// The object is usable.
    pub success: bool,
    /// Only the fallback store holds the change.
    pub is_fallback: bool,
    /// Namespace the change applies to.
    pub namespace: String,
    /// Remote error or validation failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SchemaOutcome {
    fn remote(namespace: &Namespace) -> Self {
        Self {
            success: true,
            is_fallback: false,
            namespace: namespace.schema_name(),
            message: None,
        }
    }

    fn fallback(namespace: &Namespace, cause: &RemoteError) -> Self {
        Self {
            success: true,
            is_fallback: true,
            namespace: namespace.schema_name(),
            message: Some(cause.to_string()),
        }
    }

    fn failed(namespace: &Namespace, error: &Error) -> Self {
        Self {
            success: false,
            is_fallback: false,
            namespace: namespace.schema_name(),
            message: Some(error.to_string()),
        }
    }

    fn label(&self) -> &'static str {
        match (self.success, self.is_fallback) {
            (false, _) => "failed",
            (true, true) => "fallback",
            (true, false) => "remote",
        }
    }
}

/// Resilient multi-tenant data access over a remote backend and a fallback
/// store.
pub struct DataLayer {
    remote: Option<Arc<dyn RemoteBackend>>,
    fallback: Arc<FallbackStore>,
    router: TenantRouter,
    healing: HealingPolicy,
    config: DataConfig,
}

impl std::fmt::Debug for DataLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLayer")
            .field("remote_configured", &self.remote.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DataLayer {
    /// Creates a data layer. `remote: None` serves everything from the
    /// fallback store.
    #[must_use]
    pub fn new(
        remote: Option<Arc<dyn RemoteBackend>>,
        fallback: Arc<FallbackStore>,
        config: DataConfig,
    ) -> Self {
        let healing = HealingPolicy::new(IdentifierPolicy::new(config.label_column.clone()));
        Self {
            remote,
            fallback,
            router: TenantRouter::new(),
            healing,
            config,
        }
    }

    /// Builds a data layer from configuration, with a fresh fallback store.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote client cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let remote = match &config.remote {
            Some(remote) => {
                let settings = remote
                    .postgrest()
                    .with_page_size(config.data.default_page_size);
                let client: Arc<dyn RemoteBackend> = Arc::new(PostgrestClient::new(&settings)?);
                Some(client)
            }
            None => None,
        };
        let fallback = Arc::new(FallbackStore::with_page_size(
            config.data.default_page_size,
        ));
        Ok(Self::new(remote, fallback, config.data.clone()))
    }

    /// The fallback store.
    #[must_use]
    pub fn fallback(&self) -> &Arc<FallbackStore> {
        &self.fallback
    }

    /// The tenant router.
    #[must_use]
    pub fn router(&self) -> &TenantRouter {
        &self.router
    }

    /// Returns true if a remote backend is configured.
    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    // === Records ===

    /// Runs a query against `table` for `tenant`.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidId` for invalid table or column names
    /// - `Error::InvalidInput` for writes without a payload
    /// - `Error::Remote` with the original remote error when the fallback
    ///   store also fails
    pub async fn query(
        &self,
        table: &str,
        query: Query,
        tenant: Option<&TenantId>,
    ) -> Result<Vec<Record>> {
        validate_identifier(table, "table name")?;
        for condition in query.filter.iter() {
            validate_identifier(&condition.column, "filter column")?;
        }
        if let Some(order) = &query.order_by {
            validate_identifier(&order.column, "order column")?;
        }
        if query.method.is_write() {
            query.payload()?;
        }

        let query = self.normalize(query);
        let placement = self.router.resolve(table, tenant);
        let namespace = placement.namespace;
        let span = query_span(query.method.as_str(), table, &namespace.schema_name());

        async {
            match self.try_remote(&namespace, table, &query).await {
                Ok(rows) => Ok(rows),
                Err(err) => self.fall_back(&namespace, table, &query, err),
            }
        }
        .instrument(span)
        .await
    }

    /// Runs a query given as a loose options object
    /// (`{method, where, data, orderBy, limit, offset}`).
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedMethod` immediately for unknown verbs;
    /// otherwise as [`DataLayer::query`].
    pub async fn query_options(
        &self,
        table: &str,
        options: &Value,
        tenant: Option<&TenantId>,
    ) -> Result<Vec<Record>> {
        let query = Query::from_options(options)?;
        self.query(table, query, tenant).await
    }

    fn normalize(&self, mut query: Query) -> Query {
        if query.method == Method::Select && query.offset.is_some() && query.limit.is_none() {
            query.limit = Some(self.config.default_page_size);
        }
        query
    }

    async fn try_remote(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>> {
        let remote = self.remote.as_deref().ok_or_else(RemoteError::unavailable)?;

        if let Err(err) = self.router.ensure_namespace(remote, namespace).await {
            // The namespace may exist already; let the operation itself decide.
            tracing::warn!(error = %err, "could not ensure namespace");
        }

        let err = match Self::call(remote, namespace, table, query).await {
            Ok(rows) => return Ok(rows),
            Err(err) => err,
        };

        let Some(heal) = self.healing.heal(query, &err) else {
            return Err(err);
        };

        let kind = heal.kind.label();
        tracing::info!(heal = kind, error = %err, "retrying remote write after repair");
        match Self::call(remote, namespace, table, &heal.query).await {
            Ok(rows) => {
                metrics::record_heal(kind, true);
                Ok(rows)
            }
            Err(retry_err) => {
                metrics::record_heal(kind, false);
                tracing::warn!(heal = kind, error = %retry_err, "repaired write failed");
                Err(retry_err)
            }
        }
    }

    async fn call(
        remote: &dyn RemoteBackend,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>> {
        let started = Instant::now();
        let result = remote.execute(namespace, table, query).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind.label(),
        };
        metrics::record_remote(
            query.method.as_str(),
            outcome,
            started.elapsed().as_secs_f64(),
        );
        result
    }

    fn fall_back(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
        cause: RemoteError,
    ) -> Result<Vec<Record>> {
        let reason = cause.kind.label();
        if cause.kind == RemoteErrorKind::Unavailable {
            tracing::debug!("remote not configured, serving from fallback store");
        } else {
            tracing::warn!(error = %cause, "remote path unusable, serving from fallback store");
        }
        metrics::record_fallback(query.method.as_str(), reason);

        self.fallback
            .execute(namespace, table, query)
            .map_err(|fallback_err| {
                tracing::error!(
                    remote_error = %cause,
                    fallback_error = %fallback_err,
                    "both backends failed"
                );
                Error::Remote(cause)
            })
    }

    // === Schema ===

    /// Ensures a tenant's namespace exists.
    pub async fn create_namespace(&self, tenant: &TenantId) -> SchemaOutcome {
        let namespace = Namespace::Tenant(tenant.clone());
        let span = schema_span("create_namespace", "", &namespace.schema_name());

        let outcome = async {
            match self.remote.as_deref() {
                None => SchemaOutcome::fallback(&namespace, &RemoteError::unavailable()),
                Some(remote) => match self.router.ensure_namespace(remote, &namespace).await {
                    Ok(()) => SchemaOutcome::remote(&namespace),
                    Err(err) => {
                        tracing::warn!(error = %err, "namespace creation failed");
                        SchemaOutcome::fallback(&namespace, &err)
                    }
                },
            }
        }
        .instrument(span)
        .await;

        metrics::record_schema_op("create_namespace", outcome.label());
        outcome
    }

    /// Creates a table (idempotent).
    ///
    /// The definition is always recorded in the fallback store; the remote
    /// backend gets `CREATE TABLE IF NOT EXISTS`.
    pub async fn create_table(
        &self,
        table: &str,
        columns: Vec<ColumnDef>,
        tenant: Option<&TenantId>,
    ) -> SchemaOutcome {
        let namespace = self.router.resolve(table, tenant).namespace;
        let span = schema_span("create_table", table, &namespace.schema_name());

        let outcome = async {
            let definition = match TableDef::new(table, columns) {
                Ok(definition) => definition,
                Err(err) => return SchemaOutcome::failed(&namespace, &err),
            };
            let statement = create_table_sql(&namespace, &definition);
            if let Err(err) = self.fallback.define_table(&namespace, definition) {
                return SchemaOutcome::failed(&namespace, &err);
            }
            self.run_ddl(&namespace, &[statement]).await
        }
        .instrument(span)
        .await;

        metrics::record_schema_op("create_table", outcome.label());
        outcome
    }

    /// Adds a column to an existing table (additive only).
    pub async fn add_column(
        &self,
        table: &str,
        column: ColumnDef,
        tenant: Option<&TenantId>,
    ) -> SchemaOutcome {
        let namespace = self.router.resolve(table, tenant).namespace;
        let span = schema_span("add_column", table, &namespace.schema_name());

        let outcome = async {
            if let Err(err) =
                validate_identifier(table, "table name").and_then(|()| column.validate())
            {
                return SchemaOutcome::failed(&namespace, &err);
            }
            let statement = add_column_sql(&namespace, table, &column);
            if let Err(err) = self.mirror_column(&namespace, table, column) {
                return SchemaOutcome::failed(&namespace, &err);
            }
            self.run_ddl(&namespace, &[statement]).await
        }
        .instrument(span)
        .await;

        metrics::record_schema_op("add_column", outcome.label());
        outcome
    }

    /// Creates a relationship between two tables of the same namespace.
    ///
    /// Missing columns default to `<table>_id` on the owning side and `id` on
    /// the referenced side. Many-to-many creates a junction table.
    pub async fn create_relationship(
        &self,
        source_table: &str,
        target_table: &str,
        kind: RelationshipKind,
        source_column: Option<&str>,
        target_column: Option<&str>,
        tenant: Option<&TenantId>,
    ) -> SchemaOutcome {
        let namespace = self.router.resolve(source_table, tenant).namespace;
        let span = schema_span("create_relationship", source_table, &namespace.schema_name());

        let outcome = async {
            let relationship = match Relationship::new(
                source_table,
                target_table,
                kind,
                source_column,
                target_column,
            ) {
                Ok(relationship) => relationship,
                Err(err) => return SchemaOutcome::failed(&namespace, &err),
            };
            let statements = relationship_sql(&namespace, &relationship);
            if let Err(err) = self.mirror_relationship(&namespace, relationship) {
                return SchemaOutcome::failed(&namespace, &err);
            }
            self.run_ddl(&namespace, &statements).await
        }
        .instrument(span)
        .await;

        metrics::record_schema_op("create_relationship", outcome.label());
        outcome
    }

    fn mirror_column(&self, namespace: &Namespace, table: &str, column: ColumnDef) -> Result<()> {
        if self.fallback.table(namespace, table)?.is_none() {
            // Known only remotely so far; start a definition around the column.
            return self
                .fallback
                .define_table(namespace, TableDef::new(table, vec![column])?);
        }
        self.fallback.add_column(namespace, table, column).map(|_| ())
    }

    fn mirror_relationship(&self, namespace: &Namespace, relationship: Relationship) -> Result<()> {
        for table in [&relationship.source_table, &relationship.target_table] {
            if self.fallback.table(namespace, table)?.is_none() {
                self.fallback
                    .define_table(namespace, TableDef::new(table, Vec::new())?)?;
            }
        }
        if relationship.kind == RelationshipKind::ManyToMany {
            self.fallback
                .define_table(namespace, relationship.junction_definition()?)?;
        }
        self.fallback.add_relationship(namespace, relationship)
    }

    /// Runs statements in order; "already exists" counts as success.
    async fn run_ddl(&self, namespace: &Namespace, statements: &[String]) -> SchemaOutcome {
        let Some(remote) = self.remote.as_deref() else {
            return SchemaOutcome::fallback(namespace, &RemoteError::unavailable());
        };

        if let Err(err) = self.router.ensure_namespace(remote, namespace).await {
            tracing::warn!(error = %err, "namespace unavailable, schema kept in fallback store");
            return SchemaOutcome::fallback(namespace, &err);
        }

        for statement in statements {
            match remote.execute_statement(statement).await {
                Ok(()) => {}
                Err(err) if err.is_already_exists() => {
                    tracing::debug!(statement = %statement, "already exists");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "remote DDL failed, schema kept in fallback store");
                    return SchemaOutcome::fallback(namespace, &err);
                }
            }
        }
        SchemaOutcome::remote(namespace)
    }

    // === Bookkeeping ===

    /// Records a generated project in the global `projects` table.
    ///
    /// # Errors
    ///
    /// As [`DataLayer::query`].
    pub async fn record_project(&self, project: Record) -> Result<Record> {
        let rows = self
            .query(PROJECTS_TABLE, Query::insert(project), None)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::Internal {
                message: "insert returned no rows".into(),
            })
    }

    /// Records a deployment of `project_id` in the global `deployments` table.
    ///
    /// # Errors
    ///
    /// As [`DataLayer::query`].
    pub async fn record_deployment(
        &self,
        project_id: impl Into<Value>,
        mut deployment: Record,
    ) -> Result<Record> {
        deployment.insert("project_id", project_id);
        let rows = self
            .query(DEPLOYMENTS_TABLE, Query::insert(deployment), None)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::Internal {
                message: "insert returned no rows".into(),
            })
    }

    /// Deployments of a project, newest first.
    ///
    /// # Errors
    ///
    /// As [`DataLayer::query`].
    pub async fn deployments_for(&self, project_id: impl Into<Value>) -> Result<Vec<Record>> {
        let query = Query::select()
            .filter("project_id", project_id)
            .order_by(CREATED_AT_COLUMN, Direction::Desc);
        self.query(DEPLOYMENTS_TABLE, query, None).await
    }
}

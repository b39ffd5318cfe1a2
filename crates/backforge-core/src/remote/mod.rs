//! Remote backend abstraction.
//!
//! The remote backend is a PostgREST-compatible store: per-table CRUD with
//! equality filters, plus a raw statement endpoint used only for DDL.
//! [`PostgrestClient`] is the production implementation; tests substitute
//! in-process fakes.

mod postgrest;

pub use postgrest::{PostgrestClient, PostgrestConfig, classify_error};

use async_trait::async_trait;

use crate::error::RemoteResult;
use crate::query::{Method, Query};
use crate::record::Record;
use crate::tenant::Namespace;

/// Remote backend contract.
///
/// Every data method receives the resolved namespace and the table name and
/// returns the affected rows. Implementations classify their failures into
/// [`RemoteErrorKind`](crate::error::RemoteErrorKind) so callers can heal or
/// fall back.
#[async_trait]
pub trait RemoteBackend: Send + Sync + 'static {
    /// Selects rows matching the query filter, ordered and windowed.
    async fn select(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>>;

    /// Inserts the query payload and returns the created rows.
    async fn insert(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>>;

    /// Merges the payload into rows matching the filter and returns them.
    ///
    /// Matching zero rows is not an error.
    async fn update(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>>;

    /// Deletes rows matching the filter and returns them.
    async fn delete(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>>;

    /// Executes a raw DDL statement.
    async fn execute_statement(&self, sql: &str) -> RemoteResult<()>;

    /// Dispatches on the query method.
    async fn execute(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>> {
        match query.method {
            Method::Select => self.select(namespace, table, query).await,
            Method::Insert => self.insert(namespace, table, query).await,
            Method::Update => self.update(namespace, table, query).await,
            Method::Delete => self.delete(namespace, table, query).await,
        }
    }
}

//! Pre-built test fixtures for common test scenarios.
//!
//! Provides factory functions to create data layers and records with sensible
//! defaults.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use backforge_core::config::DataConfig;
use backforge_core::data_layer::DataLayer;
use backforge_core::error::RemoteError;
use backforge_core::fallback::FallbackStore;
use backforge_core::record::Record;
use backforge_core::remote::RemoteBackend;
use backforge_core::tenant::{Namespace, TenantId};
use serde_json::Value;

use crate::remote::SchemaRemote;

static NEXT_TENANT: AtomicU64 = AtomicU64::new(1);

/// Test context: a data layer wired to a shared [`SchemaRemote`] and a
/// unique tenant.
pub struct TestContext {
    /// Handle on the remote backend the layer talks to.
    pub remote: SchemaRemote,
    /// Fallback store shared with the layer.
    pub fallback: Arc<FallbackStore>,
    /// Data layer under test.
    pub layer: DataLayer,
    /// Tenant identifier.
    pub tenant: TenantId,
}

impl TestContext {
    /// Creates a context with a healthy remote and a fresh tenant.
    #[must_use]
    pub fn new() -> Self {
        Self::build(Some(SchemaRemote::new()), DataConfig::default())
    }

    /// Creates a context with custom data settings.
    #[must_use]
    pub fn with_config(config: DataConfig) -> Self {
        Self::build(Some(SchemaRemote::new()), config)
    }

    /// Creates a context whose remote fails every call with `error`.
    #[must_use]
    pub fn broken(error: RemoteError) -> Self {
        let remote = SchemaRemote::new();
        remote.fail_all(error);
        Self::build(Some(remote), DataConfig::default())
    }

    /// Creates a context without a remote backend.
    ///
    /// `remote` is still present but never called.
    #[must_use]
    pub fn offline() -> Self {
        Self::build(None, DataConfig::default())
    }

    fn build(remote: Option<SchemaRemote>, config: DataConfig) -> Self {
        let handle = remote.clone().unwrap_or_default();
        let backend = remote.map(|r| Arc::new(r) as Arc<dyn RemoteBackend>);
        let fallback = Arc::new(FallbackStore::with_page_size(config.default_page_size));
        let layer = DataLayer::new(backend, Arc::clone(&fallback), config);
        Self {
            remote: handle,
            fallback,
            layer,
            tenant: unique_tenant(),
        }
    }

    /// The tenant's namespace.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        Namespace::Tenant(self.tenant.clone())
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a tenant id not used by any other test in this process.
#[must_use]
pub fn unique_tenant() -> TenantId {
    let n = NEXT_TENANT.fetch_add(1, Ordering::Relaxed);
    TenantId::new(format!("test-tenant-{n}")).expect("valid tenant id")
}

/// Builds a record from a JSON object literal.
#[must_use]
pub fn record(value: Value) -> Record {
    Record::from_json(value).expect("JSON object")
}

/// Column values of `rows`, in row order.
#[must_use]
pub fn column_values(rows: &[Record], column: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
        .collect()
}

//! Multi-tenant isolation primitives.
//!
//! Tenant isolation is enforced by placement: every table a tenant owns lives
//! in a private namespace, used both as the remote schema qualifier and as the
//! fallback store partition key. Only the bookkeeping tables in
//! [`GLOBAL_TABLES`] are shared.
//!
//! # Example
//!
//! ```rust
//! use backforge_core::tenant::{TenantId, TenantRouter};
//!
//! let tenant = TenantId::new("Proj-42").unwrap();
//! assert_eq!(tenant.as_str(), "proj-42");
//! let router = TenantRouter::new();
//!
//! let placement = router.resolve("todos", Some(&tenant));
//! assert_eq!(placement.namespace.schema_name(), "tenant_proj_h42");
//! assert!(!placement.is_global);
//!
//! let placement = router.resolve("projects", Some(&tenant));
//! assert_eq!(placement.namespace.schema_name(), "public");
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, RemoteResult, Result};
use crate::remote::RemoteBackend;
use crate::schema::{MAX_IDENTIFIER_LEN, create_schema_sql};

/// Tables shared by every tenant.
pub const GLOBAL_TABLES: [&str; 2] = ["projects", "deployments"];

/// Remote schema used for the global namespace.
pub const GLOBAL_SCHEMA: &str = "public";

/// Prefix of tenant namespaces.
pub const TENANT_SCHEMA_PREFIX: &str = "tenant_";

/// Returns true if `table` is one of the shared bookkeeping tables.
#[must_use]
pub fn is_global_table(table: &str) -> bool {
    GLOBAL_TABLES.contains(&table)
}

/// A unique identifier for a tenant (a generated project's id).
///
/// Tenant IDs must be:
/// - Non-empty and at most 48 characters
/// - ASCII alphanumeric, `-` or `_`
/// - Short enough that the encoded namespace fits in 63 characters
///
/// Letters are folded to lowercase on construction, so `Acme` and `acme`
/// are the same tenant. Distinct ids always map to distinct namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Creates a new tenant ID after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant ID is invalid.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into().to_ascii_lowercase();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Returns the tenant ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the private namespace name, `tenant_<encoded id>`.
    ///
    /// `_` is written as `__` and `-` as `_h`, so the mapping is injective:
    /// `shop-1` and `shop_1` get different namespaces.
    #[must_use]
    pub fn schema_name(&self) -> String {
        format!("{TENANT_SCHEMA_PREFIX}{}", encode_schema_suffix(&self.0))
    }

    fn validate(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::invalid_id("tenant ID cannot be empty"));
        }

        if id.len() > 48 {
            return Err(Error::invalid_id(format!(
                "tenant ID '{id}' is too long (maximum 48 characters)"
            )));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::invalid_id(format!(
                "tenant ID '{id}' contains invalid characters (allowed: letters, digits, '-', '_')"
            )));
        }

        let schema_len = TENANT_SCHEMA_PREFIX.len() + encode_schema_suffix(id).len();
        if schema_len > MAX_IDENTIFIER_LEN {
            return Err(Error::invalid_id(format!(
                "tenant ID '{id}' has too many '-' or '_' (namespace would exceed {MAX_IDENTIFIER_LEN} characters)"
            )));
        }

        Ok(())
    }
}

fn encode_schema_suffix(id: &str) -> String {
    let mut out = String::with_capacity(id.len() * 2);
    for c in id.chars() {
        match c {
            '_' => out.push_str("__"),
            '-' => out.push_str("_h"),
            c => out.push(c),
        }
    }
    out
}

impl TryFrom<String> for TenantId {
    type Error = Error;

    fn try_from(id: String) -> Result<Self> {
        Self::new(id)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Physical grouping of tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// The shared namespace holding the bookkeeping tables.
    Global,
    /// A tenant-private namespace.
    Tenant(TenantId),
}

impl Namespace {
    /// Remote schema name, also used as the fallback partition key.
    #[must_use]
    pub fn schema_name(&self) -> String {
        match self {
            Self::Global => GLOBAL_SCHEMA.to_string(),
            Self::Tenant(tenant) => tenant.schema_name(),
        }
    }

    /// Returns true for the global namespace.
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.schema_name())
    }
}

/// Where a (table, tenant) pair lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Resolved namespace.
    pub namespace: Namespace,
    /// True when the table is shared across tenants.
    pub is_global: bool,
}

/// Maps tables to namespaces and makes sure tenant namespaces exist remotely.
#[derive(Debug, Default)]
pub struct TenantRouter {
    ensured: Mutex<HashSet<String>>,
}

impl TenantRouter {
    /// Creates a router with an empty namespace cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the placement of `table` for `tenant`.
    ///
    /// Global tables and tenant-less calls resolve to [`Namespace::Global`].
    #[must_use]
    pub fn resolve(&self, table: &str, tenant: Option<&TenantId>) -> Placement {
        match tenant {
            Some(tenant) if !is_global_table(table) => Placement {
                namespace: Namespace::Tenant(tenant.clone()),
                is_global: false,
            },
            _ => Placement {
                namespace: Namespace::Global,
                is_global: true,
            },
        }
    }

    /// Ensures `namespace` exists in the remote backend.
    ///
    /// Issues `CREATE SCHEMA IF NOT EXISTS` the first time a namespace is seen
    /// and remembers success; "already exists" counts as success. Failures are
    /// not remembered, so the next call retries.
    ///
    /// # Errors
    ///
    /// Returns the remote error if the statement fails for any other reason.
    pub async fn ensure_namespace(
        &self,
        remote: &dyn RemoteBackend,
        namespace: &Namespace,
    ) -> RemoteResult<()> {
        if namespace.is_global() {
            return Ok(());
        }

        let schema = namespace.schema_name();
        if self.is_ensured(&schema) {
            return Ok(());
        }

        match remote.execute_statement(&create_schema_sql(namespace)).await {
            Ok(()) => {}
            Err(err) if err.is_already_exists() => {}
            Err(err) => return Err(err),
        }

        tracing::debug!(namespace = %schema, "namespace ensured");
        if let Ok(mut ensured) = self.ensured.lock() {
            ensured.insert(schema);
        }
        Ok(())
    }

    /// Returns true if the namespace was already ensured by this router.
    #[must_use]
    pub fn is_ensured(&self, schema: &str) -> bool {
        self.ensured
            .lock()
            .map(|ensured| ensured.contains(schema))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_tenant_ids() {
        assert!(TenantId::new("acme-corp").is_ok());
        assert!(TenantId::new("42").is_ok());
        assert!(TenantId::new("3f2b9c1e-8d4a-4e7b-9a1c-0f6e5d4c3b2a").is_ok());
        assert!(TenantId::new("Proj_7").is_ok());
    }

    #[test]
    fn invalid_tenant_ids() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("has spaces").is_err());
        assert!(TenantId::new("semi;colon").is_err());
        assert!(TenantId::new("quote\"d").is_err());
        assert!(TenantId::new("a".repeat(49)).is_err());
    }

    #[test]
    fn schema_name_is_sql_safe() {
        let tenant = TenantId::new("3F2B-9c1e").unwrap();
        assert_eq!(tenant.schema_name(), "tenant_3f2b_h9c1e");
        assert!(crate::schema::validate_identifier(&tenant.schema_name(), "schema").is_ok());
    }

    #[test]
    fn case_is_folded_into_one_identity() {
        let upper = TenantId::new("A").unwrap();
        let lower = TenantId::new("a").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "a");
        assert_eq!(upper.schema_name(), lower.schema_name());
    }

    #[test]
    fn hyphen_and_underscore_get_distinct_namespaces() {
        let pairs = [("a-b", "a_b"), ("shop-1", "shop_1"), ("a_h", "a-"), ("a__", "a_-")];
        for (left, right) in pairs {
            let left = TenantId::new(left).unwrap();
            let right = TenantId::new(right).unwrap();
            assert_ne!(left, right);
            assert_ne!(left.schema_name(), right.schema_name(), "{left} vs {right}");
        }
    }

    #[test]
    fn uuid_tenants_fit_the_identifier_limit() {
        let tenant = TenantId::new("3f2b9c1e-8d4a-4e7b-9a1c-0f6e5d4c3b2a").unwrap();
        assert!(tenant.schema_name().len() <= MAX_IDENTIFIER_LEN);
        assert!(TenantId::new("_".repeat(40)).is_err());
    }

    #[test]
    fn deserialization_validates_and_folds() {
        let tenant: TenantId = serde_json::from_str("\"Acme\"").unwrap();
        assert_eq!(tenant.as_str(), "acme");
        assert!(serde_json::from_str::<TenantId>("\"semi;colon\"").is_err());
    }

    #[test]
    fn global_tables_ignore_tenant() {
        let router = TenantRouter::new();
        let tenant = TenantId::new("acme").unwrap();

        for table in GLOBAL_TABLES {
            let placement = router.resolve(table, Some(&tenant));
            assert_eq!(placement.namespace, Namespace::Global);
            assert!(placement.is_global);
        }
    }

    #[test]
    fn tenant_less_calls_resolve_globally() {
        let router = TenantRouter::new();
        let placement = router.resolve("todos", None);
        assert_eq!(placement.namespace.schema_name(), GLOBAL_SCHEMA);
    }

    #[test]
    fn distinct_tenants_get_distinct_namespaces() {
        let router = TenantRouter::new();
        let a = TenantId::new("tenant-a").unwrap();
        let b = TenantId::new("tenant-b").unwrap();
        assert_ne!(
            router.resolve("todos", Some(&a)).namespace,
            router.resolve("todos", Some(&b)).namespace
        );
    }
}

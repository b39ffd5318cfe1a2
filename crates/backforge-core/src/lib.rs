//! # backforge-core
//!
//! Resilient multi-tenant data access for generated REST backends.
//!
//! Generated route handlers call one entry point, [`DataLayer`], and get rows
//! back no matter what state the remote database is in:
//!
//! - **Tenant Router**: maps tables to a per-tenant namespace or the shared
//!   global namespace, and makes sure tenant namespaces exist
//! - **Remote Executor**: PostgREST-compatible HTTP client with error
//!   classification
//! - **Self-Healing**: repairs unknown-column and identifier-type write errors
//!   and retries once
//! - **Fallback Store**: in-process store serving every operation the remote
//!   cannot
//! - **Schema Setup**: idempotent namespace, table, column and relationship
//!   creation that reports fallback instead of failing
//!
//! ## Example
//!
//! ```rust
//! use backforge_core::prelude::*;
//!
//! let router = TenantRouter::new();
//! let tenant = TenantId::new("acme-corp")?;
//!
//! let todos = router.resolve("todos", Some(&tenant));
//! assert_eq!(todos.namespace.schema_name(), "tenant_acme_hcorp");
//!
//! let projects = router.resolve("projects", Some(&tenant));
//! assert!(projects.is_global);
//! # Ok::<(), backforge_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod data_layer;
pub mod error;
pub mod fallback;
pub mod healing;
pub mod metrics;
pub mod observability;
pub mod query;
pub mod record;
pub mod remote;
pub mod schema;
pub mod tenant;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use backforge_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{Config, DataConfig, RemoteConfig};
    pub use crate::data_layer::{DataLayer, SchemaOutcome};
    pub use crate::error::{Error, RemoteError, RemoteErrorKind, RemoteResult, Result};
    pub use crate::fallback::FallbackStore;
    pub use crate::query::{Direction, Filter, Method, OrderBy, Payload, Query};
    pub use crate::record::Record;
    pub use crate::remote::{PostgrestClient, PostgrestConfig, RemoteBackend};
    pub use crate::schema::{ColumnDef, ColumnType, Relationship, RelationshipKind, TableDef};
    pub use crate::tenant::{Namespace, Placement, TenantId, TenantRouter};
}

// Re-export key types at crate root for ergonomics
pub use config::{Config, DataConfig, RemoteConfig};
pub use data_layer::{DataLayer, SchemaOutcome};
pub use error::{Error, RemoteError, RemoteErrorKind, RemoteResult, Result};
pub use fallback::FallbackStore;
pub use observability::{LogFormat, init_logging};
pub use query::{Direction, Filter, Method, Query};
pub use record::Record;
pub use remote::{PostgrestClient, PostgrestConfig, RemoteBackend};
pub use schema::{ColumnDef, ColumnType, RelationshipKind};
pub use tenant::{Namespace, TenantId, TenantRouter};

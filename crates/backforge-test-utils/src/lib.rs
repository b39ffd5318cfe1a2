//! Shared test utilities for backforge integration tests.
//!
//! This crate provides:
//! - [`SchemaRemote`]: In-memory remote backend with schema enforcement,
//!   failure injection and operation recording
//! - [`TestContext`]: Data layer wired to a `SchemaRemote` and a fresh tenant
//! - Factory functions for creating test records
//!
//! # Example
//!
//! ```rust,ignore
//! use backforge_test_utils::{TestContext, record};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let ctx = TestContext::new();
//!     ctx.layer
//!         .query("todos", Query::insert(record(json!({"title": "a"}))), Some(&ctx.tenant))
//!         .await
//!         .unwrap();
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod fixtures;
pub mod remote;

pub use fixtures::*;
pub use remote::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("backforge_core=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

//! Logging initialization and span helpers.
//!
//! Every data layer operation runs inside a [`query_span`] or
//! [`schema_span`], so remote attempts, heals and fallbacks carry the table
//! and namespace they concern.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops. Logs are written to stderr.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `backforge_core=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init(),
        };
        // Another subscriber may already be installed by the host.
        let _ = result;
    });
}

/// Creates a span for a record-level operation.
#[must_use]
pub fn query_span(op: &str, table: &str, namespace: &str) -> Span {
    tracing::info_span!("query", op = op, table = table, namespace = namespace)
}

/// Creates a span for a schema setup operation.
#[must_use]
pub fn schema_span(op: &str, table: &str, namespace: &str) -> Span {
    tracing::info_span!("schema", op = op, table = table, namespace = namespace)
}

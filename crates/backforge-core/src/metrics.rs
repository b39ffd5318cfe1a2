//! Data layer metrics.
//!
//! Counters for remote calls, healing retries, fallbacks and schema setup.
//! They complement the structured logs emitted on every path change.
//! Recording is a no-op until the host process installs a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram};

// ============================================================================
// Metric Names
// ============================================================================

/// Remote backend calls by operation and outcome.
pub const REMOTE_REQUESTS: &str = "backforge_remote_requests_total";

/// Remote backend call duration histogram.
pub const REMOTE_DURATION: &str = "backforge_remote_duration_seconds";

/// Healing retries by repair kind and outcome.
pub const HEAL_ATTEMPTS: &str = "backforge_heal_attempts_total";

/// Operations served by the fallback store, by reason.
pub const FALLBACKS: &str = "backforge_fallback_total";

/// Schema setup operations by outcome.
pub const SCHEMA_OPS: &str = "backforge_schema_ops_total";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all metric descriptions.
///
/// Call this once at startup after installing a metrics recorder.
pub fn register_metrics() {
    describe_counter!(REMOTE_REQUESTS, "Total remote backend calls");
    describe_histogram!(REMOTE_DURATION, "Duration of remote backend calls in seconds");
    describe_counter!(HEAL_ATTEMPTS, "Total healing retries against the remote backend");
    describe_counter!(FALLBACKS, "Total operations served by the fallback store");
    describe_counter!(SCHEMA_OPS, "Total schema setup operations");
}

// ============================================================================
// Recording
// ============================================================================

/// Records a remote call.
pub fn record_remote(op: &str, outcome: &str, duration_secs: f64) {
    let labels = [("op", op.to_string()), ("outcome", outcome.to_string())];
    counter!(REMOTE_REQUESTS, &labels).increment(1);
    histogram!(REMOTE_DURATION, "op" => op.to_string()).record(duration_secs);
}

/// Records a healing retry.
pub fn record_heal(kind: &str, succeeded: bool) {
    let outcome = if succeeded { "healed" } else { "failed" };
    counter!(HEAL_ATTEMPTS, "kind" => kind.to_string(), "outcome" => outcome).increment(1);
}

/// Records an operation served by the fallback store.
pub fn record_fallback(op: &str, reason: &str) {
    counter!(FALLBACKS, "op" => op.to_string(), "reason" => reason.to_string()).increment(1);
}

/// Records a schema setup operation.
pub fn record_schema_op(op: &str, outcome: &str) {
    counter!(SCHEMA_OPS, "op" => op.to_string(), "outcome" => outcome.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_noop() {
        register_metrics();
        record_remote("select", "ok", 0.01);
        record_heal("drop_column", true);
        record_fallback("insert", "transient");
        record_schema_op("create_table", "fallback");
    }
}

//! Self-healing repairs for remote write failures.
//!
//! The remote schema drifts from what generated code sends: payloads carry
//! columns the table never got, or identifiers that are not integers. For two
//! recognised errors a write can be repaired and retried once:
//!
//! - [`RemoteErrorKind::UnknownColumn`]: the offending column is dropped from
//!   every payload record.
//! - [`RemoteErrorKind::TypeMismatch`] on the identifier: a non-numeric `id`
//!   is normalised by [`IdentifierPolicy`].
//!
//! The policy only produces the repaired query. Retrying (at most once) is
//! the data layer's job.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde_json::Value;

use crate::error::{RemoteError, RemoteErrorKind};
use crate::query::{Method, Query};
use crate::record::{ID_COLUMN, Record};

/// Default column receiving a displaced non-numeric identifier.
pub const DEFAULT_LABEL_COLUMN: &str = "name";

/// What a heal changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealKind {
    /// A column absent from the remote schema was removed.
    DropColumn {
        /// The removed column.
        column: String,
    },
    /// Non-numeric identifiers were replaced by generated numeric ones.
    NormalizeIdentifier {
        /// How many records were rewritten.
        records: usize,
    },
}

impl HealKind {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::DropColumn { .. } => "drop_column",
            Self::NormalizeIdentifier { .. } => "normalize_identifier",
        }
    }
}

/// A repaired query ready for its single retry.
#[derive(Debug, Clone)]
pub struct Heal {
    /// What was changed.
    pub kind: HealKind,
    /// The query to retry.
    pub query: Query,
}

/// Source of fresh numeric identifiers.
///
/// Ids are millisecond timestamps, bumped so they strictly increase within
/// the process even when several are drawn in the same millisecond.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next identifier.
    pub fn next_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Rule for identifiers the remote rejects as non-integer.
///
/// An `id` is non-numeric when it is a string that does not parse as an
/// integer (`"proj-1"`, `"virtual_abc"`). Such a value moves into the label
/// column when that column is missing or null, and `id` becomes a generated
/// numeric identifier. A label that is already set is never overwritten.
#[derive(Debug)]
pub struct IdentifierPolicy {
    label_column: String,
    ids: IdGenerator,
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL_COLUMN)
    }
}

impl IdentifierPolicy {
    /// Creates a policy writing displaced identifiers to `label_column`.
    #[must_use]
    pub fn new(label_column: impl Into<String>) -> Self {
        Self {
            label_column: label_column.into(),
            ids: IdGenerator::new(),
        }
    }

    /// The label column.
    #[must_use]
    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    /// Returns the identifier if it is a non-numeric string.
    #[must_use]
    pub fn non_numeric_id(record: &Record) -> Option<&str> {
        match record.id()? {
            Value::String(s) if s.trim().parse::<i64>().is_err() => Some(s),
            _ => None,
        }
    }

    /// Rewrites the record in place; returns false if there was nothing to do.
    pub fn normalize(&self, record: &mut Record) -> bool {
        let Some(original) = Self::non_numeric_id(record).map(str::to_string) else {
            return false;
        };
        if record.get(&self.label_column).is_none_or(Value::is_null) {
            record.insert(self.label_column.clone(), original);
        }
        record.insert(ID_COLUMN, self.ids.next_id());
        true
    }
}

/// Decides whether and how a failed write can be repaired.
#[derive(Debug, Default)]
pub struct HealingPolicy {
    identifiers: IdentifierPolicy,
}

impl HealingPolicy {
    /// Creates a policy with the given identifier rule.
    #[must_use]
    pub fn new(identifiers: IdentifierPolicy) -> Self {
        Self { identifiers }
    }

    /// The identifier rule.
    #[must_use]
    pub fn identifiers(&self) -> &IdentifierPolicy {
        &self.identifiers
    }

    /// Returns the repaired query, or `None` if the error is not healable or
    /// the repair would change nothing.
    #[must_use]
    pub fn heal(&self, query: &Query, error: &RemoteError) -> Option<Heal> {
        if !matches!(query.method, Method::Insert | Method::Update) {
            return None;
        }

        match &error.kind {
            RemoteErrorKind::UnknownColumn {
                column: Some(column),
            } => Self::drop_column(query, column),
            RemoteErrorKind::TypeMismatch => self.normalize_identifiers(query, error),
            _ => None,
        }
    }

    fn drop_column(query: &Query, column: &str) -> Option<Heal> {
        let mut repaired = query.clone();
        let payload = repaired.data.as_mut()?;

        let mut removed = false;
        for record in payload.records_mut() {
            removed |= record.remove(column).is_some();
        }
        if !removed {
            return None;
        }

        Some(Heal {
            kind: HealKind::DropColumn {
                column: column.to_string(),
            },
            query: repaired,
        })
    }

    fn normalize_identifiers(&self, query: &Query, error: &RemoteError) -> Option<Heal> {
        let payload = query.data.as_ref()?;
        // Messages that quote a literal must quote the identifier itself.
        let quoted = mentions_any_quoted(&error.message);
        let targets_identifier = payload.records().iter().any(|record| {
            IdentifierPolicy::non_numeric_id(record)
                .is_some_and(|id| !quoted || mentions_value(&error.message, id))
        });
        if !targets_identifier {
            return None;
        }

        let mut repaired = query.clone();
        let mut records = 0;
        for record in repaired.data.as_mut()?.records_mut() {
            if self.identifiers.normalize(record) {
                records += 1;
            }
        }

        Some(Heal {
            kind: HealKind::NormalizeIdentifier { records },
            query: repaired,
        })
    }
}

/// True if the message quotes `value`, e.g. `invalid input syntax for type
/// integer: "proj-1"`.
fn mentions_value(message: &str, value: &str) -> bool {
    message.contains(&format!("\"{value}\"")) || message.contains(&format!("'{value}'"))
}

fn mentions_any_quoted(message: &str) -> bool {
    message.contains('"') || message.contains('\'')
}

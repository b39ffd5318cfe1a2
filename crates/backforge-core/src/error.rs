//! Error types and result aliases for backforge.
//!
//! Two layers of errors exist:
//! - [`RemoteError`] describes why the remote (PostgREST) backend refused or
//!   failed a call. Its [`RemoteErrorKind`] is what the healing policy and the
//!   fallback cascade branch on.
//! - [`Error`] is what callers of the data layer see. Remote failures only
//!   surface here when no fallback applies.

use std::fmt;

/// The result type used throughout backforge.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for calls against the remote backend.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Errors that can occur in backforge operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier (tenant, table, column) was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the identifier invalid.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A query used a method other than select/insert/update/delete.
    ///
    /// This is a programming error and is never healed or hidden.
    #[error("unsupported method: {method}")]
    UnsupportedMethod {
        /// The rejected method name.
        method: String,
    },

    /// The remote backend failed and no fallback applied.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new invalid identifier error.
    #[must_use]
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }

    /// Creates a new unsupported method error.
    #[must_use]
    pub fn unsupported_method(method: impl fmt::Display) -> Self {
        Self::UnsupportedMethod {
            method: method.to_string(),
        }
    }

    pub(crate) fn lock_poisoned() -> Self {
        Self::Internal {
            message: "lock poisoned".into(),
        }
    }
}

/// Classification of a remote backend failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Network failure, timeout, rate limit or 5xx. Triggers fallback.
    Transient,
    /// The payload references a column the remote schema does not have.
    UnknownColumn {
        /// The offending column, when it could be parsed from the message.
        column: Option<String>,
    },
    /// A value's literal form does not fit the column's declared type.
    TypeMismatch,
    /// The table or namespace does not exist remotely.
    NotFound,
    /// The remote client is not configured.
    Unavailable,
    /// A DDL object already exists. Treated as success by schema setup.
    AlreadyExists,
    /// Any other refusal (constraint violation, permission, bad request).
    Rejected,
}

impl RemoteErrorKind {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::UnknownColumn { .. } => "unknown_column",
            Self::TypeMismatch => "type_mismatch",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::AlreadyExists => "already_exists",
            Self::Rejected => "rejected",
        }
    }
}

/// A failure reported by (or on the way to) the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("remote {} error{}: {message}", .kind.label(), code_suffix(.code))]
pub struct RemoteError {
    /// Classified failure kind.
    pub kind: RemoteErrorKind,
    /// Backend error code (PostgREST `PGRST*` or SQLSTATE), when known.
    pub code: Option<String>,
    /// Backend message.
    pub message: String,
}

impl RemoteError {
    /// Creates a remote error of the given kind.
    #[must_use]
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Attaches a backend error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transient, message)
    }

    /// Creates an unavailable error for an unconfigured client.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(RemoteErrorKind::Unavailable, "remote backend not configured")
    }

    /// Creates an unknown column error.
    #[must_use]
    pub fn unknown_column(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            RemoteErrorKind::UnknownColumn {
                column: Some(column.into()),
            },
            message,
        )
    }

    /// Returns true when the error is an "already exists" DDL response.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.kind == RemoteErrorKind::AlreadyExists
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display_includes_kind_and_code() {
        let err = RemoteError::unknown_column("color", "Could not find the 'color' column")
            .with_code("PGRST204");
        assert_eq!(
            err.to_string(),
            "remote unknown_column error (PGRST204): Could not find the 'color' column"
        );

        let err = RemoteError::transient("connection refused");
        assert_eq!(err.to_string(), "remote transient error: connection refused");
    }

    #[test]
    fn remote_error_converts_into_core_error() {
        let err: Error = RemoteError::unavailable().into();
        assert!(matches!(
            err,
            Error::Remote(RemoteError {
                kind: RemoteErrorKind::Unavailable,
                ..
            })
        ));
    }
}

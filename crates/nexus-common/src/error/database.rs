//! Database error types.
//!
//! Every failure surfaced by the engine is a [`NexusError`]. Variants are
//! grouped by the [`ErrorKind`] the caller is expected to act on.

use std::fmt;
use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Operation not supported.
    NotSupported = 0x0002,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,

    // Query errors (0x0600 - 0x06FF)
    /// SQL syntax error.
    SyntaxError = 0x0600,
    /// Table not found.
    TableNotFound = 0x0601,
    /// Column not found.
    ColumnNotFound = 0x0602,
    /// Type mismatch.
    TypeMismatch = 0x0603,
    /// Query execution failed.
    ExecutionFailed = 0x0605,
    /// Table already exists.
    TableExists = 0x0606,

    // Constraint errors (0x0700 - 0x07FF)
    /// Unique, primary key or not-null constraint violated.
    ConstraintViolation = 0x0700,
    /// Mutation of a read-only table.
    ReadOnly = 0x0701,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x06 => "Query",
            0x07 => "Constraint",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The five error kinds callers distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// User-facing SQL semantic or syntax error.
    Query,
    /// Construct outside the supported SQL subset.
    NotSupported,
    /// Type coercion failure.
    Cast,
    /// Mutation attempted on a protected table.
    ReadOnly,
    /// Broken internal invariant.
    Internal,
}

/// The main error type for NexusDB.
///
/// # Example
///
/// ```rust
/// use nexus_common::error::{ErrorKind, NexusError};
///
/// let err = NexusError::Cast { from: "text".into(), to: "int".into() };
/// assert_eq!(err.kind(), ErrorKind::Cast);
/// assert_eq!(err.to_string(), "cannot cast type text to int");
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NexusError {
    // ==========================================================================
    // Query Errors
    // ==========================================================================
    /// Generic SQL semantic error.
    #[error("{message}")]
    Query {
        /// Error message.
        message: String,
    },

    /// SQL text could not be parsed.
    #[error("syntax error: {message}")]
    Syntax {
        /// Parser message.
        message: String,
    },

    /// Referenced table does not exist.
    #[error("relation \"{table}\" does not exist")]
    TableNotFound {
        /// Table name as written.
        table: String,
    },

    /// Table with that name already exists.
    #[error("relation \"{table}\" already exists")]
    TableExists {
        /// Table name.
        table: String,
    },

    /// Referenced column does not exist.
    #[error("Column not found: \"{column}\"")]
    ColumnNotFound {
        /// Column name as written.
        column: String,
    },

    /// Unique, primary key or not-null constraint violated.
    #[error("{message}")]
    ConstraintViolation {
        /// Name of the violated constraint.
        constraint: String,
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Other Kinds
    // ==========================================================================
    /// Operation not supported.
    #[error("not supported: {operation}")]
    NotSupported {
        /// The unsupported construct.
        operation: String,
    },

    /// No coercion path between two types.
    #[error("cannot cast type {from} to {to}")]
    Cast {
        /// Source type.
        from: String,
        /// Target type.
        to: String,
    },

    /// Table is flagged read-only.
    #[error("table \"{table}\" is read-only")]
    ReadOnly {
        /// Table name.
        table: String,
    },

    /// Invalid argument to a programmatic API, such as a bad configuration.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl NexusError {
    /// Builds a generic query error.
    pub fn query(message: impl Into<String>) -> Self {
        NexusError::Query {
            message: message.into(),
        }
    }

    /// Builds a not-supported error naming the construct.
    pub fn not_supported(operation: impl Into<String>) -> Self {
        NexusError::NotSupported {
            operation: operation.into(),
        }
    }

    /// Builds a cast error between two named types.
    pub fn cast(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        NexusError::Cast {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Builds an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        NexusError::Internal {
            message: message.into(),
        }
    }

    /// Returns the error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            NexusError::Query { .. } => ErrorCode::ExecutionFailed,
            NexusError::Syntax { .. } => ErrorCode::SyntaxError,
            NexusError::TableNotFound { .. } => ErrorCode::TableNotFound,
            NexusError::TableExists { .. } => ErrorCode::TableExists,
            NexusError::ColumnNotFound { .. } => ErrorCode::ColumnNotFound,
            NexusError::ConstraintViolation { .. } => ErrorCode::ConstraintViolation,
            NexusError::NotSupported { .. } => ErrorCode::NotSupported,
            NexusError::Cast { .. } => ErrorCode::TypeMismatch,
            NexusError::ReadOnly { .. } => ErrorCode::ReadOnly,
            NexusError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            NexusError::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Folds the error into one of the five caller-facing kinds.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            NexusError::Query { .. }
            | NexusError::Syntax { .. }
            | NexusError::TableNotFound { .. }
            | NexusError::TableExists { .. }
            | NexusError::ColumnNotFound { .. }
            | NexusError::ConstraintViolation { .. }
            | NexusError::InvalidArgument { .. } => ErrorKind::Query,
            NexusError::NotSupported { .. } => ErrorKind::NotSupported,
            NexusError::Cast { .. } => ErrorKind::Cast,
            NexusError::ReadOnly { .. } => ErrorKind::ReadOnly,
            NexusError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if this error was caused by the user's query.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }
}

impl From<sqlparser::parser::ParserError> for NexusError {
    fn from(e: sqlparser::parser::ParserError) -> Self {
        NexusError::Syntax {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::Internal.as_u16(), 0x0001);
        assert_eq!(ErrorCode::SyntaxError.category(), "Query");
        assert_eq!(ErrorCode::ReadOnly.category(), "Constraint");
        assert_eq!(ErrorCode::NotSupported.category(), "General");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(NexusError::query("x").kind(), ErrorKind::Query);
        assert_eq!(
            NexusError::TableExists { table: "t".into() }.kind(),
            ErrorKind::Query
        );
        assert_eq!(NexusError::not_supported("x").kind(), ErrorKind::NotSupported);
        assert_eq!(NexusError::cast("text", "int").kind(), ErrorKind::Cast);
        assert_eq!(
            NexusError::ReadOnly { table: "t".into() }.kind(),
            ErrorKind::ReadOnly
        );
        assert!(!NexusError::internal("bug").is_user_error());
    }

    #[test]
    fn test_error_display() {
        let err = NexusError::ColumnNotFound {
            column: "foo".into(),
        };
        assert_eq!(err.to_string(), "Column not found: \"foo\"");
        assert_eq!(err.code(), ErrorCode::ColumnNotFound);

        let err = NexusError::not_supported("FULL OUTER JOIN");
        assert_eq!(err.to_string(), "not supported: FULL OUTER JOIN");
    }

    #[test]
    fn test_from_parser_error() {
        let err: NexusError =
            sqlparser::parser::ParserError::ParserError("Expected something".into()).into();
        assert_eq!(err.code(), ErrorCode::SyntaxError);
        assert!(err.to_string().contains("Expected something"));
    }
}

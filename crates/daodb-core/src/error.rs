//! Error types for daodb.
//!
//! Every fallible operation in the workspace returns [`Result`]. The variants are
//! deliberately coarse so that callers (typically a web or business layer) can pick
//! between "programmer error", "retry" and "report a failure" without string matching.

use std::error::Error as StdError;
use std::fmt;

/// Convenience alias used across all daodb crates.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for daodb operations.
#[derive(Debug)]
pub enum Error {
    /// Unknown table or field name.
    NotFound(String),
    /// Malformed descriptor construction or an unusable argument.
    InvalidArgument(String),
    /// Positional lookup past the end of a field or row list.
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Number of available items.
        len: usize,
    },
    /// An UPDATE/DELETE/INSERT did not affect exactly one row.
    ConcurrencyConflict(ConflictError),
    /// A read-only query failed.
    Query(QueryError),
    /// A data-modifying statement failed.
    Statement(QueryError),
    /// The underlying driver lacks a capability (e.g. generated-key reporting).
    Unsupported(String),
    /// The flat XML form could not be read or written.
    Serialization(String),
    /// Configuration could not be loaded.
    Config(String),
    /// Anything else.
    Custom(String),
}

/// Details about a statement that matched an unexpected number of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictError {
    /// The statement that was executed.
    pub sql: String,
    /// Rows the gateway reported as affected.
    pub rows_affected: u64,
}

/// Details about a failed query or statement.
#[derive(Debug)]
pub struct QueryError {
    /// Driver or gateway message.
    pub message: String,
    /// The SQL text, when known.
    pub sql: Option<String>,
    /// Vendor SQLSTATE code, when the driver reports one.
    pub sqlstate: Option<String>,
    /// Underlying cause.
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl QueryError {
    /// Create a query error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql: None,
            sqlstate: None,
            source: None,
        }
    }

    /// Attach the SQL text.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Attach a SQLSTATE code.
    pub fn with_sqlstate(mut self, code: impl Into<String>) -> Self {
        self.sqlstate = Some(code.into());
        self
    }
}

impl Error {
    /// Build a `NotFound` error for a table.
    pub fn table_not_found(name: &str) -> Self {
        Error::NotFound(format!("table {name}"))
    }

    /// Build a `NotFound` error for a field of a table.
    pub fn field_not_found(table: &str, field: &str) -> Self {
        Error::NotFound(format!("field {field} in table {table}"))
    }

    /// Build a `Query` error carrying the SQL text.
    pub fn query(message: impl Into<String>, sql: &str) -> Self {
        Error::Query(QueryError::new(message).with_sql(sql))
    }

    /// Build a `Statement` error carrying the SQL text.
    pub fn statement(message: impl Into<String>, sql: &str) -> Self {
        Error::Statement(QueryError::new(message).with_sql(sql))
    }

    /// Build a `ConcurrencyConflict` error.
    pub fn conflict(sql: impl Into<String>, rows_affected: u64) -> Self {
        Error::ConcurrencyConflict(ConflictError {
            sql: sql.into(),
            rows_affected,
        })
    }

    /// Whether this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether this is a `ConcurrencyConflict` error.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict(_))
    }

    /// Whether this is an `Unsupported` error.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }

    /// Whether the caller may reasonably retry the whole unit of work.
    ///
    /// Only concurrency conflicts qualify: the row changed underneath us and a
    /// re-read followed by a new attempt can succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_concurrency_conflict()
    }

    /// The SQL text associated with this error, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) | Error::Statement(q) => q.sql.as_deref(),
            Error::ConcurrencyConflict(c) => Some(&c.sql),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(what) => write!(f, "not found: {}", what),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::OutOfRange { index, len } => {
                write!(f, "index {} out of range (len {})", index, len)
            }
            Error::ConcurrencyConflict(c) => write!(
                f,
                "concurrency conflict: {} row(s) affected by `{}`",
                c.rows_affected, c.sql
            ),
            Error::Query(q) => write!(f, "query error: {}", q),
            Error::Statement(q) => write!(f, "statement error: {}", q),
            Error::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            Error::Serialization(msg) => write!(f, "serialization error: {}", msg),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.sqlstate {
            write!(f, " [{}]", code)?;
        }
        if let Some(sql) = &self.sql {
            write!(f, " (sql: {})", sql)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Query(q) | Error::Statement(q) => q
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn StdError + 'static)),
            _ => None,
        }
    }
}

impl StdError for QueryError {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

//! Error types for the data access layer.
//!
//! Every facade operation translates low-level failures into one of a small
//! set of coded errors. The numeric codes follow HTTP conventions so callers
//! can forward them unchanged.

use thiserror::Error;

/// Message used when an upsert collides with an existing key.
pub const DUPLICATE_RECORD: &str = "Duplicate Record";

/// Coarse classification of a [`DbError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    NotConfigured,
    SqlExecution,
    Validation,
    DuplicateKey,
    Config,
    Resource,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed for database '{database}': {message}")]
    Connection { database: String, message: String },

    #[error("Database '{database}' is not configured")]
    NotConfigured { database: String },

    #[error("{message}")]
    SqlExecution {
        message: String,
        /// e.g., "23505" for unique violation
        sql_state: Option<String>,
        unique_violation: bool,
    },

    #[error("{message}")]
    Validation { message: String },

    #[error("Duplicate Record")]
    DuplicateKey {
        /// Raw driver message, kept for logs only.
        detail: String,
    },

    #[error("Invalid configuration for '{key}': {message}")]
    Config { key: String, message: String },

    #[error("Resource '{path}' could not be read: {message}")]
    Resource { path: String, message: String },
}

impl DbError {
    /// Create a connection error for a named database.
    pub fn connection(database: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            database: database.into(),
            message: message.into(),
        }
    }

    /// Create a not-configured error.
    pub fn not_configured(database: impl Into<String>) -> Self {
        Self::NotConfigured {
            database: database.into(),
        }
    }

    /// Create a SQL execution error with optional SQL state.
    pub fn sql_execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::SqlExecution {
            message: message.into(),
            sql_state,
            unique_violation: false,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a resource error.
    pub fn resource(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resource {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Numeric code carried by this error.
    pub fn code(&self) -> u16 {
        match self {
            Self::Connection { .. } => 511,
            Self::SqlExecution { .. } => 500,
            Self::NotConfigured { .. }
            | Self::Validation { .. }
            | Self::DuplicateKey { .. }
            | Self::Config { .. }
            | Self::Resource { .. } => 400,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::NotConfigured { .. } => ErrorKind::NotConfigured,
            Self::SqlExecution { .. } => ErrorKind::SqlExecution,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            Self::Config { .. } => ErrorKind::Config,
            Self::Resource { .. } => ErrorKind::Resource,
        }
    }

    /// Re-signal a key collision as [`DbError::DuplicateKey`].
    ///
    /// Matches on the driver message containing `duplicate key` or on the
    /// driver reporting a unique-constraint violation. Anything else is
    /// returned unchanged.
    pub fn into_duplicate_record(self) -> Self {
        match self {
            Self::SqlExecution {
                message,
                unique_violation,
                ..
            } if unique_violation || message.contains("duplicate key") => {
                Self::DuplicateKey { detail: message }
            }
            other => other,
        }
    }

    /// Map a failure raised while acquiring a pooled connection.
    pub fn from_acquire(database: &str, err: sqlx::Error) -> Self {
        Self::connection(database, err.to_string())
    }
}

/// Convert sqlx errors raised during statement execution.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => Self::SqlExecution {
                message: db_err.message().to_string(),
                sql_state: db_err.code().map(|c| c.to_string()),
                unique_violation: db_err.is_unique_violation(),
            },
            sqlx::Error::RowNotFound => Self::sql_execution("No rows returned", None),
            sqlx::Error::Io(io_err) => Self::sql_execution(format!("I/O error: {io_err}"), None),
            sqlx::Error::Tls(tls_err) => Self::sql_execution(format!("TLS error: {tls_err}"), None),
            sqlx::Error::Protocol(msg) => {
                Self::sql_execution(format!("Protocol error: {msg}"), None)
            }
            sqlx::Error::PoolTimedOut => Self::sql_execution("Connection pool timed out", None),
            sqlx::Error::PoolClosed => Self::sql_execution("Connection pool is closed", None),
            sqlx::Error::WorkerCrashed => Self::sql_execution("Database worker crashed", None),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::validation(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnNotFound(col) => {
                Self::validation(format!("Column not found: {col}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => Self::validation(format!(
                "Column index {index} out of bounds (len: {len})"
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::validation(format!("Failed to decode column {index}: {source}"))
            }
            sqlx::Error::Decode(source) => Self::validation(format!("Decode error: {source}")),
            sqlx::Error::Configuration(msg) => Self::validation(msg.to_string()),
            other => Self::sql_execution(other.to_string(), None),
        }
    }
}

/// Result type alias for data access operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(DbError::connection("default", "refused").code(), 511);
        assert_eq!(DbError::sql_execution("syntax error", None).code(), 500);
        assert_eq!(DbError::validation("bad input").code(), 400);
        assert_eq!(DbError::not_configured("reports").code(), 400);
        assert_eq!(
            DbError::DuplicateKey {
                detail: "dup".to_string()
            }
            .code(),
            400
        );
    }

    #[test]
    fn test_duplicate_key_message_is_generic() {
        let err = DbError::sql_execution(
            "duplicate key value violates unique constraint \"users_pkey\"",
            Some("23505".to_string()),
        )
        .into_duplicate_record();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        assert_eq!(err.to_string(), DUPLICATE_RECORD);
    }

    #[test]
    fn test_unique_violation_flag_becomes_duplicate() {
        let err = DbError::SqlExecution {
            message: "UNIQUE constraint failed: users.id".to_string(),
            sql_state: Some("2067".to_string()),
            unique_violation: true,
        }
        .into_duplicate_record();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
    }

    #[test]
    fn test_other_sql_errors_pass_through() {
        let err = DbError::sql_execution("relation \"users\" does not exist", None)
            .into_duplicate_record();
        assert_eq!(err.kind(), ErrorKind::SqlExecution);
        assert_eq!(err.code(), 500);

        let err = DbError::validation("missing field").into_duplicate_record();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_sqlx_row_not_found_is_sql_failure() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), 500);
    }

    #[test]
    fn test_sqlx_column_not_found_is_validation() {
        let err: DbError = sqlx::Error::ColumnNotFound("name".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_acquire_failure_is_connection_error() {
        let err = DbError::from_acquire("default", sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.code(), 511);
        assert!(err.to_string().contains("default"));
    }
}

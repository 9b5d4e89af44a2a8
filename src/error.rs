//! Error types for daogen.
//!
//! All fallible operations return [`DbResult`]. Statement failures keep the
//! original driver error as their source so callers can inspect it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error(
        "Pool connection timeout error. No connection available in pool during {attempts}ms"
    )]
    PoolTimeout {
        /// Number of retry ticks spent waiting.
        attempts: u32,
    },

    #[error("Query execution failed: {source}")]
    QueryExecution {
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Configuration error: {message} (entity: {entity})")]
    Configuration { message: String, entity: String },

    #[error("Unable to parse view '{view}': {message}")]
    ViewParse { view: String, message: String },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a pool timeout error after `attempts` retry ticks.
    pub fn pool_timeout(attempts: u32) -> Self {
        Self::PoolTimeout { attempts }
    }

    /// Wrap a driver failure raised while running `sql`.
    pub fn query_execution(sql: impl Into<String>, source: sqlx::Error) -> Self {
        Self::QueryExecution {
            sql: sql.into(),
            source,
        }
    }

    /// Create a configuration error for an entity with missing or invalid metadata.
    pub fn configuration(message: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            entity: entity.into(),
        }
    }

    /// Create a view parse error.
    pub fn view_parse(view: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ViewParse {
            view: view.into(),
            message: message.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::PoolTimeout { .. } => {
                Some("Increase the pool size or the pool connection timeout")
            }
            Self::Configuration { .. } => {
                Some("Regenerate the entity metadata or define primary keys")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Nothing in this crate retries on its own except pool acquisition.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::PoolTimeout { .. })
    }

    /// The underlying driver error for statement failures.
    pub fn driver_error(&self) -> Option<&sqlx::Error> {
        match self {
            Self::QueryExecution { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convert sqlx errors raised outside statement execution (connect, pool checkout).
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Database(db_err) => DbError::connection(
                db_err.message().to_string(),
                "Check that the database exists and the user may access it",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out opening a pooled connection",
                "Check database server availability",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

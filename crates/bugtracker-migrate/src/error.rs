//! Error types for the store adapter and migration.

use thiserror::Error;

use crate::core::SqlValue;

/// Exit code for configuration errors (invalid YAML, missing fields).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code when a store cannot be reached or is misconfigured.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for query, constraint and data errors that escape the run.
pub const EXIT_QUERY_ERROR: u8 = 3;
/// Exit code when a batch commit fails.
pub const EXIT_COMMIT_ERROR: u8 = 4;
/// Exit code when post-migration row counts do not match the source.
pub const EXIT_VERIFICATION_FAILED: u8 = 5;
/// Exit code when the target schema could not be applied.
pub const EXIT_SCHEMA_ERROR: u8 = 6;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for adapter and migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store unreachable or misconfigured.
    #[error("Connection error ({backend}): {message}")]
    Connection { backend: String, message: String },

    /// Malformed query, bad parameters or type mismatch.
    #[error("Query failed: {message}\n  Query: {query}\n  Params: {}", format_params(.params))]
    Query {
        query: String,
        params: Vec<SqlValue>,
        message: String,
    },

    /// Integrity violation (foreign key, unique, not-null, check) on a single statement.
    #[error("Constraint violation: {message}\n  Query: {query}\n  Params: {}", format_params(.params))]
    ConstraintViolation {
        query: String,
        params: Vec<SqlValue>,
        message: String,
    },

    /// Commit failed; the pending transaction was rolled back.
    #[error("Commit failed (rolled back): {0}")]
    Commit(String),

    /// Schema DDL could not be applied.
    #[error("Schema initialization failed: {0}")]
    Schema(String),

    /// Batch transfer aborted for a specific table.
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// A stored value could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error for the given backend.
    pub fn connection(backend: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Connection {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    /// Create a Query error carrying the statement and its parameters.
    pub fn query(query: impl Into<String>, params: &[SqlValue], message: impl ToString) -> Self {
        MigrateError::Query {
            query: query.into(),
            params: params.to_vec(),
            message: message.to_string(),
        }
    }

    /// Create a ConstraintViolation error carrying the statement and its parameters.
    pub fn constraint(
        query: impl Into<String>,
        params: &[SqlValue],
        message: impl ToString,
    ) -> Self {
        MigrateError::ConstraintViolation {
            query: query.into(),
            params: params.to_vec(),
            message: message.to_string(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this failure is scoped to a single statement and may be skipped
    /// by a tolerant batch.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            MigrateError::Query { .. }
                | MigrateError::ConstraintViolation { .. }
                | MigrateError::InvalidData(_)
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Query { .. }
            | MigrateError::ConstraintViolation { .. }
            | MigrateError::InvalidData(_)
            | MigrateError::Transfer { .. } => EXIT_QUERY_ERROR,
            MigrateError::Commit(_) => EXIT_COMMIT_ERROR,
            MigrateError::Schema(_) => EXIT_SCHEMA_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

fn format_params(params: &[SqlValue]) -> String {
    let rendered: Vec<String> = params.iter().map(|p| p.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

/// Result type alias for adapter and migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

//! Database driver implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`sqlite`]: embedded SQLite driver (sqlx)
//! - [`postgres`]: PostgreSQL driver (tokio-postgres)
//! - [`common`]: Shared utilities (TLS)
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `Dialect`: SQL syntax strategy for the database engine
//! - `BackendConnection`: the engine's native statement surface
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect` and `BackendConnection`
//! 3. Add a variant to [`BackendKind`] and [`DialectImpl`]

pub mod common;
pub mod postgres;
pub mod sqlite;

pub use common::SslMode;

pub use postgres::{PostgresBackend, PostgresDialect};
pub use sqlite::{SqliteBackend, SqliteDialect};

use std::fmt;

use crate::config::StoreConfig;
use crate::core::traits::{BackendConnection, Dialect};
use crate::error::{MigrateError, Result};

/// Supported store engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Postgres,
}

impl BackendKind {
    /// Resolve a configured database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(BackendKind::Sqlite),
            "postgres" | "postgresql" | "pg" | "supabase" => Ok(BackendKind::Postgres),
            other => Err(MigrateError::Config(format!(
                "Unknown database type: '{}'. Supported types: sqlite, postgres",
                other
            ))),
        }
    }

    /// The SQL dialect for this engine.
    pub fn dialect(&self) -> DialectImpl {
        match self {
            BackendKind::Sqlite => DialectImpl::Sqlite(SqliteDialect::new()),
            BackendKind::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
        }
    }

    /// Open a native connection for this engine.
    pub async fn connect(&self, config: &StoreConfig) -> Result<Box<dyn BackendConnection>> {
        Ok(match self {
            BackendKind::Sqlite => Box::new(SqliteBackend::connect(config).await?),
            BackendKind::Postgres => Box::new(PostgresBackend::connect(config).await?),
        })
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// Enum-based static dispatch for dialects.
///
/// Note: We use manual impl instead of enum_dispatch macro due to
/// cross-module trait complexities. The performance is identical.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Sqlite(SqliteDialect),
    Postgres(PostgresDialect),
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Sqlite(d) => d.name(),
            DialectImpl::Postgres(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        match self {
            DialectImpl::Sqlite(d) => d.quote_ident(name),
            DialectImpl::Postgres(d) => d.quote_ident(name),
        }
    }

    fn param_placeholder(&self, index: usize) -> String {
        match self {
            DialectImpl::Sqlite(d) => d.param_placeholder(index),
            DialectImpl::Postgres(d) => d.param_placeholder(index),
        }
    }

    fn version_query(&self) -> &'static str {
        match self {
            DialectImpl::Sqlite(d) => d.version_query(),
            DialectImpl::Postgres(d) => d.version_query(),
        }
    }

    fn table_exists_query(&self) -> &'static str {
        match self {
            DialectImpl::Sqlite(d) => d.table_exists_query(),
            DialectImpl::Postgres(d) => d.table_exists_query(),
        }
    }

    fn column_names_query(&self) -> &'static str {
        match self {
            DialectImpl::Sqlite(d) => d.column_names_query(),
            DialectImpl::Postgres(d) => d.column_names_query(),
        }
    }

    fn reset_sequence_query(&self, table: &str, pk_col: &str) -> Option<String> {
        match self {
            DialectImpl::Sqlite(d) => d.reset_sequence_query(table, pk_col),
            DialectImpl::Postgres(d) => d.reset_sequence_query(table, pk_col),
        }
    }
}

//! Core traits for backend-agnostic store access.
//!
//! - [`BackendConnection`]: the native call surface of one engine (SQLite,
//!   PostgreSQL), wrapped by the [`Connection`](crate::connection::Connection)
//!   adapter
//! - [`Dialect`]: SQL syntax strategy for the engine
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` provides interchangeable SQL syntax
//! - **Template Method**: default `Dialect` methods build on the required ones

use async_trait::async_trait;

use super::record::Columns;
use super::value::SqlValue;
use crate::dialect::placeholder;
use crate::error::Result;

/// Raw output of one statement, before materialization into records.
#[derive(Debug, Clone, Default)]
pub struct StatementOutput {
    /// Column names in result-set order (empty for statements without rows).
    pub columns: Columns,
    /// Row tuples in column order.
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows inserted/updated/deleted, when the backend reports it.
    pub rows_affected: u64,
}

impl StatementOutput {
    /// Output for a statement that produced no result set.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            columns: Vec::new().into(),
            rows: Vec::new(),
            rows_affected,
        }
    }
}

/// The native call surface of one database engine.
///
/// Implementations speak the engine's own placeholder syntax; translation from
/// the canonical `?` markers happens before these methods are called.
#[async_trait]
pub trait BackendConnection: Send {
    /// Run a single parameterized statement.
    ///
    /// Integrity failures must surface as `ConstraintViolation`, everything
    /// else the server rejects as `Query`.
    async fn run(&mut self, sql: &str, params: &[SqlValue]) -> Result<StatementOutput>;

    /// Run one or more statements without parameters (transaction control, DDL).
    async fn batch_execute(&mut self, sql: &str) -> Result<()>;

    /// Release the underlying connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// SQL dialect abstraction for engine-specific syntax.
pub trait Dialect: Send + Sync {
    /// Get the dialect name (e.g., "sqlite", "postgres").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name).
    fn quote_ident(&self, name: &str) -> String;

    /// Get the parameter placeholder for a given 1-based index.
    fn param_placeholder(&self, index: usize) -> String;

    /// Query returning one row with a `version` column.
    fn version_query(&self) -> &'static str;

    /// Query returning one row (`present`, 0/1 or boolean) telling whether the
    /// table named by the single `?` parameter exists.
    fn table_exists_query(&self) -> &'static str;

    /// Query returning one `name` row per column of the table named by the
    /// single `?` parameter.
    fn column_names_query(&self) -> &'static str;

    /// Statement that realigns the id generator of `table` after explicit-id
    /// inserts, if the engine needs one.
    fn reset_sequence_query(&self, table: &str, pk_col: &str) -> Option<String>;

    /// Rewrite canonical `?` markers into this dialect's placeholders.
    ///
    /// Returns the rewritten SQL and the number of markers found.
    fn translate_placeholders(&self, sql: &str) -> (String, usize) {
        placeholder::translate(sql, |i| self.param_placeholder(i))
    }

    /// Build an `INSERT ... ON CONFLICT DO UPDATE` with canonical markers.
    ///
    /// Both supported engines accept the same upsert syntax; every non-key
    /// column is overwritten with the incoming value.
    fn build_upsert_query(&self, table: &str, columns: &[&str], pk_columns: &[&str]) -> String {
        let quoted_cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let markers = vec!["?"; columns.len()].join(", ");

        let conflict_cols = pk_columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO",
            self.quote_ident(table),
            quoted_cols,
            markers,
            conflict_cols
        );

        let update_set = columns
            .iter()
            .filter(|c| !pk_columns.contains(c))
            .map(|c| format!("{} = excluded.{}", self.quote_ident(c), self.quote_ident(c)))
            .collect::<Vec<_>>();

        if update_set.is_empty() {
            sql.push_str(" NOTHING");
        } else {
            sql.push_str(&format!(" UPDATE SET {}", update_set.join(", ")));
        }

        sql
    }

    /// Build a `SELECT COUNT(*) AS count` for a table.
    fn build_count_query(&self, table: &str) -> String {
        format!("SELECT COUNT(*) AS count FROM {}", self.quote_ident(table))
    }
}

//! Backend-independent connection adapter.
//!
//! [`Connection`] wraps one native backend connection behind a single calling
//! convention:
//!
//! - every statement is written with positional `?` markers and translated to
//!   the backend's own placeholder syntax before it is sent
//! - a transaction is opened implicitly by the first statement and ended by
//!   [`Connection::commit`] or [`Connection::rollback`]
//! - results are materialized as [`Record`]s through a [`Cursor`]
//!
//! ```rust,no_run
//! use bugtracker_migrate::{Connection, StoreConfig, SqlValue};
//!
//! # async fn demo() -> bugtracker_migrate::Result<()> {
//! let mut conn = Connection::acquire(&StoreConfig::sqlite("bug_tracker.db")).await?;
//! let user = conn
//!     .execute("SELECT * FROM users WHERE username = ?", &["admin".into()])
//!     .await?
//!     .fetchone()?;
//! if let Some(user) = user {
//!     println!("{} is admin: {}", user["username"], user["is_admin"]);
//! }
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::core::record::{Columns, Record};
use crate::core::traits::{BackendConnection, Dialect, StatementOutput};
use crate::core::value::SqlValue;
use crate::drivers::{BackendKind, DialectImpl};
use crate::error::{MigrateError, Result};

/// Result of the most recent statement on a [`Connection`].
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    columns: Columns,
    rows: VecDeque<Vec<SqlValue>>,
    rows_affected: u64,
}

impl Cursor {
    fn from_output(output: StatementOutput) -> Self {
        Self {
            columns: output.columns,
            rows: output.rows.into(),
            rows_affected: output.rows_affected,
        }
    }

    /// Next row, or `None` once the result set is exhausted.
    pub fn fetchone(&mut self) -> Result<Option<Record>> {
        match self.rows.pop_front() {
            Some(values) => Ok(Some(Record::new(self.columns.clone(), values)?)),
            None => Ok(None),
        }
    }

    /// All remaining rows in result-set order.
    pub fn fetchall(&mut self) -> Result<Vec<Record>> {
        self.rows
            .drain(..)
            .map(|values| Record::new(self.columns.clone(), values))
            .collect()
    }

    /// Column names of the result set (empty for statements without rows).
    pub fn description(&self) -> &[String] {
        &self.columns
    }

    /// Rows changed by the statement, or rows returned for queries.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }
}

/// An open handle to one store.
pub struct Connection {
    backend: Option<Box<dyn BackendConnection>>,
    kind: BackendKind,
    dialect: DialectImpl,
    in_transaction: bool,
    cursor: Option<Cursor>,
}

impl Connection {
    /// Open a connection to the configured store.
    ///
    /// Fails with a connection error if the store is unreachable or the
    /// configuration cannot describe it.
    pub async fn acquire(config: &StoreConfig) -> Result<Self> {
        let kind = BackendKind::from_db_type(&config.r#type)
            .map_err(|e| MigrateError::connection(config.r#type.clone(), e))?;
        let backend = kind.connect(config).await?;
        Ok(Self::from_backend(kind, backend))
    }

    /// Wrap an already-open backend connection.
    pub fn from_backend(kind: BackendKind, backend: Box<dyn BackendConnection>) -> Self {
        Self {
            backend: Some(backend),
            kind,
            dialect: kind.dialect(),
            in_transaction: false,
            cursor: None,
        }
    }

    /// Engine behind this handle.
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// SQL dialect of the engine behind this handle.
    pub fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    /// Whether an implicit transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    fn backend_mut(&mut self) -> Result<&mut Box<dyn BackendConnection>> {
        let kind = self.kind;
        self.backend
            .as_mut()
            .ok_or_else(|| MigrateError::connection(kind.to_string(), "connection is closed"))
    }

    async fn begin_if_needed(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.backend_mut()?.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// Run one statement written with canonical `?` markers.
    ///
    /// The marker count must equal `params.len()`; a mismatch is rejected
    /// before the backend is contacted. The returned cursor stays available
    /// through [`fetchone`](Self::fetchone) / [`fetchall`](Self::fetchall)
    /// until the next statement.
    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<&mut Cursor> {
        let (native_sql, markers) = self.dialect.translate_placeholders(sql);
        if markers != params.len() {
            return Err(MigrateError::query(
                sql,
                params,
                format!(
                    "statement has {} placeholder(s) but {} parameter(s) were supplied",
                    markers,
                    params.len()
                ),
            ));
        }

        self.backend_mut()?;
        self.cursor = None;
        self.begin_if_needed().await?;

        debug!(backend = %self.kind, "{}", native_sql);
        let output = self
            .backend_mut()?
            .run(&native_sql, params)
            .await
            .map_err(|e| with_canonical_query(e, sql))?;

        Ok(self.cursor.insert(Cursor::from_output(output)))
    }

    /// Next row of the most recent statement; `None` before any execute.
    pub fn fetchone(&mut self) -> Result<Option<Record>> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.fetchone(),
            None => Ok(None),
        }
    }

    /// Remaining rows of the most recent statement; empty before any execute.
    pub fn fetchall(&mut self) -> Result<Vec<Record>> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.fetchall(),
            None => Ok(Vec::new()),
        }
    }

    /// Make every write since the last commit durable.
    ///
    /// If the commit fails the transaction is rolled back and a commit error
    /// is returned.
    pub async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        let backend = self.backend_mut()?;
        let outcome = backend.batch_execute("COMMIT").await;
        if let Err(e) = outcome {
            if let Err(rollback_err) = backend.batch_execute("ROLLBACK").await {
                warn!("Rollback after failed commit also failed: {}", rollback_err);
            }
            self.in_transaction = false;
            return Err(MigrateError::Commit(e.to_string()));
        }
        self.in_transaction = false;
        Ok(())
    }

    /// Discard every write since the last commit.
    pub async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.backend_mut()?.batch_execute("ROLLBACK").await
    }

    /// Mark a point inside the current transaction that later work can be
    /// undone to without losing earlier writes.
    pub async fn savepoint(&mut self, name: &str) -> Result<()> {
        check_savepoint_name(name)?;
        self.begin_if_needed().await?;
        self.backend_mut()?
            .batch_execute(&format!("SAVEPOINT {}", name))
            .await
    }

    /// Undo everything after the named savepoint; the savepoint stays usable.
    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        check_savepoint_name(name)?;
        self.backend_mut()?
            .batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", name))
            .await
    }

    /// Forget the named savepoint, keeping its writes in the transaction.
    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        check_savepoint_name(name)?;
        self.backend_mut()?
            .batch_execute(&format!("RELEASE SAVEPOINT {}", name))
            .await
    }

    /// Release the cursor and the connection. Safe to call more than once.
    ///
    /// Uncommitted writes are discarded.
    pub async fn close(&mut self) -> Result<()> {
        self.cursor = None;
        let Some(mut backend) = self.backend.take() else {
            return Ok(());
        };
        if self.in_transaction {
            self.in_transaction = false;
            if let Err(e) = backend.batch_execute("ROLLBACK").await {
                debug!("Rollback on close failed: {}", e);
            }
        }
        backend.close().await
    }

    /// Server version string.
    pub async fn server_version(&mut self) -> Result<String> {
        let sql = self.dialect.version_query();
        let row = self.execute(sql, &[]).await?.fetchone()?;
        Ok(row
            .and_then(|r| r.get("version").and_then(|v| v.as_str().map(str::to_string)))
            .unwrap_or_default())
    }

    /// Whether `table` exists in the store.
    pub async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let sql = self.dialect.table_exists_query();
        let row = self.execute(sql, &[table.into()]).await?.fetchone()?;
        Ok(row
            .and_then(|r| r.get("present").and_then(SqlValue::as_bool))
            .unwrap_or(false))
    }

    /// Column names of `table` in declaration order (empty if it does not exist).
    pub async fn column_names(&mut self, table: &str) -> Result<Vec<String>> {
        let sql = self.dialect.column_names_query();
        let rows = self.execute(sql, &[table.into()]).await?.fetchall()?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("name").and_then(|v| v.as_str().map(str::to_string)))
            .collect())
    }

    /// Number of rows in `table`.
    pub async fn count_rows(&mut self, table: &str) -> Result<i64> {
        let sql = self.dialect.build_count_query(table);
        let row = self.execute(&sql, &[]).await?.fetchone()?;
        row.and_then(|r| r.get("count").and_then(SqlValue::as_i64))
            .ok_or_else(|| MigrateError::InvalidData(format!("no row count returned for {}", table)))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.backend.is_some() && self.in_transaction {
            debug!(
                "{} connection dropped with an open transaction; uncommitted writes are discarded",
                self.kind
            );
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

/// Report backend failures against the statement the caller wrote.
fn with_canonical_query(err: MigrateError, canonical: &str) -> MigrateError {
    match err {
        MigrateError::Query {
            params, message, ..
        } => MigrateError::Query {
            query: canonical.to_string(),
            params,
            message,
        },
        MigrateError::ConstraintViolation {
            params, message, ..
        } => MigrateError::ConstraintViolation {
            query: canonical.to_string(),
            params,
            message,
        },
        other => other,
    }
}

fn check_savepoint_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(MigrateError::query(
            format!("SAVEPOINT {}", name),
            &[],
            "invalid savepoint name",
        ))
    }
}

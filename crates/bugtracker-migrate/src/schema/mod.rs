//! Target schema initialization.
//!
//! [`ensure_schema`] creates the `users` and `bugs` tables if they are
//! missing and upgrades older `bugs` tables that predate the
//! `reported_by_user_id` and `file_path` columns. Applying it to a store that
//! is already current changes nothing.

use serde::Serialize;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::core::model::{BUGS_TABLE, USERS_TABLE};
use crate::drivers::BackendKind;
use crate::error::{MigrateError, Result};

const PG_CREATE_USERS: &str = "CREATE TABLE IF NOT EXISTS users (
    id SERIAL PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    is_admin BOOLEAN DEFAULT FALSE,
    active BOOLEAN DEFAULT TRUE,
    m18 BOOLEAN DEFAULT FALSE,
    eshop BOOLEAN DEFAULT FALSE,
    jetplus BOOLEAN DEFAULT FALSE,
    sugarcrm BOOLEAN DEFAULT FALSE,
    shopline BOOLEAN DEFAULT FALSE
)";

const PG_CREATE_BUGS: &str = "CREATE TABLE IF NOT EXISTS bugs (
    id SERIAL PRIMARY KEY,
    report_date TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP,
    system TEXT NOT NULL,
    bug_details TEXT NOT NULL,
    reported_by TEXT NOT NULL,
    status TEXT DEFAULT '開放中',
    priority TEXT DEFAULT '中',
    severity TEXT DEFAULT '中',
    assigned_to TEXT,
    resolution_date TIMESTAMPTZ,
    notes TEXT,
    reported_by_user_id INTEGER REFERENCES users(id),
    file_path TEXT
)";

const SQLITE_CREATE_USERS: &str = "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    is_admin BOOLEAN DEFAULT 0
)";

const SQLITE_CREATE_BUGS: &str = "CREATE TABLE IF NOT EXISTS bugs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_date DATETIME DEFAULT CURRENT_TIMESTAMP,
    system TEXT NOT NULL,
    bug_details TEXT NOT NULL,
    reported_by TEXT NOT NULL,
    status TEXT DEFAULT '開放中',
    priority TEXT DEFAULT '中',
    severity TEXT DEFAULT '中',
    assigned_to TEXT,
    resolution_date DATETIME,
    notes TEXT,
    reported_by_user_id INTEGER REFERENCES users(id),
    file_path TEXT
)";

/// Columns added to `bugs` after its first release, with their definitions.
const BUGS_UPGRADE_COLUMNS: &[(&str, &str)] = &[
    ("reported_by_user_id", "INTEGER REFERENCES users(id)"),
    ("file_path", "TEXT"),
];

/// What [`ensure_schema`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    /// Tables that did not exist and were created.
    pub created_tables: Vec<String>,
    /// `table.column` entries added to existing tables.
    pub added_columns: Vec<String>,
}

impl SchemaReport {
    /// Whether the store was already current.
    pub fn is_unchanged(&self) -> bool {
        self.created_tables.is_empty() && self.added_columns.is_empty()
    }
}

/// Ensure the bug-tracker schema exists on the store behind `conn`.
///
/// The DDL is committed before returning. Any DDL failure rolls back and is
/// reported as a schema error.
pub async fn ensure_schema(conn: &mut Connection) -> Result<SchemaReport> {
    match apply(conn).await {
        Ok(report) => {
            conn.commit().await?;
            if report.is_unchanged() {
                debug!("Schema already current");
            } else {
                info!(
                    "Schema updated: created {:?}, added {:?}",
                    report.created_tables, report.added_columns
                );
            }
            Ok(report)
        }
        Err(e) => {
            // Rollback failure would only hide the original error
            let _ = conn.rollback().await;
            Err(match e {
                MigrateError::Schema(_) | MigrateError::Connection { .. } => e,
                other => MigrateError::Schema(other.to_string()),
            })
        }
    }
}

async fn apply(conn: &mut Connection) -> Result<SchemaReport> {
    let (create_users, create_bugs) = match conn.kind() {
        BackendKind::Postgres => (PG_CREATE_USERS, PG_CREATE_BUGS),
        BackendKind::Sqlite => (SQLITE_CREATE_USERS, SQLITE_CREATE_BUGS),
    };

    let mut report = SchemaReport::default();

    // users first: bugs references it
    for (table, ddl) in [(USERS_TABLE, create_users), (BUGS_TABLE, create_bugs)] {
        if !conn.table_exists(table).await? {
            conn.execute(ddl, &[]).await?;
            report.created_tables.push(table.to_string());
        }
    }

    let existing = conn.column_names(BUGS_TABLE).await?;
    for (column, definition) in BUGS_UPGRADE_COLUMNS {
        if existing.iter().any(|c| c == column) {
            continue;
        }
        let sql = match conn.kind() {
            BackendKind::Postgres => format!(
                "ALTER TABLE bugs ADD COLUMN IF NOT EXISTS {} {}",
                column, definition
            ),
            BackendKind::Sqlite => format!("ALTER TABLE bugs ADD COLUMN {} {}", column, definition),
        };
        conn.execute(&sql, &[]).await?;
        report.added_columns.push(format!("{}.{}", BUGS_TABLE, column));
    }

    Ok(report)
}

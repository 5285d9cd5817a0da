//! Migration orchestrator - main workflow coordinator.
//!
//! A run copies every `users` row and then every `bugs` row from the source
//! store into the target store with keyed upserts, committing once per table,
//! and finishes by comparing row counts. Re-running converges the target on
//! the source again; rows that only exist in the target are left alone.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, StoreConfig};
use crate::connection::Connection;
use crate::core::model::{User, BUGS_TABLE, USERS_TABLE};
use crate::core::record::Record;
use crate::core::traits::Dialect;
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};
use crate::schema::{ensure_schema, SchemaReport};
use crate::verify::{verify_counts, VerificationReport};

/// Savepoint wrapped around every row upsert.
const ROW_SAVEPOINT: &str = "migrate_row";

/// Columns copied for each user.
const USER_COLUMNS: &[&str] = &["id", "username", "password_hash", "is_admin"];

/// Columns copied for each bug.
const BUG_COLUMNS: &[&str] = &[
    "id",
    "report_date",
    "system",
    "bug_details",
    "reported_by",
    "status",
    "priority",
    "severity",
    "assigned_to",
    "resolution_date",
    "notes",
    "reported_by_user_id",
    "file_path",
];

/// Bug columns that are written as NULL when empty or absent in the source.
const BUG_OPTIONAL_COLUMNS: &[&str] = &[
    "assigned_to",
    "resolution_date",
    "notes",
    "reported_by_user_id",
    "file_path",
];

/// How one table is copied.
struct TableSpec {
    name: &'static str,
    key: &'static str,
    columns: &'static [&'static str],
    /// Turns a source row into upsert parameters in `columns` order.
    params: fn(&Record) -> Result<Vec<SqlValue>>,
    /// Identifies a row in log messages.
    label: fn(&Record) -> String,
}

const USERS: TableSpec = TableSpec {
    name: USERS_TABLE,
    key: "id",
    columns: USER_COLUMNS,
    params: user_params,
    label: user_label,
};

const BUGS: TableSpec = TableSpec {
    name: BUGS_TABLE,
    key: "id",
    columns: BUG_COLUMNS,
    params: bug_params,
    label: bug_label,
};

fn user_params(row: &Record) -> Result<Vec<SqlValue>> {
    let user = User::from_record(row)?;
    Ok(vec![
        user.id.into(),
        user.username.into(),
        user.password_hash.into(),
        user.is_admin.into(),
    ])
}

fn user_label(row: &Record) -> String {
    match row.get("username").and_then(SqlValue::as_str) {
        Some(name) => format!("user {}", name),
        None => format!("user {}", key_of(row)),
    }
}

fn bug_params(row: &Record) -> Result<Vec<SqlValue>> {
    let mut params = Vec::with_capacity(BUG_COLUMNS.len());
    for column in BUG_COLUMNS {
        // Older stores lack the newer columns entirely
        let value = row.get(*column).cloned().unwrap_or(SqlValue::Null);
        params.push(normalize_bug_value(column, value));
    }
    if params[0].is_null() {
        return Err(MigrateError::InvalidData("bug row without id".into()));
    }
    Ok(params)
}

fn normalize_bug_value(column: &str, value: SqlValue) -> SqlValue {
    if !BUG_OPTIONAL_COLUMNS.contains(&column) {
        return value;
    }
    if value.is_blank() {
        return SqlValue::Null;
    }
    // 0 was written by forms that had no logged-in user
    if column == "reported_by_user_id" && value.as_i64() == Some(0) {
        return SqlValue::Null;
    }
    value
}

fn bug_label(row: &Record) -> String {
    format!("bug {}", key_of(row))
}

fn key_of(row: &Record) -> String {
    row.get("id")
        .map(|v| v.to_string())
        .unwrap_or_else(|| "?".to_string())
}

/// A row that could not be written.
#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    /// Row identity (username or id).
    pub row: String,
    /// Why the row was rejected.
    pub error: String,
    /// Whether the target rejected it for an integrity constraint.
    pub constraint_violation: bool,
}

/// Outcome of copying one table.
#[derive(Debug, Clone, Serialize)]
pub struct BatchStats {
    pub table: String,
    /// Rows read from the source.
    pub read: usize,
    /// Rows upserted into the target.
    pub migrated: usize,
    /// Rows skipped after a row-level failure.
    pub failed: usize,
    pub failures: Vec<RowFailure>,
    pub duration_ms: u64,
}

impl BatchStats {
    fn new(table: &str, read: usize) -> Self {
        Self {
            table: table.to_string(),
            read,
            migrated: 0,
            failed: 0,
            failures: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed", "completed_with_errors" or "count_mismatch".
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Tables created or upgraded on the target.
    pub schema: SchemaReport,

    pub users: BatchStats,

    pub bugs: BatchStats,

    /// Source counts (taken before the run) against target counts.
    pub verification: VerificationReport,
}

impl MigrationResult {
    /// True when the target row counts equal the source row counts.
    pub fn is_success(&self) -> bool {
        self.verification.is_complete()
    }

    /// Total rows skipped across both tables.
    pub fn rows_failed(&self) -> usize {
        self.users.failed + self.bugs.failed
    }

    /// Convert result to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Reachability of one store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreHealth {
    pub connected: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Which of the bug-tracker tables exist.
    pub tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check result for both stores.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source: StoreHealth,
    pub target: StoreHealth,
    pub healthy: bool,
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Abort on the first failing row instead of skipping it.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.config.migration.strict = strict;
        self
    }

    /// Run the migration.
    ///
    /// Both connections are closed before this returns, on success and on
    /// every error path.
    pub async fn run(&self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        info!("Step 1: Connecting to source ({})", self.config.source.describe());
        let mut source = Connection::acquire(&self.config.source).await?;

        info!("Step 2: Connecting to target ({})", self.config.target.describe());
        let mut target = match Connection::acquire(&self.config.target).await {
            Ok(conn) => conn,
            Err(e) => {
                close_quietly(&mut source, "source").await;
                return Err(e);
            }
        };

        let outcome = self.migrate(&mut source, &mut target).await;

        close_quietly(&mut source, "source").await;
        close_quietly(&mut target, "target").await;

        let (schema, users, bugs, verification) = outcome?;

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let status = if !verification.is_complete() {
            "count_mismatch"
        } else if users.failed + bugs.failed > 0 {
            "completed_with_errors"
        } else {
            "completed"
        };

        let result = MigrationResult {
            run_id,
            status: status.to_string(),
            duration_seconds,
            started_at,
            completed_at,
            schema,
            users,
            bugs,
            verification,
        };

        info!(
            "Migration {}: {} users, {} bugs migrated ({} rows skipped) in {:.1}s",
            result.status,
            result.users.migrated,
            result.bugs.migrated,
            result.rows_failed(),
            result.duration_seconds
        );

        Ok(result)
    }

    async fn migrate(
        &self,
        source: &mut Connection,
        target: &mut Connection,
    ) -> Result<(SchemaReport, BatchStats, BatchStats, VerificationReport)> {
        let schema = ensure_schema(target).await?;

        // Counts and rows come from the same source transaction.
        info!("Step 3: Reading source data");
        let users_count = source.count_rows(USERS_TABLE).await?;
        let bugs_count = source.count_rows(BUGS_TABLE).await?;
        info!("Found {} users and {} bugs", users_count, bugs_count);

        info!("Step 4: Migrating users");
        let users = self.copy_table(source, target, &USERS).await?;

        info!("Step 5: Migrating bugs");
        let bugs = self.copy_table(source, target, &BUGS).await?;

        // Release the source snapshot
        source.rollback().await?;

        info!("Step 6: Verifying row counts");
        let verification = verify_counts(
            target,
            &[(USERS_TABLE, users_count), (BUGS_TABLE, bugs_count)],
        )
        .await?;
        target.commit().await?;

        if !verification.is_complete() {
            warn!("Data count mismatch after migration");
        }

        Ok((schema, users, bugs, verification))
    }

    /// Upsert every source row of one table, then commit.
    async fn copy_table(
        &self,
        source: &mut Connection,
        target: &mut Connection,
        table: &TableSpec,
    ) -> Result<BatchStats> {
        let start = Instant::now();
        let select = format!(
            "SELECT * FROM {} ORDER BY {}",
            source.dialect().quote_ident(table.name),
            source.dialect().quote_ident(table.key)
        );
        let rows = source.execute(&select, &[]).await?.fetchall()?;
        let upsert = target
            .dialect()
            .build_upsert_query(table.name, table.columns, &[table.key]);
        debug!("{} upsert: {}", table.name, upsert);

        let mut stats = BatchStats::new(table.name, rows.len());

        for row in &rows {
            let outcome = match (table.params)(row) {
                Ok(params) => self.upsert_row(target, &upsert, &params).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => stats.migrated += 1,
                Err(e) if e.is_row_level() => {
                    let label = (table.label)(row);
                    warn!("Error migrating {}: {}", label, e);
                    if self.config.migration.strict {
                        target.rollback().await?;
                        return Err(MigrateError::transfer(
                            table.name,
                            format!("{} failed in strict mode: {}", label, e),
                        ));
                    }
                    stats.failed += 1;
                    stats.failures.push(RowFailure {
                        row: label,
                        constraint_violation: matches!(
                            e,
                            MigrateError::ConstraintViolation { .. }
                        ),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        target.commit().await?;

        if let Some(sql) = target.dialect().reset_sequence_query(table.name, table.key) {
            target.execute(&sql, &[]).await?;
            target.commit().await?;
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Migrated {}/{} {} ({} failed)",
            stats.migrated, stats.read, table.name, stats.failed
        );
        Ok(stats)
    }

    /// One upsert inside its own savepoint, so a rejected row leaves the
    /// batch transaction usable.
    async fn upsert_row(
        &self,
        target: &mut Connection,
        upsert: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        target.savepoint(ROW_SAVEPOINT).await?;
        match target.execute(upsert, params).await {
            Ok(_) => target.release_savepoint(ROW_SAVEPOINT).await,
            // The transaction is likely gone; report why, not the cleanup failure
            Err(e) if !e.is_row_level() => Err(e),
            Err(e) => {
                target.rollback_to_savepoint(ROW_SAVEPOINT).await?;
                target.release_savepoint(ROW_SAVEPOINT).await?;
                Err(e)
            }
        }
    }

    /// Compare source and target row counts without writing anything.
    pub async fn validate(&self) -> Result<VerificationReport> {
        let mut source = Connection::acquire(&self.config.source).await?;
        let mut target = match Connection::acquire(&self.config.target).await {
            Ok(conn) => conn,
            Err(e) => {
                close_quietly(&mut source, "source").await;
                return Err(e);
            }
        };

        let outcome = compare_counts(&mut source, &mut target).await;

        close_quietly(&mut source, "source").await;
        close_quietly(&mut target, "target").await;
        outcome
    }

    /// Connect to both stores and report version, latency and tables present.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let source = probe(&self.config.source, "source").await;
        let target = probe(&self.config.target, "target").await;
        let healthy = source.connected && target.connected;
        Ok(HealthCheckResult {
            source,
            target,
            healthy,
        })
    }

    /// Apply the schema to the target store only.
    pub async fn init_schema(&self) -> Result<SchemaReport> {
        let mut target = Connection::acquire(&self.config.target).await?;
        let outcome = ensure_schema(&mut target).await;
        close_quietly(&mut target, "target").await;
        outcome
    }
}

async fn compare_counts(
    source: &mut Connection,
    target: &mut Connection,
) -> Result<VerificationReport> {
    let mut report = VerificationReport::default();
    for table in [USERS_TABLE, BUGS_TABLE] {
        let source_count = source.count_rows(table).await?;
        let target_count = if target.table_exists(table).await? {
            target.count_rows(table).await?
        } else {
            0
        };
        report.push(table, source_count, target_count);
    }
    source.rollback().await?;
    target.rollback().await?;
    Ok(report)
}

async fn probe(config: &StoreConfig, role: &str) -> StoreHealth {
    let start = Instant::now();
    let mut conn = match Connection::acquire(config).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Health check: {} unreachable: {}", role, e);
            return StoreHealth {
                latency_ms: start.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
                ..StoreHealth::default()
            };
        }
    };

    let mut health = StoreHealth {
        connected: true,
        ..StoreHealth::default()
    };

    match inspect(&mut conn).await {
        Ok((version, tables)) => {
            health.version = Some(version);
            health.tables = tables;
        }
        Err(e) => health.error = Some(e.to_string()),
    }
    health.latency_ms = start.elapsed().as_millis() as u64;

    close_quietly(&mut conn, role).await;
    health
}

async fn inspect(conn: &mut Connection) -> Result<(String, Vec<String>)> {
    let version = conn.server_version().await?;
    let mut tables = Vec::new();
    for table in [USERS_TABLE, BUGS_TABLE] {
        if conn.table_exists(table).await? {
            tables.push(table.to_string());
        }
    }
    Ok((version, tables))
}

async fn close_quietly(conn: &mut Connection, role: &str) {
    if let Err(e) = conn.close().await {
        warn!("Failed to close {} connection: {}", role, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::{BackendConnection, StatementOutput};
    use crate::drivers::BackendKind;

    fn bug_row(pairs: Vec<(&str, SqlValue)>) -> Record {
        Record::from_pairs(pairs)
    }

    #[test]
    fn test_bug_params_fill_missing_columns_with_null() {
        let row = bug_row(vec![
            ("id", SqlValue::I64(3)),
            ("report_date", SqlValue::from("2025-01-02 03:04:05")),
            ("system", SqlValue::from("core")),
            ("bug_details", SqlValue::from("npe")),
            ("reported_by", SqlValue::from("alice")),
            ("status", SqlValue::from("開放中")),
            ("priority", SqlValue::from("中")),
            ("severity", SqlValue::from("重大")),
            ("assigned_to", SqlValue::from("  ")),
            ("resolution_date", SqlValue::from("")),
            ("notes", SqlValue::Null),
        ]);
        let params = bug_params(&row).unwrap();
        assert_eq!(params.len(), BUG_COLUMNS.len());
        // Stored labels are copied verbatim
        assert_eq!(params[5], SqlValue::from("開放中"));
        for idx in 8..BUG_COLUMNS.len() {
            assert!(params[idx].is_null(), "{} should be NULL", BUG_COLUMNS[idx]);
        }
    }

    #[test]
    fn test_zero_reporter_id_becomes_null() {
        assert!(normalize_bug_value("reported_by_user_id", SqlValue::I64(0)).is_null());
        assert_eq!(
            normalize_bug_value("reported_by_user_id", SqlValue::I64(7)),
            SqlValue::I64(7)
        );
        // Required columns are never rewritten
        assert_eq!(normalize_bug_value("system", SqlValue::from("")), SqlValue::from(""));
    }

    #[test]
    fn test_user_params_normalize_admin_flag() {
        let row = Record::from_pairs([
            ("id", SqlValue::I64(1)),
            ("username", SqlValue::from("alice")),
            ("password_hash", SqlValue::from("h1")),
            ("is_admin", SqlValue::I64(1)),
        ]);
        let params = user_params(&row).unwrap();
        assert_eq!(params[3], SqlValue::Bool(true));
        assert_eq!(user_label(&row), "user alice");
    }

    #[test]
    fn test_user_without_username_is_row_level_error() {
        let row = Record::from_pairs([("id", SqlValue::I64(1))]);
        let err = user_params(&row).unwrap_err();
        assert!(err.is_row_level());
        assert_eq!(user_label(&row), "user 1");
    }

    /// Accepts transaction control until the link drops mid-statement.
    struct DroppedLink;

    #[async_trait::async_trait]
    impl BackendConnection for DroppedLink {
        async fn run(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<StatementOutput> {
            Err(MigrateError::connection("postgres", "server closed the connection"))
        }

        async fn batch_execute(&mut self, sql: &str) -> Result<()> {
            if sql.starts_with("ROLLBACK TO") {
                return Err(MigrateError::query(sql, &[], "no connection to the server"));
            }
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_connection_loss_is_not_masked_by_savepoint_cleanup() {
        let config = Config {
            source: StoreConfig::sqlite("source.db"),
            target: StoreConfig::sqlite("target.db"),
            migration: Default::default(),
        };
        let orchestrator = Orchestrator::new(config);
        let mut target = Connection::from_backend(BackendKind::Postgres, Box::new(DroppedLink));

        let err = orchestrator
            .upsert_row(&mut target, "INSERT INTO users (id) VALUES (?)", &[SqlValue::I64(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Connection { .. }), "{err}");
        assert!(err.to_string().contains("server closed the connection"));
    }
}

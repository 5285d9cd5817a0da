//! SQLite backend over a single sqlx connection.

use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{
    Arguments, Column, ConnectOptions, Connection as _, Executor, Row, Statement, TypeInfo, ValueRef,
};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::config::StoreConfig;
use crate::core::record::Columns;
use crate::core::traits::{BackendConnection, StatementOutput};
use crate::core::value::SqlValue;
use crate::dialect::returns_rows;
use crate::error::{MigrateError, Result};

const BACKEND: &str = "sqlite";

/// A live SQLite connection with foreign-key enforcement on.
pub struct SqliteBackend {
    conn: SqliteConnection,
}

impl SqliteBackend {
    /// Open the database file named by the store configuration.
    ///
    /// A missing file is a connection error unless `create_if_missing` is set.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let path = config
            .path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| MigrateError::connection(BACKEND, "no database path configured"))?;

        if !config.create_if_missing && !path.exists() {
            return Err(MigrateError::connection(
                BACKEND,
                format!("database file not found: {}", path.display()),
            ));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(config.create_if_missing)
            .foreign_keys(true)
            .disable_statement_logging();

        let conn = options
            .connect()
            .await
            .map_err(|e| MigrateError::connection(BACKEND, format!("{}: {}", path.display(), e)))?;

        debug!("Opened SQLite database {}", path.display());
        Ok(Self { conn })
    }
}

#[async_trait]
impl BackendConnection for SqliteBackend {
    async fn run(&mut self, sql: &str, params: &[SqlValue]) -> Result<StatementOutput> {
        let mut args = SqliteArguments::default();
        for value in params {
            bind_value(&mut args, value).map_err(|e| MigrateError::query(sql, params, e))?;
        }

        let query = sqlx::query_with(sql, args);

        if !returns_rows(sql) {
            let result = (&mut self.conn)
                .execute(query)
                .await
                .map_err(|e| map_error(sql, params, e))?;
            return Ok(StatementOutput::affected(result.rows_affected()));
        }

        let fetched = (&mut self.conn)
            .fetch_all(query)
            .await
            .map_err(|e| map_error(sql, params, e))?;

        let columns = match fetched.first() {
            Some(row) => names(row.columns()),
            // No row to read names from; the prepared statement still has them.
            None => {
                let statement = (&mut self.conn)
                    .prepare(sql)
                    .await
                    .map_err(|e| map_error(sql, params, e))?;
                names(statement.columns())
            }
        };
        let mut rows = Vec::with_capacity(fetched.len());
        for row in &fetched {
            rows.push(decode_row(row).map_err(|e| MigrateError::query(sql, params, e))?);
        }

        Ok(StatementOutput {
            columns,
            rows_affected: rows.len() as u64,
            rows,
        })
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        (&mut self.conn)
            .execute(sql)
            .await
            .map(|_| ())
            .map_err(|e| map_error(sql, &[], e))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| MigrateError::connection(BACKEND, e))
    }
}

fn bind_value(args: &mut SqliteArguments<'_>, value: &SqlValue) -> std::result::Result<(), String> {
    let bound = match value {
        SqlValue::Null => args.add(None::<i64>),
        SqlValue::Bool(v) => args.add(*v),
        SqlValue::I64(v) => args.add(*v),
        SqlValue::F64(v) => args.add(*v),
        SqlValue::Text(v) => args.add(v.clone()),
        SqlValue::Bytes(v) => args.add(v.clone()),
        SqlValue::Date(v) => args.add(v.format("%Y-%m-%d").to_string()),
        SqlValue::Timestamp(v) => args.add(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        SqlValue::TimestampTz(v) => args.add(v.to_rfc3339()),
    };
    bound.map_err(|e| e.to_string())
}

fn names<C: Column>(columns: &[C]) -> Columns {
    columns
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>()
        .into()
}

/// Decode every column by its storage class, then narrow by declared type.
///
/// `BOOLEAN` columns come back as `Bool`, `DATETIME`/`TIMESTAMP` as
/// timestamps and `DATE` as dates. Expression columns and values that do not
/// parse as their declared type keep their storage class.
fn decode_row(row: &SqliteRow) -> std::result::Result<Vec<SqlValue>, String> {
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i).map_err(|e| e.to_string())?;
        if raw.is_null() {
            values.push(SqlValue::Null);
            continue;
        }
        let class = raw.type_info().name().to_ascii_uppercase();
        let value = match class.as_str() {
            "INTEGER" | "BOOLEAN" | "INT" | "BIGINT" => {
                SqlValue::I64(row.try_get_unchecked::<i64, _>(i).map_err(|e| e.to_string())?)
            }
            "REAL" | "NUMERIC" | "FLOAT" | "DOUBLE" => {
                SqlValue::F64(row.try_get_unchecked::<f64, _>(i).map_err(|e| e.to_string())?)
            }
            "BLOB" => SqlValue::Bytes(
                row.try_get_unchecked::<Vec<u8>, _>(i)
                    .map_err(|e| e.to_string())?,
            ),
            _ => SqlValue::Text(
                row.try_get_unchecked::<String, _>(i)
                    .map_err(|e| e.to_string())?,
            ),
        };
        values.push(narrow(value, column.type_info().name()));
    }
    Ok(values)
}

fn narrow(value: SqlValue, declared: &str) -> SqlValue {
    match declared.to_ascii_uppercase().as_str() {
        "BOOLEAN" => value.as_bool().map(SqlValue::Bool).unwrap_or(value),
        "DATETIME" | "TIMESTAMP" => match &value {
            SqlValue::Text(s) => parse_datetime(s).unwrap_or(value),
            _ => value,
        },
        "DATE" => match &value {
            SqlValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(SqlValue::Date)
                .unwrap_or(value),
            _ => value,
        },
        _ => value,
    }
}

/// Text with an offset becomes `TimestampTz`; the forms SQLite and `bind_value`
/// write without one become `Timestamp`.
fn parse_datetime(s: &str) -> Option<SqlValue> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(SqlValue::TimestampTz(dt.with_timezone(&Utc)));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(SqlValue::Timestamp)
}

fn map_error(sql: &str, params: &[SqlValue], err: sqlx::Error) -> MigrateError {
    if let Some(db_err) = err.as_database_error() {
        return match db_err.kind() {
            ErrorKind::ForeignKeyViolation
            | ErrorKind::UniqueViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => MigrateError::constraint(sql, params, db_err.message()),
            _ => MigrateError::query(sql, params, db_err.message()),
        };
    }
    match err {
        sqlx::Error::Io(e) => MigrateError::connection(BACKEND, e),
        other => MigrateError::query(sql, params, other),
    }
}

//! PostgreSQL backend over a single tokio-postgres client.
//!
//! Values are bound through a [`ToSql`] impl on [`SqlValue`] that adapts to the
//! parameter type the server inferred for each placeholder. A SQLite source
//! hands over timestamps as text and booleans as integers; the conversion to
//! `TIMESTAMPTZ` and `BOOLEAN` happens here.

use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::core::record::Columns;
use crate::core::traits::{BackendConnection, StatementOutput};
use crate::core::value::{parse_timestamp, SqlValue};
use crate::drivers::common::{tls, SslMode};
use crate::error::{MigrateError, Result};

const BACKEND: &str = "postgres";

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A live PostgreSQL session.
pub struct PostgresBackend {
    client: Client,
    connection_task: JoinHandle<()>,
}

impl PostgresBackend {
    /// Connect using the store's URL or discrete host settings.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        let mut pg_config = build_pg_config(config)?;

        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);
        pg_config.ssl_mode(ssl_mode.negotiation());

        let (client, connection_task) = match tls::connector(ssl_mode)? {
            Some(connector) => {
                let (client, connection) = pg_config
                    .connect(connector)
                    .await
                    .map_err(|e| MigrateError::connection(BACKEND, e))?;
                (client, spawn_connection(connection))
            }
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let (client, connection) = pg_config
                    .connect(NoTls)
                    .await
                    .map_err(|e| MigrateError::connection(BACKEND, e))?;
                (client, spawn_connection(connection))
            }
        };

        info!("Connected to PostgreSQL: {}", config.describe());
        Ok(Self {
            client,
            connection_task,
        })
    }
}

fn build_pg_config(config: &StoreConfig) -> Result<PgConfig> {
    if let Some(url) = config.url.as_deref().filter(|u| !u.is_empty()) {
        let lowered = url.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            return Err(MigrateError::connection(
                BACKEND,
                "expected a postgres:// connection string but got an HTTP URL; \
                 the project API URL cannot be used as a database connection",
            ));
        }
        return url
            .parse::<PgConfig>()
            .map_err(|e| MigrateError::connection(BACKEND, format!("invalid connection URL: {}", e)));
    }

    let host = config
        .host
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MigrateError::connection(BACKEND, "no connection URL or host configured"))?;

    let mut pg_config = PgConfig::new();
    pg_config.host(host);
    pg_config.port(config.port);
    pg_config.dbname(&config.database);
    if let Some(ref user) = config.user {
        pg_config.user(user);
    }
    if let Some(ref password) = config.password {
        pg_config.password(password);
    }
    Ok(pg_config)
}

fn spawn_connection<F>(connection: F) -> JoinHandle<()>
where
    F: Future<Output = std::result::Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("PostgreSQL connection closed with error: {}", e);
        }
    })
}

#[async_trait]
impl BackendConnection for PostgresBackend {
    async fn run(&mut self, sql: &str, params: &[SqlValue]) -> Result<StatementOutput> {
        let statement = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| map_error(sql, params, e))?;

        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        // The prepared statement knows whether it yields rows.
        if statement.columns().is_empty() {
            let affected = self
                .client
                .execute(&statement, &refs)
                .await
                .map_err(|e| map_error(sql, params, e))?;
            return Ok(StatementOutput::affected(affected));
        }

        let columns: Columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
            .into();

        let fetched = self
            .client
            .query(&statement, &refs)
            .await
            .map_err(|e| map_error(sql, params, e))?;

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
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| map_error(sql, &[], e))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let PostgresBackend {
            client,
            connection_task,
        } = *self;
        // The connection future resolves once every client handle is gone.
        drop(client);
        connection_task
            .await
            .map_err(|e| MigrateError::connection(BACKEND, e))?;
        debug!("PostgreSQL connection closed");
        Ok(())
    }
}

fn map_error(sql: &str, params: &[SqlValue], err: tokio_postgres::Error) -> MigrateError {
    if err.is_closed() {
        return MigrateError::connection(BACKEND, err);
    }
    let message = match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    };
    match err.code() {
        // Class 23: integrity constraint violation
        Some(code) if code.code().starts_with("23") => MigrateError::constraint(sql, params, message),
        _ => MigrateError::query(sql, params, message),
    }
}

fn decode_row(row: &Row) -> std::result::Result<Vec<SqlValue>, String> {
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value: SqlValue = if *ty == Type::BOOL {
            get::<bool>(row, i)?.into()
        } else if *ty == Type::INT2 {
            get::<i16>(row, i)?.map(i64::from).into()
        } else if *ty == Type::INT4 {
            get::<i32>(row, i)?.map(i64::from).into()
        } else if *ty == Type::INT8 {
            get::<i64>(row, i)?.into()
        } else if *ty == Type::FLOAT4 {
            get::<f32>(row, i)?.map(f64::from).into()
        } else if *ty == Type::FLOAT8 {
            get::<f64>(row, i)?.into()
        } else if *ty == Type::BYTEA {
            get::<Vec<u8>>(row, i)?.into()
        } else if *ty == Type::DATE {
            get::<NaiveDate>(row, i)?.into()
        } else if *ty == Type::TIMESTAMP {
            get::<NaiveDateTime>(row, i)?.into()
        } else if *ty == Type::TIMESTAMPTZ {
            get::<DateTime<Utc>>(row, i)?.into()
        } else {
            get::<String>(row, i)
                .map_err(|_| format!("unsupported column type {} for {}", ty, column.name()))?
                .into()
        };
        values.push(value);
    }
    Ok(values)
}

fn get<'a, T>(row: &'a Row, idx: usize) -> std::result::Result<Option<T>, String>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx).map_err(|e| e.to_string())
}

type BoxError = Box<dyn StdError + Sync + Send>;

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => {
                if *ty == Type::BOOL {
                    v.to_sql(ty, out)
                } else {
                    encode_int(i64::from(*v), ty, out)
                }
            }
            SqlValue::I64(v) => encode_int(*v, ty, out),
            SqlValue::F64(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if is_text(ty) {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Text(s) => encode_text(s, ty, out),
            SqlValue::Bytes(b) => b.to_sql(ty, out),
            SqlValue::Date(d) => {
                if is_text(ty) {
                    d.format("%Y-%m-%d").to_string().to_sql(ty, out)
                } else {
                    d.to_sql(ty, out)
                }
            }
            SqlValue::Timestamp(ts) => {
                if *ty == Type::TIMESTAMPTZ {
                    ts.and_utc().to_sql(ty, out)
                } else if is_text(ty) {
                    ts.format("%Y-%m-%d %H:%M:%S%.f").to_string().to_sql(ty, out)
                } else {
                    ts.to_sql(ty, out)
                }
            }
            SqlValue::TimestampTz(ts) => {
                if *ty == Type::TIMESTAMP {
                    ts.naive_utc().to_sql(ty, out)
                } else if is_text(ty) {
                    ts.to_rfc3339().to_sql(ty, out)
                } else {
                    ts.to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn is_text(ty: &Type) -> bool {
    *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
}

fn encode_int(v: i64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    if *ty == Type::BOOL {
        (v != 0).to_sql(ty, out)
    } else if *ty == Type::INT2 {
        i16::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        (v as f32).to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        (v as f64).to_sql(ty, out)
    } else if is_text(ty) {
        v.to_string().to_sql(ty, out)
    } else {
        v.to_sql(ty, out)
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    if *ty == Type::TIMESTAMPTZ {
        let ts = parse_timestamp(s).ok_or_else(|| format!("invalid timestamp: {:?}", s))?;
        ts.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMP {
        let ts = parse_timestamp(s).ok_or_else(|| format!("invalid timestamp: {:?}", s))?;
        ts.naive_utc().to_sql(ty, out)
    } else if *ty == Type::DATE {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .ok()
            .or_else(|| parse_timestamp(s).map(|ts| ts.date_naive()))
            .ok_or_else(|| format!("invalid date: {:?}", s))?;
        date.to_sql(ty, out)
    } else if *ty == Type::BOOL {
        let flag = SqlValue::Text(s.to_string())
            .as_bool()
            .ok_or_else(|| format!("invalid boolean: {:?}", s))?;
        flag.to_sql(ty, out)
    } else if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 {
        let v: i64 = s.trim().parse()?;
        encode_int(v, ty, out)
    } else if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
        let v: f64 = s.trim().parse()?;
        SqlValue::F64(v).to_sql(ty, out)
    } else {
        s.to_sql(ty, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: SqlValue, ty: &Type) -> std::result::Result<(IsNull, BytesMut), BoxError> {
        let mut out = BytesMut::new();
        let is_null = value.to_sql(ty, &mut out)?;
        Ok((is_null, out))
    }

    #[test]
    fn test_null_encodes_as_sql_null() {
        let (is_null, out) = encode(SqlValue::Null, &Type::TIMESTAMPTZ).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn test_integer_flag_binds_to_boolean() {
        let (_, out) = encode(SqlValue::I64(1), &Type::BOOL).unwrap();
        assert_eq!(&out[..], &[1]);
        let (_, out) = encode(SqlValue::I64(0), &Type::BOOL).unwrap();
        assert_eq!(&out[..], &[0]);
    }

    #[test]
    fn test_integer_narrows_to_int4() {
        let (_, out) = encode(SqlValue::I64(42), &Type::INT4).unwrap();
        assert_eq!(&out[..], &42i32.to_be_bytes());
        assert!(encode(SqlValue::I64(i64::MAX), &Type::INT4).is_err());
    }

    #[test]
    fn test_text_timestamp_binds_to_timestamptz() {
        let (_, from_text) =
            encode(SqlValue::Text("2024-01-01 10:00:00".into()), &Type::TIMESTAMPTZ).unwrap();
        let expected = parse_timestamp("2024-01-01 10:00:00").unwrap();
        let (_, direct) = encode(SqlValue::TimestampTz(expected), &Type::TIMESTAMPTZ).unwrap();
        assert_eq!(from_text, direct);
    }

    #[test]
    fn test_garbage_timestamp_is_rejected() {
        assert!(encode(SqlValue::Text("yesterday".into()), &Type::TIMESTAMPTZ).is_err());
    }

    #[test]
    fn test_http_url_is_rejected() {
        let cfg = StoreConfig::postgres_url("https://abc.supabase.co");
        let err = build_pg_config(&cfg).unwrap_err();
        assert!(matches!(err, MigrateError::Connection { .. }));
        assert!(err.to_string().contains("HTTP URL"));
    }

    #[test]
    fn test_connection_url_parses() {
        let cfg = StoreConfig::postgres_url("postgres://postgres:pw@localhost:5432/bugs");
        let pg = build_pg_config(&cfg).unwrap();
        assert_eq!(pg.get_dbname(), Some("bugs"));
        assert_eq!(pg.get_ports(), &[5432]);
    }
}

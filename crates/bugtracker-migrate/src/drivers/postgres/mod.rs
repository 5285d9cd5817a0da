//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresBackend`]: a single client session implementing `BackendConnection`

mod connection;
mod dialect;

pub use connection::PostgresBackend;
pub use dialect::PostgresDialect;

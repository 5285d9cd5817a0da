//! SQLite driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy for SQLite
//! - [`SqliteBackend`]: a single file connection implementing `BackendConnection`

mod connection;
mod dialect;

pub use connection::SqliteBackend;
pub use dialect::SqliteDialect;

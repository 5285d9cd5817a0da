//! # bugtracker-migrate
//!
//! Backend-agnostic store access for the bug tracker, and a one-way copy of
//! its data from the embedded SQLite file into PostgreSQL.
//!
//! This library provides:
//!
//! - **One connection API** over SQLite and PostgreSQL, with `?` parameter
//!   markers and explicit commit/rollback
//! - **Uniform rows** that can be read by column name or position
//! - **Idempotent schema setup** for the `users` and `bugs` tables, upgrading
//!   older `bugs` tables in place
//! - **Keyed upsert migration** of `users` then `bugs`, verified by row counts
//!
//! ## Example
//!
//! ```rust,no_run
//! use bugtracker_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> bugtracker_migrate::Result<()> {
//!     let config = Config::from_env()?;
//!     let result = Orchestrator::new(config).run().await?;
//!     println!(
//!         "Migrated {} users and {} bugs",
//!         result.users.migrated, result.bugs.migrated
//!     );
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod schema;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, StoreConfig};
pub use connection::{Connection, Cursor};
pub use self::core::{BugRecord, Record, SqlValue, User};
pub use drivers::BackendKind;
pub use error::{MigrateError, Result};
pub use orchestrator::{BatchStats, HealthCheckResult, MigrationResult, Orchestrator};
pub use schema::{ensure_schema, SchemaReport};
pub use verify::VerificationReport;

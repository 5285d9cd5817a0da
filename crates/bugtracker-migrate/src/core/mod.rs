//! Core abstractions for backend-agnostic store access.
//!
//! - [`value`]: SQL value representation shared by every backend
//! - [`record`]: the row materializer, one record type for every backend
//! - [`model`]: typed views of the `users` and `bugs` tables
//! - [`traits`]: backend connection and dialect traits
//!
//! Driver modules (`drivers/sqlite`, `drivers/postgres`) implement the traits;
//! everything above them (`connection`, `schema`, `orchestrator`) only sees
//! these types.

pub mod model;
pub mod record;
pub mod traits;
pub mod value;

pub use model::{BugRecord, BugStatus, Priority, Severity, User, BUGS_TABLE, USERS_TABLE};
pub use record::{ColumnIndex, Columns, Record};
pub use traits::{BackendConnection, Dialect, StatementOutput};
pub use value::SqlValue;

//! SQLite SQL dialect (Strategy pattern).

use crate::core::traits::Dialect;

/// SQLite dialect implementation.
///
/// SQLite natively uses the canonical `?` marker, so translation is a no-op.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn version_query(&self) -> &'static str {
        "SELECT 'SQLite ' || sqlite_version() AS version"
    }

    fn table_exists_query(&self) -> &'static str {
        "SELECT EXISTS (
            SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?
        ) AS present"
    }

    fn column_names_query(&self) -> &'static str {
        "SELECT name FROM pragma_table_info(?) ORDER BY cid"
    }

    fn reset_sequence_query(&self, _table: &str, _pk_col: &str) -> Option<String> {
        // AUTOINCREMENT keeps sqlite_sequence at the highest inserted id.
        None
    }
}

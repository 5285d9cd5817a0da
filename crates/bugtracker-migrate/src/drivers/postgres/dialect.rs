//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Provides PostgreSQL-specific SQL syntax for identifier quoting, parameter
//! placeholders, catalog lookups and sequence realignment.

use crate::core::traits::Dialect;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain double quotes by doubling them
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, index: usize) -> String {
        // PostgreSQL uses $1, $2, etc. (1-based)
        format!("${}", index)
    }

    fn version_query(&self) -> &'static str {
        "SELECT version() AS version"
    }

    fn table_exists_query(&self) -> &'static str {
        "SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = ?
        ) AS present"
    }

    fn column_names_query(&self) -> &'static str {
        "SELECT column_name::text AS name FROM information_schema.columns
         WHERE table_schema = current_schema() AND table_name = ?
         ORDER BY ordinal_position"
    }

    fn reset_sequence_query(&self, table: &str, pk_col: &str) -> Option<String> {
        // Explicit ids bypass the SERIAL sequence; move it past the highest id
        // so the next application insert does not collide.
        let quoted_table = self.quote_ident(table);
        let quoted_pk = self.quote_ident(pk_col);
        Some(format!(
            "SELECT setval(pg_get_serial_sequence('{}', '{}'), COALESCE(MAX({}), 1), MAX({}) IS NOT NULL) FROM {}",
            quoted_table.replace('\'', "''"),
            pk_col.replace('\'', "''"),
            quoted_pk,
            quoted_pk,
            quoted_table
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("name"), "\"name\"");
        assert_eq!(dialect.quote_ident("table\"name"), "\"table\"\"name\"");
        assert_eq!(dialect.quote_ident("Users"), "\"Users\"");
    }

    #[test]
    fn test_param_placeholder() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.param_placeholder(1), "$1");
        assert_eq!(dialect.param_placeholder(10), "$10");
    }

    #[test]
    fn test_translate_placeholders() {
        let dialect = PostgresDialect::new();
        let (sql, n) = dialect.translate_placeholders("SELECT * FROM users WHERE username = ?");
        assert_eq!(sql, "SELECT * FROM users WHERE username = $1");
        assert_eq!(n, 1);
    }

    #[test]
    fn test_build_upsert_query() {
        let dialect = PostgresDialect::new();
        let sql = dialect.build_upsert_query(
            "users",
            &["id", "username", "password_hash", "is_admin"],
            &["id"],
        );
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"id\", \"username\", \"password_hash\", \"is_admin\") \
             VALUES (?, ?, ?, ?) ON CONFLICT (\"id\") DO UPDATE SET \
             \"username\" = excluded.\"username\", \
             \"password_hash\" = excluded.\"password_hash\", \
             \"is_admin\" = excluded.\"is_admin\""
        );
    }

    #[test]
    fn test_build_upsert_query_pk_only() {
        let dialect = PostgresDialect::new();
        let sql = dialect.build_upsert_query("tags", &["id"], &["id"]);
        assert!(sql.ends_with("ON CONFLICT (\"id\") DO NOTHING"));
    }

    #[test]
    fn test_reset_sequence_query() {
        let dialect = PostgresDialect::new();
        let sql = dialect.reset_sequence_query("bugs", "id").unwrap();
        assert!(sql.starts_with("SELECT setval(pg_get_serial_sequence('\"bugs\"', 'id')"));
        assert!(sql.ends_with("FROM \"bugs\""));
    }
}

//! Statement classification.

use super::lexer::code_only;

/// Whether a statement produces a result set.
///
/// Queries (`SELECT`, `WITH`, `VALUES`, `PRAGMA`, `EXPLAIN`, `SHOW`) and DML
/// with a `RETURNING` clause are fetched; everything else is executed and
/// reports an affected-row count instead. Literals and comments never count.
pub fn returns_rows(sql: &str) -> bool {
    let code = code_only(sql);
    let keyword = leading_keyword(&code).to_ascii_uppercase();
    match keyword.as_str() {
        "SELECT" | "WITH" | "VALUES" | "PRAGMA" | "EXPLAIN" | "SHOW" => true,
        _ => code
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .any(|word| word.eq_ignore_ascii_case("RETURNING")),
    }
}

fn leading_keyword(code: &str) -> &str {
    let rest = code.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

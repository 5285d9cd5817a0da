//! Canonical placeholder translation.
//!
//! Every call site writes positional `?` markers. Backends that use a
//! different syntax get the markers rewritten here. Markers inside string
//! literals, quoted identifiers and comments are left alone (see [`super::lexer`]).

use super::lexer::{scan, Piece};

/// Rewrite each `?` marker with `placeholder(n)` for n = 1, 2, ...
///
/// Returns the rewritten SQL and the number of markers replaced.
pub fn translate<F>(sql: &str, mut placeholder: F) -> (String, usize)
where
    F: FnMut(usize) -> String,
{
    let mut out = String::with_capacity(sql.len() + 8);
    let mut count = 0;

    scan(sql, |piece| match piece {
        Piece::Code('?') => {
            count += 1;
            out.push_str(&placeholder(count));
        }
        Piece::Code(c) => out.push(c),
        Piece::Opaque(run) => out.push_str(run),
    });

    (out, count)
}

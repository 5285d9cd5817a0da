//! Splits SQL text into code and opaque runs.
//!
//! Opaque runs are the parts where a `?` or a keyword means nothing: string
//! literals (`'...'`, PostgreSQL `E'...'` with backslash escapes, `$tag$...$tag$`
//! dollar quoting), quoted identifiers and comments. Unterminated runs extend
//! to the end of the text.

/// One piece of SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece<'a> {
    /// A character outside any literal, identifier or comment.
    Code(char),
    /// A complete literal, quoted identifier or comment, delimiters included.
    Opaque(&'a str),
}

/// Feed `sql` to `visit` piece by piece, in order.
pub fn scan<'a, F>(sql: &'a str, mut visit: F)
where
    F: FnMut(Piece<'a>),
{
    let mut pos = 0;
    let mut prev: Option<char> = None;

    while let Some(c) = sql[pos..].chars().next() {
        let rest = &sql[pos..];
        match opaque_len(rest, prev) {
            Some(len) => {
                visit(Piece::Opaque(&rest[..len]));
                pos += len;
                prev = rest[..len].chars().next_back();
            }
            None => {
                visit(Piece::Code(c));
                pos += c.len_utf8();
                prev = Some(c);
            }
        }
    }
}

/// Code-only view of `sql`: every opaque run becomes a single space.
pub fn code_only(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    scan(sql, |piece| match piece {
        Piece::Code(c) => out.push(c),
        Piece::Opaque(_) => out.push(' '),
    });
    out
}

fn opaque_len(rest: &str, prev: Option<char>) -> Option<usize> {
    let after_word = prev.is_some_and(is_ident_char);

    if rest.starts_with("--") {
        return Some(rest.find('\n').map(|i| i + 1).unwrap_or(rest.len()));
    }
    if rest.starts_with("/*") {
        return Some(rest[2..].find("*/").map(|i| i + 4).unwrap_or(rest.len()));
    }
    if !after_word && (rest.starts_with("E'") || rest.starts_with("e'")) {
        return Some(1 + quoted_len(&rest[1..], '\'', true));
    }
    if rest.starts_with('\'') {
        return Some(quoted_len(rest, '\'', false));
    }
    if rest.starts_with('"') {
        return Some(quoted_len(rest, '"', false));
    }
    if rest.starts_with('$') && !after_word {
        let tag = dollar_tag(rest)?;
        let body = &rest[tag.len()..];
        return Some(
            body.find(tag)
                .map(|i| tag.len() + i + tag.len())
                .unwrap_or(rest.len()),
        );
    }
    None
}

/// Length of a quoted run starting at `rest[0] == quote`. A doubled quote is
/// an escaped quote; with `backslash` set, `\` escapes the next character.
fn quoted_len(rest: &str, quote: char, backslash: bool) -> usize {
    let mut chars = rest.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        if backslash && c == '\\' {
            chars.next();
        } else if c == quote {
            match chars.peek() {
                Some(&(_, next)) if next == quote => {
                    chars.next();
                }
                _ => return i + c.len_utf8(),
            }
        }
    }
    rest.len()
}

/// `$$` or `$name$` at the start of `rest`. `$1` style parameters are not tags.
fn dollar_tag(rest: &str) -> Option<&str> {
    let body = &rest[1..];
    let end = body
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(body.len());
    let name = &body[..end];
    if name.starts_with(|c: char| c.is_ascii_digit()) || !body[end..].starts_with('$') {
        return None;
    }
    Some(&rest[..end + 2])
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

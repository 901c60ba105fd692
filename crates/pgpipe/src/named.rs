//! `:name` placeholder support on top of Postgres' positional `$n` parameters.
//!
//! The scanner skips string literals (including `E'...'` escape strings),
//! quoted identifiers, dollar-quoted bodies and comments, and leaves `::type`
//! casts alone. A statement may use `:name` or `$n` placeholders, not both.

use crate::args::NamedArgs;
use crate::error::{PipeError, PipeResult};
use crate::value::Value;

/// A statement with its named placeholders rewritten to `$1, $2, ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedStatement {
    sql: String,
    names: Vec<String>,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Index just past the closing `quote`, honouring doubled quotes as escapes.
///
/// With `backslash`, `\` also escapes the byte after it.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, backslash: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if backslash && bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Whether the `'` at `start` opens an `E'...'` escape string.
fn is_escape_string(bytes: &[u8], start: usize) -> bool {
    match start.checked_sub(1).map(|p| bytes[p]) {
        Some(b'E' | b'e') => start < 2 || !is_ident_char(bytes[start - 2]),
        _ => false,
    }
}

/// Dollar-quote tag at `start` (`$$` or `$tag$`), if any.
fn dollar_tag(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() && is_ident_char(bytes[i]) {
        i += 1;
    }
    if bytes.get(i) == Some(&b'$') && (i == start + 1 || is_ident_start(bytes[start + 1])) {
        Some(i + 1 - start)
    } else {
        None
    }
}

impl NamedStatement {
    /// Scan `sql` and rewrite named placeholders.
    ///
    /// Fails with [`PipeError::MixedPlaceholders`] when `sql` also contains
    /// positional `$n` parameters, which would alias the rewritten ones.
    pub fn parse(sql: &str) -> PipeResult<Self> {
        let bytes = sql.as_bytes();
        let mut out = String::with_capacity(sql.len());
        let mut names: Vec<String> = Vec::new();
        // Start of the not-yet-copied input.
        let mut copied = 0;
        let mut positional = false;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\'' => i = skip_quoted(bytes, i, b'\'', is_escape_string(bytes, i)),
                b'"' => i = skip_quoted(bytes, i, b'"', false),
                b'-' if bytes.get(i + 1) == Some(&b'-') => {
                    i = sql[i..].find('\n').map_or(bytes.len(), |p| i + p + 1);
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i = sql[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2);
                }
                b'$' => match dollar_tag(bytes, i) {
                    Some(len) => {
                        let tag = &sql[i..i + len];
                        i = sql[i + len..]
                            .find(tag)
                            .map_or(bytes.len(), |p| i + len + p + len);
                    }
                    None => {
                        positional |= bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
                        i += 1;
                    }
                },
                b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
                b':' if bytes.get(i + 1).is_some_and(|&b| is_ident_start(b)) => {
                    let mut end = i + 2;
                    while end < bytes.len() && is_ident_char(bytes[end]) {
                        end += 1;
                    }
                    let name = &sql[i + 1..end];
                    let n = match names.iter().position(|existing| existing == name) {
                        Some(pos) => pos + 1,
                        None => {
                            names.push(name.to_string());
                            names.len()
                        }
                    };
                    out.push_str(&sql[copied..i]);
                    out.push('$');
                    out.push_str(&n.to_string());
                    copied = end;
                    i = end;
                }
                _ => i += 1,
            }
        }
        out.push_str(&sql[copied..]);

        if positional && !names.is_empty() {
            return Err(PipeError::MixedPlaceholders);
        }
        Ok(Self { sql: out, names })
    }

    /// The rewritten, positional SQL.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Placeholder names in `$n` order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Positional parameters for `args`, in `$n` order.
    pub fn bind(&self, args: &NamedArgs) -> PipeResult<Vec<Value>> {
        self.names
            .iter()
            .map(|name| {
                args.get(name)
                    .cloned()
                    .ok_or_else(|| PipeError::MissingParameter(name.clone()))
            })
            .collect()
    }
}

/// Render `sql` with `:name` placeholders replaced by quoted values, on one line.
///
/// Only for logs; the output is not safe to execute.
pub fn render_debug_sql(sql: &str, args: &NamedArgs) -> String {
    let mut rendered = sql.to_string();
    let mut keys: Vec<&String> = args.keys().collect();
    // Longest first so `:id` does not clobber `:id_2`.
    keys.sort_by_key(|k| std::cmp::Reverse(k.len()));
    for key in keys {
        rendered = rendered.replace(&format!(":{key}"), &format!("'{}'", args[key]));
    }
    rendered.replace(['\n', '\t'], " ")
}

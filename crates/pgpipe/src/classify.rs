//! Statement classification by leading keyword.

use std::fmt;

/// Width of the keyword window inspected by [`StatementKind::from_sql`].
const KEYWORD_WINDOW: usize = 6;

/// The kind of statement, which decides how it is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// INSERT statement; yields the produced identifier
    Insert,
    /// UPDATE statement; yields the affected row count
    Update,
    /// DELETE statement; yields the affected row count
    Delete,
    /// Anything else
    Select,
}

impl StatementKind {
    /// Classify a statement by the first six characters of its trimmed text.
    ///
    /// Shorter text, or text whose window is not a mutating keyword, is a
    /// `Select`.
    pub fn from_sql(sql: &str) -> Self {
        let Some(window) = sql.trim().get(..KEYWORD_WINDOW) else {
            return StatementKind::Select;
        };
        if window.eq_ignore_ascii_case("insert") {
            StatementKind::Insert
        } else if window.eq_ignore_ascii_case("update") {
            StatementKind::Update
        } else if window.eq_ignore_ascii_case("delete") {
            StatementKind::Delete
        } else {
            StatementKind::Select
        }
    }

    /// Whether this kind modifies rows.
    pub fn is_mutation(self) -> bool {
        !matches!(self, StatementKind::Select)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Select => "select",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! `text[]` column codec.

use crate::error::PipeError;
use bytes::BytesMut;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};

/// A Postgres text array.
///
/// An empty array is written as SQL NULL, and NULL reads back as an empty
/// array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringArray(pub Vec<String>);

impl StringArray {
    pub fn new(items: Vec<String>) -> Self {
        Self(items)
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for StringArray {
    fn from(items: Vec<String>) -> Self {
        Self(items)
    }
}

impl From<Vec<&str>> for StringArray {
    fn from(items: Vec<&str>) -> Self {
        Self(items.into_iter().map(str::to_string).collect())
    }
}

impl std::ops::Deref for StringArray {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

impl ToSql for StringArray {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if self.0.is_empty() {
            return Ok(IsNull::Yes);
        }
        self.0.to_sql(ty, out)
    }

    fn accepts(ty: &Type) -> bool {
        <Vec<String> as ToSql>::accepts(ty)
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for StringArray {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Vec::<String>::from_sql(ty, raw).map(Self)
    }

    fn from_sql_null(_: &Type) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Self::default())
    }

    fn accepts(ty: &Type) -> bool {
        <Vec<String> as FromSql>::accepts(ty)
    }
}

/// Renders the array literal, e.g. `{"a","b \"c\""}`.
impl fmt::Display for StringArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str("\"")?;
            for c in item.chars() {
                if c == '"' || c == '\\' {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
            f.write_str("\"")?;
        }
        f.write_str("}")
    }
}

/// Parses a one-dimensional array literal as Postgres prints it.
///
/// Unquoted elements are trimmed. An unquoted `NULL` is kept as the text
/// `"NULL"`.
impl FromStr for StringArray {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self, PipeError> {
        let inner = s
            .trim()
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| PipeError::decode("array", format!("not an array literal: {s}")))?;

        let mut items = Vec::new();
        if inner.trim().is_empty() {
            return Ok(Self(items));
        }

        let mut chars = inner.chars().peekable();
        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}

            let mut item = String::new();
            if chars.next_if_eq(&'"').is_some() {
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some(escaped) => item.push(escaped),
                            None => break,
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => item.push(other),
                    }
                }
                if !closed {
                    return Err(PipeError::decode("array", "unterminated quoted element"));
                }
                while chars.next_if(|c| c.is_whitespace()).is_some() {}
            } else {
                while let Some(c) = chars.next_if(|c| *c != ',') {
                    item.push(c);
                }
                item.truncate(item.trim_end().len());
            }
            items.push(item);

            match chars.next() {
                Some(',') => continue,
                None => break,
                Some(other) => {
                    return Err(PipeError::decode(
                        "array",
                        format!("unexpected '{other}' after element"),
                    ));
                }
            }
        }

        Ok(Self(items))
    }
}

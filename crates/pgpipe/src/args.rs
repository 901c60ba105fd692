//! Key/value argument lists and their resolution into named-argument maps.
//!
//! Builder calls take a flat `key, value, key, value, ...` list (see [`kv!`]).
//! Before a statement runs, the list is folded into a [`NamedArgs`] map. Inside
//! a pipeline a value may be an [`Argument::ResultRef`], which resolves to the
//! output of an earlier statement.
//!
//! [`kv!`]: crate::kv

use crate::error::{PipeError, PipeResult};
use crate::result::ExecResult;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Reserved prefix of the legacy string form of a result reference.
pub const RESULT_PREFIX: &str = "q-result---";

/// Named-argument map handed to a prepared statement.
pub type NamedArgs = BTreeMap<String, Value>;

/// One item of a raw argument list.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// A value bound as-is.
    Literal(Value),
    /// The output of the statement stored under this key.
    ResultRef(String),
}

impl Argument {
    /// Reference the output of the statement stored under `key`.
    pub fn result_of(key: impl Into<String>) -> Self {
        Argument::ResultRef(key.into())
    }

    /// Decode the legacy marker form produced by [`result_marker`].
    ///
    /// Anything that is not `RESULT_PREFIX` followed by a non-empty key is a
    /// plain text literal.
    pub fn from_marker(s: &str) -> Self {
        match s.strip_prefix(RESULT_PREFIX) {
            Some(key) if !key.is_empty() => Argument::ResultRef(key.to_string()),
            _ => Argument::Literal(Value::Text(s.to_string())),
        }
    }

    /// Key coercion: the string form used when this item sits in a key slot.
    fn key_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Literal(v) => write!(f, "{v}"),
            Argument::ResultRef(key) => write!(f, "{RESULT_PREFIX}{key}"),
        }
    }
}

impl<T: Into<Value>> From<T> for Argument {
    fn from(v: T) -> Self {
        Argument::Literal(v.into())
    }
}

/// Legacy string form of a reference to the statement stored under `key`.
pub fn result_marker(key: &str) -> String {
    format!("{RESULT_PREFIX}{key}")
}

/// Build a raw `key, value, ...` argument list.
///
/// ```ignore
/// let args = pgpipe::kv!["name", "Ann", "age", 31];
/// ```
#[macro_export]
macro_rules! kv {
    () => {
        ::std::vec::Vec::<$crate::Argument>::new()
    };
    ($($item:expr),+ $(,)?) => {
        vec![$($crate::Argument::from($item)),+]
    };
}

fn check_even(kv: &[Argument]) -> PipeResult<()> {
    if kv.len() % 2 == 1 {
        return Err(PipeError::InvalidArgumentCount(kv.len()));
    }
    Ok(())
}

/// Fold a raw argument list into a named-argument map.
///
/// Result references cannot be resolved here and fail with
/// [`PipeError::UnresolvedReference`].
pub fn pairs(kv: &[Argument]) -> PipeResult<NamedArgs> {
    check_even(kv)?;
    let mut args = NamedArgs::new();
    for pair in kv.chunks_exact(2) {
        let value = match &pair[1] {
            Argument::Literal(v) => v.clone(),
            Argument::ResultRef(key) => return Err(PipeError::UnresolvedReference(key.clone())),
        };
        args.insert(pair[0].key_string(), value);
    }
    Ok(args)
}

/// Fold a raw argument list into a named-argument map, resolving result
/// references against the outputs recorded so far.
///
/// A reference to a statement that has not produced a value resolves to
/// [`Value::Null`].
pub fn pairs_with_results(kv: &[Argument], results: &ExecResult) -> PipeResult<NamedArgs> {
    check_even(kv)?;
    let mut args = NamedArgs::new();
    for pair in kv.chunks_exact(2) {
        let value = match &pair[1] {
            Argument::Literal(v) => v.clone(),
            Argument::ResultRef(key) => results.tx_result(key),
        };
        args.insert(pair[0].key_string(), value);
    }
    Ok(args)
}

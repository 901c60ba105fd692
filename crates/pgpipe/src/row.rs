//! Row mapping traits and utilities

use crate::error::{PipeError, PipeResult};
use crate::value::Value;
use std::collections::BTreeMap;
use tokio_postgres::Row;
use tokio_postgres::types::FromSql;

/// Trait for types that can be constructed from a database row
pub trait FromRow: Sized {
    /// Convert a database row into Self
    fn from_row(row: &Row) -> PipeResult<Self>;
}

/// Extension trait for Row to provide typed access
pub trait RowExt {
    /// Try to get a column value, returning PipeError::Decode on failure
    fn try_get_column<T>(&self, column: &str) -> PipeResult<T>
    where
        T: for<'a> FromSql<'a>;
}

impl RowExt for Row {
    fn try_get_column<T>(&self, column: &str) -> PipeResult<T>
    where
        T: for<'a> FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| PipeError::decode(column, e.to_string()))
    }
}

/// Column name to value, for ad-hoc queries.
impl FromRow for BTreeMap<String, Value> {
    fn from_row(row: &Row) -> PipeResult<Self> {
        let mut map = BTreeMap::new();
        for (i, column) in row.columns().iter().enumerate() {
            let value: Value = row
                .try_get(i)
                .map_err(|e| PipeError::decode(column.name(), e.to_string()))?;
            map.insert(column.name().to_string(), value);
        }
        Ok(map)
    }
}

/// The first column of the row.
impl FromRow for Value {
    fn from_row(row: &Row) -> PipeResult<Self> {
        if row.is_empty() {
            return Err(PipeError::decode("0", "row has no columns"));
        }
        row.try_get(0)
            .map_err(|e| PipeError::decode(row.columns()[0].name(), e.to_string()))
    }
}

macro_rules! impl_from_row_tuple {
    ($($t:ident => $idx:tt),+) => {
        impl<$($t),+> FromRow for ($($t,)+)
        where
            $($t: for<'a> FromSql<'a>),+
        {
            fn from_row(row: &Row) -> PipeResult<Self> {
                Ok(($(
                    row.try_get::<_, $t>($idx)
                        .map_err(|e| PipeError::decode(stringify!($idx), e.to_string()))?,
                )+))
            }
        }
    };
}

impl_from_row_tuple!(A => 0);
impl_from_row_tuple!(A => 0, B => 1);
impl_from_row_tuple!(A => 0, B => 1, C => 2);
impl_from_row_tuple!(A => 0, B => 1, C => 2, D => 3);

//! Convenient imports for typical `pgpipe` usage.
//!
//! ```ignore
//! use pgpipe::prelude::*;
//! ```

pub use crate::kv;
pub use crate::{
    Argument, CancellationToken, ExecQuery, ExecResult, FromRow, GenericClient, PgConfig,
    PipeError, PipeResult, Pipeline, RowExt, RunContext, SelectQuery, TransactionSource, Value,
};

#[cfg(feature = "pool")]
pub use crate::{Db, create_pool};

//! # pgpipe
//!
//! Named-parameter statements and transactional statement pipelines for
//! PostgreSQL, on top of `tokio-postgres`.
//!
//! ## Features
//!
//! - **Named parameters**: write `:name` placeholders, bind from key/value lists (`kv!`)
//! - **Pipelines**: queue statements and run them in order inside one transaction
//! - **Identifier substitution**: bind an earlier insert's `RETURNING` value into a later statement
//! - **Fail-fast**: the first failure rolls everything back, panics included
//! - **Cancellation**: a `RunContext` token or deadline is checked between statements
//! - **Transaction-friendly**: executors accept any `GenericClient` (connection, pooled client, transaction)
//!
//! ## Example
//!
//! ```ignore
//! use pgpipe::prelude::*;
//!
//! let db = Db::connect(&PgConfig::from_env()?).await?;
//!
//! const NEW_USER: &str = "INSERT INTO users (name) VALUES (:name) RETURNING id";
//! let q = db.insert(NEW_USER, kv!["name", "Ann"]);
//! let user_id = q.from_result(NEW_USER);
//! let res = q
//!     .insert(
//!         "INSERT INTO profiles (user_id) VALUES (:user_id) RETURNING id",
//!         kv!["user_id", user_id],
//!     )
//!     .exec_in_tx(&RunContext::new())
//!     .await?;
//!
//! let id = res.tx_result(NEW_USER);
//! ```

pub mod args;
pub mod array;
pub mod builder;
pub mod classify;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod named;
pub mod pipeline;
pub mod result;
pub mod row;
pub mod runner;
pub mod value;

pub mod prelude;

#[cfg(feature = "pool")]
pub mod db;
#[cfg(feature = "pool")]
pub mod pool;

#[cfg(test)]
mod testing;

pub use args::{Argument, NamedArgs, RESULT_PREFIX, pairs, pairs_with_results, result_marker};
pub use array::StringArray;
pub use builder::{ExecQuery, SelectQuery};
pub use classify::StatementKind;
pub use client::{GenericClient, PgStatement, PipelineTransaction, PreparedStatement, TransactionSource};
pub use config::PgConfig;
pub use context::{CancellationToken, RunContext};
pub use error::{PipeError, PipeResult, Position};
pub use executor::{
    debug_query, delete_execute, execute_statement, insert_execute, select_rows, update_execute,
};
pub use named::NamedStatement;
pub use pipeline::Pipeline;
pub use result::ExecResult;
pub use row::{FromRow, RowExt};
pub use runner::{TxState, exec_in_tx, run_pipeline};
pub use value::Value;

#[cfg(feature = "pool")]
pub use db::Db;
#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_tls};

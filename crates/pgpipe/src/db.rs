//! Pool-backed entry point for the fluent builders.

use crate::args::Argument;
use crate::builder::{ExecQuery, SelectQuery};
use crate::config::PgConfig;
use crate::error::{PipeError, PipeResult};
use crate::pool::create_pool;
use deadpool_postgres::Pool;

/// A connection pool plus the debug flag handed to every query built from it.
#[derive(Clone)]
pub struct Db {
    pool: Pool,
    debug: bool,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("status", &self.pool.status())
            .field("debug", &self.debug)
            .finish()
    }
}

impl Db {
    /// Build a pool from `cfg` and make sure a connection can be opened.
    pub async fn connect(cfg: &PgConfig) -> PipeResult<Self> {
        let pool = create_pool(cfg)?;
        let client = pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| PipeError::Connection(e.to_string()))?;
        drop(client);

        tracing::debug!(target: "pgpipe.sql", max_size = cfg.max_size, "connected");
        Ok(Self::from_pool(pool))
    }

    /// Use an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool, debug: false }
    }

    /// Log every statement run through queries built from this handle.
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn select(&self, sql: impl Into<String>, kv: Vec<Argument>) -> SelectQuery {
        SelectQuery::new(sql, kv).with_pool(self.pool.clone(), self.debug)
    }

    pub fn insert(&self, sql: impl Into<String>, kv: Vec<Argument>) -> ExecQuery {
        self.exec_query(sql, kv)
    }

    pub fn update(&self, sql: impl Into<String>, kv: Vec<Argument>) -> ExecQuery {
        self.exec_query(sql, kv)
    }

    pub fn delete(&self, sql: impl Into<String>, kv: Vec<Argument>) -> ExecQuery {
        self.exec_query(sql, kv)
    }

    /// Reference the output of the statement keyed `sql`.
    ///
    /// Unlike [`ExecQuery::from_result`] this does not account for renamed
    /// duplicates.
    pub fn from_result(&self, sql: &str) -> Argument {
        Argument::result_of(sql)
    }

    fn exec_query(&self, sql: impl Into<String>, kv: Vec<Argument>) -> ExecQuery {
        ExecQuery::new(sql, kv).with_pool(self.pool.clone(), self.debug)
    }
}

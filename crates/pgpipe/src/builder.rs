//! Fluent statement builders.
//!
//! An [`ExecQuery`] starts from one statement (its origin). Chained
//! `insert`/`update`/`delete` calls queue more statements behind it; once
//! anything is queued, the query must run through `exec_in_tx`, which runs
//! the origin first and the queued statements after it in one transaction.
//!
//! ```ignore
//! let q = db.insert("INSERT INTO users (name) VALUES (:name) RETURNING id", kv!["name", "Ann"]);
//! let user_id = q.from_result("INSERT INTO users (name) VALUES (:name) RETURNING id");
//! let res = q
//!     .insert("INSERT INTO profiles (user_id) VALUES (:user_id) RETURNING id", kv!["user_id", user_id])
//!     .exec_in_tx(&RunContext::new())
//!     .await?;
//! ```

use crate::args::{Argument, pairs};
use crate::client::{GenericClient, TransactionSource};
use crate::context::RunContext;
use crate::error::{PipeError, PipeResult};
use crate::executor::{debug_query, execute_statement, select_rows};
use crate::pipeline::Pipeline;
use crate::result::ExecResult;
use crate::row::FromRow;
use crate::runner;
use crate::value::Value;
use std::fmt;

#[cfg(feature = "pool")]
use deadpool_postgres::Pool;

const USE_EXEC_IN_TX: &str = "transaction please use exec_in_tx()";
const USE_EXEC: &str = "not transaction please use exec()";
#[cfg(feature = "pool")]
const NO_POOL: &str = "no connection pool attached, use the *_on methods";

/// A mutating statement, optionally followed by more statements that run
/// with it in one transaction.
#[derive(Clone)]
pub struct ExecQuery {
    query: String,
    kv: Vec<Argument>,
    pipeline: Pipeline,
    debug: bool,
    #[cfg(feature = "pool")]
    pool: Option<Pool>,
}

impl fmt::Debug for ExecQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecQuery")
            .field("query", &self.query)
            .field("kv", &self.kv)
            .field("pipeline", &self.pipeline)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl ExecQuery {
    /// Start from `sql` with its raw arguments.
    pub fn new(sql: impl Into<String>, kv: Vec<Argument>) -> Self {
        Self {
            query: sql.into(),
            kv,
            pipeline: Pipeline::new(),
            debug: false,
            #[cfg(feature = "pool")]
            pool: None,
        }
    }

    #[cfg(feature = "pool")]
    pub(crate) fn with_pool(mut self, pool: Pool, debug: bool) -> Self {
        self.pool = Some(pool);
        self.debug |= debug;
        self
    }

    /// Log every statement with its arguments before it runs.
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Queue an INSERT behind the origin.
    pub fn insert(mut self, sql: impl Into<String>, kv: Vec<Argument>) -> Self {
        self.pipeline.add(sql, kv);
        self
    }

    /// Queue an UPDATE behind the origin.
    pub fn update(mut self, sql: impl Into<String>, kv: Vec<Argument>) -> Self {
        self.pipeline.add(sql, kv);
        self
    }

    /// Queue a DELETE behind the origin.
    pub fn delete(mut self, sql: impl Into<String>, kv: Vec<Argument>) -> Self {
        self.pipeline.add(sql, kv);
        self
    }

    /// Queue `other`'s origin and its queued statements, in order.
    ///
    /// `other`'s origin is renamed if its text is already queued here.
    pub fn wrap(mut self, other: ExecQuery) -> Self {
        let ExecQuery {
            query,
            kv,
            mut pipeline,
            ..
        } = other;
        let key = self.pipeline.unique_key(&query);
        pipeline.add_first(key, kv);
        self.pipeline.append(pipeline);
        self
    }

    /// Reference the output of `sql` as it would be keyed if queued now.
    ///
    /// Use the returned argument in a statement queued after `sql`.
    pub fn from_result(&self, sql: &str) -> Argument {
        Argument::result_of(self.pipeline.unique_key(sql))
    }

    /// The origin statement.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Statements queued behind the origin.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Whether anything is queued, i.e. whether `exec_in_tx` is the way to run.
    pub fn is_transactional(&self) -> bool {
        self.pipeline.is_transactional()
    }

    /// Run the origin alone on `conn`.
    ///
    /// Inserts return their identifier; updates and deletes return the
    /// affected row count as [`Value::Int`].
    pub async fn exec_on<C: GenericClient>(&self, ctx: &RunContext, conn: &C) -> PipeResult<Value> {
        if self.pipeline.is_transactional() {
            return Err(PipeError::Misuse(USE_EXEC_IN_TX));
        }
        ctx.check()?;

        let args = pairs(&self.kv)?;
        if self.debug {
            debug_query(&self.query, &args);
        }
        execute_statement(conn, &self.query, &args).await
    }

    /// Run the origin and every queued statement in one transaction on `source`.
    pub async fn exec_in_tx_on<S: TransactionSource>(
        self,
        ctx: &RunContext,
        source: S,
    ) -> PipeResult<ExecResult> {
        if !self.pipeline.is_transactional() {
            return Err(PipeError::Misuse(USE_EXEC));
        }
        let mut pipeline = self.pipeline;
        pipeline.add_first(self.query, self.kv);

        runner::exec_in_tx(ctx, source, &pipeline, self.debug).await
    }

    /// [`ExecQuery::exec_on`] with a connection from the attached pool.
    #[cfg(feature = "pool")]
    pub async fn exec(&self, ctx: &RunContext) -> PipeResult<Value> {
        let pool = self.pool.as_ref().ok_or(PipeError::Misuse(NO_POOL))?;
        let client = pool.get().await?;
        self.exec_on(ctx, &client).await
    }

    /// [`ExecQuery::exec_in_tx_on`] with a connection from the attached pool.
    #[cfg(feature = "pool")]
    pub async fn exec_in_tx(self, ctx: &RunContext) -> PipeResult<ExecResult> {
        let pool = self.pool.clone().ok_or(PipeError::Misuse(NO_POOL))?;
        let mut client = pool.get().await?;
        self.exec_in_tx_on(ctx, &mut client).await
    }
}

/// A query whose rows are mapped with [`FromRow`].
#[derive(Clone)]
pub struct SelectQuery {
    query: String,
    kv: Vec<Argument>,
    debug: bool,
    #[cfg(feature = "pool")]
    pool: Option<Pool>,
}

impl fmt::Debug for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectQuery")
            .field("query", &self.query)
            .field("kv", &self.kv)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl SelectQuery {
    pub fn new(sql: impl Into<String>, kv: Vec<Argument>) -> Self {
        Self {
            query: sql.into(),
            kv,
            debug: false,
            #[cfg(feature = "pool")]
            pool: None,
        }
    }

    #[cfg(feature = "pool")]
    pub(crate) fn with_pool(mut self, pool: Pool, debug: bool) -> Self {
        self.pool = Some(pool);
        self.debug |= debug;
        self
    }

    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// First row, or `None` when nothing matched.
    pub async fn one_on<T: FromRow, C: GenericClient>(
        &self,
        ctx: &RunContext,
        conn: &C,
    ) -> PipeResult<Option<T>> {
        let rows = self.rows_on(ctx, conn).await?;
        rows.first().map(T::from_row).transpose()
    }

    /// Every row; empty when nothing matched.
    pub async fn many_on<T: FromRow, C: GenericClient>(
        &self,
        ctx: &RunContext,
        conn: &C,
    ) -> PipeResult<Vec<T>> {
        let rows = self.rows_on(ctx, conn).await?;
        rows.iter().map(T::from_row).collect()
    }

    async fn rows_on<C: GenericClient>(
        &self,
        ctx: &RunContext,
        conn: &C,
    ) -> PipeResult<Vec<tokio_postgres::Row>> {
        ctx.check()?;
        let args = pairs(&self.kv)?;
        if self.debug {
            debug_query(&self.query, &args);
        }
        select_rows(conn, &self.query, &args).await
    }

    #[cfg(feature = "pool")]
    pub async fn one<T: FromRow>(&self, ctx: &RunContext) -> PipeResult<Option<T>> {
        let pool = self.pool.as_ref().ok_or(PipeError::Misuse(NO_POOL))?;
        let client = pool.get().await?;
        self.one_on(ctx, &client).await
    }

    #[cfg(feature = "pool")]
    pub async fn many<T: FromRow>(&self, ctx: &RunContext) -> PipeResult<Vec<T>> {
        let pool = self.pool.as_ref().ok_or(PipeError::Misuse(NO_POOL))?;
        let client = pool.get().await?;
        self.many_on(ctx, &client).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv;
    use crate::testing::{Event, FakeDb};
    use std::collections::BTreeMap;

    const INSERT_USER: &str = "INSERT INTO users (name) VALUES (:name) RETURNING id";
    const INSERT_PROFILE: &str = "INSERT INTO profiles (user_id) VALUES (:user_id) RETURNING id";

    fn run_order(db: &FakeDb) -> Vec<String> {
        db.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Scalar(sql, _) | Event::Execute(sql, _) => Some(sql),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn exec_runs_origin_alone() {
        let db = FakeDb::new();
        let id = ExecQuery::new(INSERT_USER, kv!["name", "Ann"])
            .debug()
            .exec_on(&RunContext::new(), &db)
            .await
            .unwrap();

        assert_eq!(id, Value::Int(1));
        assert_eq!(db.count(|e| matches!(e, Event::Begin)), 0);
        assert_eq!(db.committed(), vec![INSERT_USER.to_string()]);
    }

    #[tokio::test]
    async fn exec_update_returns_row_count() {
        let db = FakeDb::new().affected(4);
        let n = ExecQuery::new("UPDATE users SET active = :active", kv!["active", false])
            .exec_on(&RunContext::new(), &db)
            .await
            .unwrap();

        assert_eq!(n, Value::Int(4));
    }

    #[tokio::test]
    async fn exec_refuses_queued_statements() {
        let db = FakeDb::new();
        let q = ExecQuery::new(INSERT_USER, kv!["name", "Ann"]).insert(INSERT_PROFILE, kv![]);

        let err = q.exec_on(&RunContext::new(), &db).await.unwrap_err();
        assert!(matches!(err, PipeError::Misuse(msg) if msg == USE_EXEC_IN_TX));
        assert!(db.events().is_empty());
    }

    #[tokio::test]
    async fn exec_in_tx_refuses_single_statement() {
        let mut db = FakeDb::new();
        let err = ExecQuery::new(INSERT_USER, kv!["name", "Ann"])
            .exec_in_tx_on(&RunContext::new(), &mut db)
            .await
            .unwrap_err();

        assert!(matches!(err, PipeError::Misuse(msg) if msg == USE_EXEC));
        assert!(db.events().is_empty());
    }

    #[tokio::test]
    async fn exec_rejects_odd_arguments() {
        let db = FakeDb::new();
        let err = ExecQuery::new(INSERT_USER, kv!["name"])
            .exec_on(&RunContext::new(), &db)
            .await
            .unwrap_err();

        assert!(matches!(err, PipeError::InvalidArgumentCount(1)));
        assert_eq!(db.prepared(), 0);
    }

    #[tokio::test]
    async fn origin_runs_first_and_feeds_later_statements() {
        let mut db = FakeDb::new();
        let q = ExecQuery::new(INSERT_USER, kv!["name", "Ann"]);
        let user_id = q.from_result(INSERT_USER);
        let q = q.insert(INSERT_PROFILE, vec!["user_id".into(), user_id]);

        let res = q.exec_in_tx_on(&RunContext::new(), &mut db).await.unwrap();

        assert_eq!(run_order(&db), vec![INSERT_USER.to_string(), INSERT_PROFILE.to_string()]);
        assert_eq!(res.value_for(INSERT_USER), Some(&Value::Int(1)));
        assert_eq!(res.value_for(INSERT_PROFILE), Some(&Value::Int(2)));

        let bound = db.events().into_iter().find_map(|e| match e {
            Event::Scalar(sql, args) if sql == INSERT_PROFILE => Some(args),
            _ => None,
        });
        assert_eq!(
            bound,
            Some(BTreeMap::from([("user_id".to_string(), Value::Int(1))]))
        );
        assert_eq!(db.commits(), 1);
    }

    #[tokio::test]
    async fn wrap_nests_another_query_in_order() {
        let order = "INSERT INTO orders (sku) VALUES (:sku) RETURNING id";
        let stock = "UPDATE stock SET qty = qty - 1 WHERE sku = :sku";
        let audit = "INSERT INTO audit (note) VALUES (:note) RETURNING id";

        let inner = ExecQuery::new(order, kv!["sku", "B-2"]).insert(audit, kv!["note", "second order"]);
        let outer = ExecQuery::new(order, kv!["sku", "A-1"])
            .update(stock, kv!["sku", "A-1"])
            .wrap(inner);

        assert_eq!(
            outer.pipeline().keys(),
            &[stock.to_string(), order.to_string(), audit.to_string()]
        );

        let mut db = FakeDb::new();
        let res = outer.exec_in_tx_on(&RunContext::new(), &mut db).await.unwrap();

        // the origin is prepended last, so it is the one renamed
        let origin = format!("{order}/*3*/");
        assert_eq!(
            run_order(&db),
            vec![origin.clone(), stock.to_string(), order.to_string(), audit.to_string()]
        );
        assert_eq!(res.len(), 4);
        assert_eq!(res.value_for(&origin), Some(&Value::Int(1)));
        assert_eq!(res.value_for(order), Some(&Value::Int(2)));
    }

    #[test]
    fn wrap_renames_colliding_origin() {
        let q = ExecQuery::new("DELETE FROM carts", kv![])
            .insert(INSERT_USER, kv!["name", "Ann"])
            .wrap(ExecQuery::new(INSERT_USER, kv!["name", "Bob"]));

        assert_eq!(
            q.pipeline().keys(),
            &[INSERT_USER.to_string(), format!("{INSERT_USER}/*1*/")]
        );
        assert_eq!(
            q.pipeline().args(&format!("{INSERT_USER}/*1*/")),
            Some(kv!["name", "Bob"].as_slice())
        );
    }

    #[tokio::test]
    async fn failing_queued_statement_rolls_back_origin() {
        let mut db = FakeDb::new().fail_execute("stock");
        let err = ExecQuery::new(INSERT_USER, kv!["name", "Ann"])
            .update("UPDATE stock SET qty = 0", kv![])
            .exec_in_tx_on(&RunContext::new(), &mut db)
            .await
            .unwrap_err();

        assert!(matches!(err, PipeError::TransactionAborted { position: 1, .. }));
        assert!(db.committed().is_empty());
    }

    #[test]
    fn from_result_predicts_renamed_key() {
        let q = ExecQuery::new("DELETE FROM carts", kv![]).insert(INSERT_USER, kv!["name", "Ann"]);
        assert_eq!(
            q.from_result(INSERT_USER),
            Argument::ResultRef(format!("{INSERT_USER}/*1*/"))
        );
        assert_eq!(q.from_result(INSERT_PROFILE), Argument::ResultRef(INSERT_PROFILE.into()));
    }

    #[tokio::test]
    async fn select_without_rows_is_none() {
        let db = FakeDb::new();
        let q = SelectQuery::new("SELECT id FROM users WHERE name = :name", kv!["name", "Zed"]).debug();

        let one: Option<Value> = q.one_on(&RunContext::new(), &db).await.unwrap();
        let many: Vec<Value> = q.many_on(&RunContext::new(), &db).await.unwrap();

        assert!(one.is_none());
        assert!(many.is_empty());
        assert_eq!(db.count(|e| matches!(e, Event::Query(_))), 2);
        assert_eq!(db.prepared(), db.closed());
    }

    #[tokio::test]
    async fn select_observes_cancellation() {
        let db = FakeDb::new();
        let token = crate::context::CancellationToken::new();
        token.cancel();
        let ctx = RunContext::new().with_token(token);

        let err = SelectQuery::new("SELECT 1", kv![])
            .one_on::<Value, _>(&ctx, &db)
            .await
            .unwrap_err();
        assert!(matches!(err, PipeError::Cancelled));
        assert!(db.events().is_empty());
    }

    #[cfg(feature = "pool")]
    #[tokio::test]
    async fn pool_methods_need_a_pool() {
        let err = ExecQuery::new(INSERT_USER, kv!["name", "Ann"])
            .exec(&RunContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipeError::Misuse(msg) if msg == NO_POOL));

        let err = SelectQuery::new("SELECT 1", kv![])
            .many::<Value>(&RunContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipeError::Misuse(_)));
    }
}

//! Client traits that unify connections and transactions.
//!
//! Executors only need four things from the database: prepare a statement
//! with `:name` placeholders, run it for a scalar, run it for a row count,
//! and release it. [`GenericClient`] describes exactly that, so the same
//! executor runs on a plain connection, a pooled connection or an open
//! transaction. [`TransactionSource`] and [`PipelineTransaction`] add
//! begin/commit/rollback for the pipeline runner.
//!
//! Prepared statements are owned values that do not borrow their client, so
//! futures holding one stay `Send` on any runtime.

use crate::args::NamedArgs;
use crate::error::{PipeError, PipeResult};
use crate::named::NamedStatement;
use crate::value::Value;
use std::future::Future;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// A statement prepared with named placeholders.
pub trait PreparedStatement: Send + Sync + 'static {
    /// The positional SQL sent to the server.
    fn sql(&self) -> &str;
}

/// Anything that can prepare and run named statements: a connection or a
/// transaction.
pub trait GenericClient: Send + Sync {
    type Statement: PreparedStatement;

    /// Prepare `sql`, rewriting its `:name` placeholders.
    fn prepare_named(&self, sql: &str) -> impl Future<Output = PipeResult<Self::Statement>> + Send;

    /// Execute and return the first column of the first row.
    ///
    /// - 0 rows: `Ok(None)`
    /// - NULL in the column: `Ok(Some(Value::Null))`
    /// - more than one column: [`PipeError::Decode`]
    fn query_scalar(
        &self,
        stmt: &Self::Statement,
        args: &NamedArgs,
    ) -> impl Future<Output = PipeResult<Option<Value>>> + Send;

    /// Execute and return the number of affected rows.
    fn execute_prepared(
        &self,
        stmt: &Self::Statement,
        args: &NamedArgs,
    ) -> impl Future<Output = PipeResult<u64>> + Send;

    /// Execute and return all rows.
    fn query_prepared(
        &self,
        stmt: &Self::Statement,
        args: &NamedArgs,
    ) -> impl Future<Output = PipeResult<Vec<Row>>> + Send;

    /// Release the statement.
    fn close_prepared(&self, stmt: Self::Statement) {
        drop(stmt);
    }
}

/// An open transaction the pipeline runner can finish.
pub trait PipelineTransaction: GenericClient + Sized {
    fn commit(self) -> impl Future<Output = PipeResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = PipeResult<()>> + Send;
}

/// A borrowed connection that can open a transaction.
///
/// Implemented for `&'a mut` connections, so the transaction type names its
/// borrow directly.
pub trait TransactionSource: Send {
    type Tx: PipelineTransaction;

    fn begin(self) -> impl Future<Output = PipeResult<Self::Tx>> + Send;
}

/// A named statement prepared on a tokio-postgres connection or transaction.
///
/// Dropping it releases the server-side statement.
pub struct PgStatement {
    statement: tokio_postgres::Statement,
    named: NamedStatement,
}

impl PgStatement {
    fn params(&self, args: &NamedArgs) -> PipeResult<Vec<Value>> {
        self.named.bind(args)
    }
}

impl PreparedStatement for PgStatement {
    fn sql(&self) -> &str {
        self.named.sql()
    }
}

fn scalar_from_rows(rows: Vec<Row>) -> PipeResult<Option<Value>> {
    let Some(row) = rows.into_iter().next() else {
        return Ok(None);
    };
    if row.len() != 1 {
        return Err(PipeError::decode(
            "0",
            format!("expected exactly one result column, got {}", row.len()),
        ));
    }
    let name = row.columns()[0].name().to_string();
    row.try_get::<_, Value>(0)
        .map(Some)
        .map_err(|e| PipeError::decode(name, e.to_string()))
}

macro_rules! impl_pg_client {
    ($client:ty) => {
        impl GenericClient for $client {
            type Statement = PgStatement;

            async fn prepare_named(&self, sql: &str) -> PipeResult<PgStatement> {
                let named = NamedStatement::parse(sql)?;
                let statement = self
                    .prepare(named.sql())
                    .await
                    .map_err(PipeError::from_db_error)?;
                Ok(PgStatement { statement, named })
            }

            async fn query_scalar(
                &self,
                stmt: &PgStatement,
                args: &NamedArgs,
            ) -> PipeResult<Option<Value>> {
                let rows = GenericClient::query_prepared(self, stmt, args).await?;
                scalar_from_rows(rows)
            }

            async fn execute_prepared(&self, stmt: &PgStatement, args: &NamedArgs) -> PipeResult<u64> {
                let params = stmt.params(args)?;
                let refs: Vec<&(dyn ToSql + Sync)> =
                    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
                self.execute(&stmt.statement, &refs)
                    .await
                    .map_err(PipeError::from_db_error)
            }

            async fn query_prepared(&self, stmt: &PgStatement, args: &NamedArgs) -> PipeResult<Vec<Row>> {
                let params = stmt.params(args)?;
                let refs: Vec<&(dyn ToSql + Sync)> =
                    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
                self.query(&stmt.statement, &refs)
                    .await
                    .map_err(PipeError::from_db_error)
            }
        }
    };
}

impl_pg_client!(tokio_postgres::Client);
impl_pg_client!(tokio_postgres::Transaction<'_>);
#[cfg(feature = "pool")]
impl_pg_client!(deadpool_postgres::Client);

impl PipelineTransaction for tokio_postgres::Transaction<'_> {
    async fn commit(self) -> PipeResult<()> {
        tokio_postgres::Transaction::commit(self)
            .await
            .map_err(PipeError::from_db_error)
    }

    async fn rollback(self) -> PipeResult<()> {
        tokio_postgres::Transaction::rollback(self)
            .await
            .map_err(PipeError::from_db_error)
    }
}

impl<'a> TransactionSource for &'a mut tokio_postgres::Client {
    type Tx = tokio_postgres::Transaction<'a>;

    async fn begin(self) -> PipeResult<tokio_postgres::Transaction<'a>> {
        self.transaction().await.map_err(PipeError::from_db_error)
    }
}

#[cfg(feature = "pool")]
impl<'a> TransactionSource for &'a mut deadpool_postgres::Client {
    type Tx = tokio_postgres::Transaction<'a>;

    async fn begin(self) -> PipeResult<tokio_postgres::Transaction<'a>> {
        // Go through the inner tokio_postgres::Client, not deadpool's caching wrapper.
        let client: &'a mut tokio_postgres::Client = self;
        client.transaction().await.map_err(PipeError::from_db_error)
    }
}

//! Single-statement executors.
//!
//! Each executor prepares the statement, runs it once and releases it before
//! returning, whichever way it returns.

use crate::args::NamedArgs;
use crate::classify::StatementKind;
use crate::client::{GenericClient, PreparedStatement};
use crate::error::{PipeError, PipeResult};
use crate::named::render_debug_sql;
use crate::value::Value;
use tokio_postgres::Row;

/// Log the statement with its arguments inlined.
pub fn debug_query(sql: &str, args: &NamedArgs) {
    tracing::info!(target: "pgpipe.sql", sql = %render_debug_sql(sql, args), "SQL Query");
}

async fn prepare<C: GenericClient>(conn: &C, sql: &str) -> PipeResult<C::Statement> {
    let stmt = conn
        .prepare_named(sql)
        .await
        .map_err(PipeError::preparation)?;
    tracing::trace!(target: "pgpipe.sql", positional = stmt.sql(), "prepared");
    Ok(stmt)
}

/// Run an INSERT that returns exactly one scalar column (`RETURNING id`).
///
/// No row, or a NULL identifier, is [`PipeError::InsertNoIdentifier`].
pub async fn insert_execute<C: GenericClient>(
    conn: &C,
    sql: &str,
    args: &NamedArgs,
) -> PipeResult<Value> {
    let stmt = prepare(conn, sql).await?;
    let result = conn.query_scalar(&stmt, args).await;
    conn.close_prepared(stmt);

    match result.map_err(PipeError::execution)? {
        Some(id) if !id.is_null() => Ok(id),
        _ => Err(PipeError::InsertNoIdentifier),
    }
}

/// Run an UPDATE and return the affected row count.
pub async fn update_execute<C: GenericClient>(
    conn: &C,
    sql: &str,
    args: &NamedArgs,
) -> PipeResult<u64> {
    affected_rows(conn, sql, args).await
}

/// Run a DELETE and return the affected row count.
pub async fn delete_execute<C: GenericClient>(
    conn: &C,
    sql: &str,
    args: &NamedArgs,
) -> PipeResult<u64> {
    affected_rows(conn, sql, args).await
}

async fn affected_rows<C: GenericClient>(conn: &C, sql: &str, args: &NamedArgs) -> PipeResult<u64> {
    let stmt = prepare(conn, sql).await?;
    let result = conn.execute_prepared(&stmt, args).await;
    conn.close_prepared(stmt);

    match result {
        Ok(n) => Ok(n),
        // nothing matched
        Err(PipeError::NotFound(_)) => Ok(0),
        Err(e) => Err(PipeError::execution(e)),
    }
}

/// Run a query and return all rows.
pub async fn select_rows<C: GenericClient>(
    conn: &C,
    sql: &str,
    args: &NamedArgs,
) -> PipeResult<Vec<Row>> {
    let stmt = prepare(conn, sql).await?;
    let result = conn.query_prepared(&stmt, args).await;
    conn.close_prepared(stmt);

    result.map_err(PipeError::execution)
}

/// Classify `sql` and run it with the matching executor.
///
/// Inserts yield their identifier; everything else runs through the
/// update executor and yields the affected row count.
pub async fn execute_statement<C: GenericClient>(
    conn: &C,
    sql: &str,
    args: &NamedArgs,
) -> PipeResult<Value> {
    let affected = match StatementKind::from_sql(sql) {
        StatementKind::Insert => return insert_execute(conn, sql, args).await,
        StatementKind::Delete => delete_execute(conn, sql, args).await?,
        StatementKind::Update | StatementKind::Select => update_execute(conn, sql, args).await?,
    };
    Ok(Value::Int(i64::try_from(affected).unwrap_or(i64::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::pairs;
    use crate::kv;
    use crate::testing::{Event, FakeDb};

    #[tokio::test]
    async fn insert_returns_identifier_and_closes() {
        let db = FakeDb::new();
        let args = pairs(&kv!["name", "Ann"]).unwrap();

        let id = insert_execute(&db, "INSERT INTO users (name) VALUES (:name) RETURNING id", &args)
            .await
            .unwrap();

        assert_eq!(id, Value::Int(1));
        assert_eq!(db.prepared(), 1);
        assert_eq!(db.closed(), 1);
    }

    #[tokio::test]
    async fn insert_without_row_is_insert_no_identifier() {
        let db = FakeDb::new().no_identifier("users");
        let err = insert_execute(&db, "INSERT INTO users DEFAULT VALUES RETURNING id", &NamedArgs::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipeError::InsertNoIdentifier));
        assert_eq!(db.closed(), 1);
    }

    #[tokio::test]
    async fn insert_null_identifier_is_insert_no_identifier() {
        let db = FakeDb::new().null_identifier("users");
        let err = insert_execute(&db, "INSERT INTO users DEFAULT VALUES RETURNING id", &NamedArgs::new())
            .await
            .unwrap_err();

        assert!(err.is_insert_no_identifier());
    }

    #[tokio::test]
    async fn no_match_is_zero_rows() {
        let db = FakeDb::new().not_found("sessions");
        let n = delete_execute(&db, "DELETE FROM sessions", &NamedArgs::new())
            .await
            .unwrap();

        assert_eq!(n, 0);
        assert_eq!(db.closed(), 1);
    }

    #[tokio::test]
    async fn execution_failure_still_releases_statement() {
        let db = FakeDb::new().fail_execute("accounts");
        let err = update_execute(&db, "UPDATE accounts SET x = 1", &NamedArgs::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipeError::StatementExecution { .. }));
        assert_eq!(db.prepared(), 1);
        assert_eq!(db.closed(), 1);
    }

    #[tokio::test]
    async fn preparation_failure_is_reported_as_such() {
        let db = FakeDb::new().fail_prepare("broken");
        let err = update_execute(&db, "UPDATE broken SET", &NamedArgs::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipeError::StatementPreparation { .. }));
        assert_eq!(db.closed(), 0);
    }

    #[tokio::test]
    async fn mixed_placeholders_fail_preparation() {
        let db = FakeDb::new();
        let args = pairs(&kv!["id", 1]).unwrap();
        let err = update_execute(&db, "UPDATE t SET a = $1 WHERE id = :id", &args)
            .await
            .unwrap_err();

        assert!(matches!(err, PipeError::StatementPreparation { .. }));
        assert!(matches!(err.root_cause(), PipeError::MixedPlaceholders));
        assert_eq!(db.closed(), 0);
    }

    #[tokio::test]
    async fn dispatch_follows_statement_kind() {
        let db = FakeDb::new().affected(3);
        let args = NamedArgs::new();

        assert_eq!(
            execute_statement(&db, "insert into t default values returning id", &args)
                .await
                .unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            execute_statement(&db, "DELETE FROM t", &args).await.unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            execute_statement(&db, "UPDATE t SET a = 1", &args).await.unwrap(),
            Value::Int(3)
        );

        let kinds: Vec<_> = db
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Scalar(_, _) => Some("scalar"),
                Event::Execute(_, _) => Some("execute"),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["scalar", "execute", "execute"]);
    }
}

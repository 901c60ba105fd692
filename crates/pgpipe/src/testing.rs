//! In-memory client used by unit tests.
//!
//! `FakeDb` records every call, hands out sequential identifiers for inserts
//! and keeps statements run inside a transaction pending until commit.
//! Rules are matched by substring of the statement text.

use crate::args::NamedArgs;
use crate::client::{GenericClient, PipelineTransaction, PreparedStatement, TransactionSource};
use crate::context::CancellationToken;
use crate::error::{PipeError, PipeResult};
use crate::named::NamedStatement;
use crate::value::Value;
use std::sync::{Mutex, MutexGuard};
use tokio_postgres::Row;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Begin,
    Prepare(String),
    Scalar(String, NamedArgs),
    Execute(String, NamedArgs),
    Query(String),
    Close(String),
    Commit,
    Rollback,
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    next_id: i64,
    runs: usize,
    in_tx: bool,
    pending: Vec<String>,
    committed: Vec<String>,
}

pub(crate) struct FakeDb {
    fail_prepare: Vec<String>,
    fail_execute: Vec<String>,
    no_identifier: Vec<String>,
    null_identifier: Vec<String>,
    not_found: Vec<String>,
    panic_on: Vec<String>,
    affected: u64,
    fail_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
    cancel_after: Option<(usize, CancellationToken)>,
    state: Mutex<State>,
}

fn matches(rules: &[String], sql: &str) -> bool {
    rules.iter().any(|r| sql.contains(r.as_str()))
}

impl FakeDb {
    pub(crate) fn new() -> Self {
        Self {
            fail_prepare: Vec::new(),
            fail_execute: Vec::new(),
            no_identifier: Vec::new(),
            null_identifier: Vec::new(),
            not_found: Vec::new(),
            panic_on: Vec::new(),
            affected: 1,
            fail_begin: false,
            fail_commit: false,
            fail_rollback: false,
            cancel_after: None,
            state: Mutex::new(State::default()),
        }
    }

    pub(crate) fn fail_prepare(mut self, pattern: &str) -> Self {
        self.fail_prepare.push(pattern.to_string());
        self
    }

    pub(crate) fn fail_execute(mut self, pattern: &str) -> Self {
        self.fail_execute.push(pattern.to_string());
        self
    }

    pub(crate) fn no_identifier(mut self, pattern: &str) -> Self {
        self.no_identifier.push(pattern.to_string());
        self
    }

    pub(crate) fn null_identifier(mut self, pattern: &str) -> Self {
        self.null_identifier.push(pattern.to_string());
        self
    }

    pub(crate) fn not_found(mut self, pattern: &str) -> Self {
        self.not_found.push(pattern.to_string());
        self
    }

    pub(crate) fn panic_on(mut self, pattern: &str) -> Self {
        self.panic_on.push(pattern.to_string());
        self
    }

    pub(crate) fn affected(mut self, n: u64) -> Self {
        self.affected = n;
        self
    }

    pub(crate) fn fail_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    pub(crate) fn fail_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub(crate) fn fail_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    /// Cancel `token` once `n` statements have run successfully.
    pub(crate) fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.lock().events.iter().filter(|e| pred(e)).count()
    }

    pub(crate) fn prepared(&self) -> usize {
        self.count(|e| matches!(e, Event::Prepare(_)))
    }

    pub(crate) fn closed(&self) -> usize {
        self.count(|e| matches!(e, Event::Close(_)))
    }

    pub(crate) fn commits(&self) -> usize {
        self.count(|e| matches!(e, Event::Commit))
    }

    pub(crate) fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, Event::Rollback))
    }

    /// Statements whose effects are visible outside any transaction.
    pub(crate) fn committed(&self) -> Vec<String> {
        self.lock().committed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn log(&self, event: Event) {
        self.lock().events.push(event);
    }

    fn check_run(&self, sql: &str) -> PipeResult<()> {
        if matches(&self.panic_on, sql) {
            panic!("fake panic while running {sql}");
        }
        if matches(&self.fail_execute, sql) {
            return Err(PipeError::Other(format!("execution refused: {sql}")));
        }
        Ok(())
    }

    fn applied(&self, sql: &str) {
        let mut st = self.lock();
        if st.in_tx {
            st.pending.push(sql.to_string());
        } else {
            st.committed.push(sql.to_string());
        }
        st.runs += 1;
        if let Some((n, token)) = &self.cancel_after {
            if st.runs >= *n {
                token.cancel();
            }
        }
    }

    fn finish(&self, commit: bool) {
        let mut st = self.lock();
        let pending = std::mem::take(&mut st.pending);
        if commit {
            st.committed.extend(pending);
        }
        st.in_tx = false;
    }
}

pub(crate) struct FakeStatement {
    sql: String,
}

impl PreparedStatement for FakeStatement {
    fn sql(&self) -> &str {
        &self.sql
    }
}

impl GenericClient for FakeDb {
    type Statement = FakeStatement;

    async fn prepare_named(&self, sql: &str) -> PipeResult<FakeStatement> {
        self.log(Event::Prepare(sql.to_string()));
        if matches(&self.fail_prepare, sql) {
            return Err(PipeError::Other(format!("prepare refused: {sql}")));
        }
        NamedStatement::parse(sql)?;
        Ok(FakeStatement {
            sql: sql.to_string(),
        })
    }

    async fn query_scalar(&self, stmt: &FakeStatement, args: &NamedArgs) -> PipeResult<Option<Value>> {
        self.log(Event::Scalar(stmt.sql.clone(), args.clone()));
        self.check_run(&stmt.sql)?;
        if matches(&self.no_identifier, &stmt.sql) {
            return Ok(None);
        }
        if matches(&self.null_identifier, &stmt.sql) {
            return Ok(Some(Value::Null));
        }
        let id = {
            let mut st = self.lock();
            st.next_id += 1;
            st.next_id
        };
        self.applied(&stmt.sql);
        Ok(Some(Value::Int(id)))
    }

    async fn execute_prepared(&self, stmt: &FakeStatement, args: &NamedArgs) -> PipeResult<u64> {
        self.log(Event::Execute(stmt.sql.clone(), args.clone()));
        self.check_run(&stmt.sql)?;
        if matches(&self.not_found, &stmt.sql) {
            return Err(PipeError::not_found("no rows in result set"));
        }
        self.applied(&stmt.sql);
        Ok(self.affected)
    }

    async fn query_prepared(&self, stmt: &FakeStatement, _args: &NamedArgs) -> PipeResult<Vec<Row>> {
        self.log(Event::Query(stmt.sql.clone()));
        self.check_run(&stmt.sql)?;
        Ok(Vec::new())
    }

    fn close_prepared(&self, stmt: FakeStatement) {
        self.log(Event::Close(stmt.sql));
    }
}

pub(crate) struct FakeTx<'a> {
    db: &'a FakeDb,
    done: bool,
}

impl GenericClient for FakeTx<'_> {
    type Statement = FakeStatement;

    async fn prepare_named(&self, sql: &str) -> PipeResult<FakeStatement> {
        self.db.prepare_named(sql).await
    }

    async fn query_scalar(&self, stmt: &FakeStatement, args: &NamedArgs) -> PipeResult<Option<Value>> {
        self.db.query_scalar(stmt, args).await
    }

    async fn execute_prepared(&self, stmt: &FakeStatement, args: &NamedArgs) -> PipeResult<u64> {
        self.db.execute_prepared(stmt, args).await
    }

    async fn query_prepared(&self, stmt: &FakeStatement, args: &NamedArgs) -> PipeResult<Vec<Row>> {
        self.db.query_prepared(stmt, args).await
    }

    fn close_prepared(&self, stmt: FakeStatement) {
        self.db.close_prepared(stmt);
    }
}

impl PipelineTransaction for FakeTx<'_> {
    async fn commit(mut self) -> PipeResult<()> {
        self.done = true;
        self.db.log(Event::Commit);
        if self.db.fail_commit {
            self.db.finish(false);
            return Err(PipeError::Other("commit refused".to_string()));
        }
        self.db.finish(true);
        Ok(())
    }

    async fn rollback(mut self) -> PipeResult<()> {
        self.done = true;
        self.db.log(Event::Rollback);
        self.db.finish(false);
        if self.db.fail_rollback {
            return Err(PipeError::Other("rollback refused".to_string()));
        }
        Ok(())
    }
}

impl Drop for FakeTx<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.db.finish(false);
        }
    }
}

impl<'a> TransactionSource for &'a mut FakeDb {
    type Tx = FakeTx<'a>;

    async fn begin(self) -> PipeResult<FakeTx<'a>> {
        self.log(Event::Begin);
        if self.fail_begin {
            return Err(PipeError::Connection("begin refused".to_string()));
        }
        self.lock().in_tx = true;
        Ok(FakeTx {
            db: self,
            done: false,
        })
    }
}

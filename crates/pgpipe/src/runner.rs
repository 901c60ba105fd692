//! Runs a [`Pipeline`] inside one transaction.
//!
//! Entries run in insertion order. Each entry's arguments are resolved
//! against the outputs recorded so far, so a later statement can bind the
//! identifier an earlier insert produced. The first failure stops the run and
//! rolls the transaction back; the transaction commits only when every entry
//! succeeded and the run was not cancelled.
//!
//! A panic raised while an entry runs also rolls back, then resumes.

use crate::args::pairs_with_results;
use crate::client::{GenericClient, PipelineTransaction, TransactionSource};
use crate::context::RunContext;
use crate::error::{PipeError, PipeResult};
use crate::executor::{debug_query, execute_statement};
use crate::pipeline::Pipeline;
use crate::result::ExecResult;
use futures_util::FutureExt;
use std::panic::{AssertUnwindSafe, resume_unwind};

/// Lifecycle of the transaction owned by one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    NotStarted,
    Running,
    Committed,
    RolledBack,
}

struct StateLog {
    state: TxState,
}

impl StateLog {
    fn new() -> Self {
        Self {
            state: TxState::NotStarted,
        }
    }

    fn to(&mut self, next: TxState) {
        tracing::debug!(target: "pgpipe.tx", from = ?self.state, to = ?next, "transaction state");
        self.state = next;
    }
}

/// Open a transaction on `source` and run `pipeline` in it.
///
/// An empty pipeline returns an empty result without opening a transaction.
pub async fn exec_in_tx<S: TransactionSource>(
    ctx: &RunContext,
    source: S,
    pipeline: &Pipeline,
    debug: bool,
) -> PipeResult<ExecResult> {
    if !pipeline.is_transactional() {
        return Ok(ExecResult::new());
    }
    ctx.check()?;

    let tx = source.begin().await?;
    run_pipeline(ctx, tx, pipeline, debug).await
}

/// Run `pipeline` on an open transaction, then commit or roll it back.
///
/// Errors raised by a statement come back as [`PipeError::TransactionAborted`]
/// carrying the zero-based entry position and the statement key. Cancellation
/// comes back as [`PipeError::Cancelled`] or [`PipeError::DeadlineExceeded`].
/// A failed rollback is logged and never replaces the original error.
pub async fn run_pipeline<T: PipelineTransaction>(
    ctx: &RunContext,
    tx: T,
    pipeline: &Pipeline,
    debug: bool,
) -> PipeResult<ExecResult> {
    let mut log = StateLog::new();
    log.to(TxState::Running);

    let outcome = AssertUnwindSafe(run_entries(ctx, &tx, pipeline, debug))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(results)) => match ctx.check() {
            Ok(()) => {
                let committed = tx.commit().await;
                match committed {
                    Ok(()) => log.to(TxState::Committed),
                    Err(_) => log.to(TxState::RolledBack),
                }
                committed.map(|()| results)
            }
            Err(e) => {
                rollback_quietly(tx).await;
                log.to(TxState::RolledBack);
                Err(e)
            }
        },
        Ok(Err(e)) => {
            rollback_quietly(tx).await;
            log.to(TxState::RolledBack);
            Err(e)
        }
        Err(panic) => {
            rollback_quietly(tx).await;
            log.to(TxState::RolledBack);
            resume_unwind(panic)
        }
    }
}

async fn run_entries<C: GenericClient>(
    ctx: &RunContext,
    conn: &C,
    pipeline: &Pipeline,
    debug: bool,
) -> PipeResult<ExecResult> {
    let mut results = ExecResult::new();

    for (position, (key, kv)) in pipeline.iter().enumerate() {
        ctx.check()?;

        let args = pairs_with_results(kv, &results).map_err(|e| aborted(position, key, e))?;
        if debug {
            debug_query(key, &args);
        }
        let value = execute_statement(conn, key, &args)
            .await
            .map_err(|e| aborted(position, key, e))?;

        results.record(key, value);
    }

    Ok(results)
}

fn aborted(position: usize, key: &str, err: PipeError) -> PipeError {
    PipeError::TransactionAborted {
        position,
        statement: key.to_string(),
        source: Box::new(err.at_position(position)),
    }
}

async fn rollback_quietly<T: PipelineTransaction>(tx: T) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(target: "pgpipe.tx", error = %e, "rollback failed");
    }
}

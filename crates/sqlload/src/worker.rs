//! Per-shard batch worker.
//!
//! A worker owns one bounded shard channel and exactly one database session
//! for its lifetime. It drains the channel in transactional batches and
//! reports its result as a value; a failure abandons the shard's remaining
//! work without disturbing sibling shards.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, trace, warn};

use crate::session::SessionFactory;
use crate::statement::{Phase, Statement};
use crate::stats::LoadStats;

/// Result of one worker's run, aggregated by the phase runner.
#[derive(Clone, Debug)]
pub struct ShardOutcome {
    pub shard: usize,
    pub executed: u64,
    pub batches: u64,
    pub error: Option<String>,
}

/// Drain one shard channel in transactional batches until it closes.
///
/// Termination is channel closure, never an emptiness check: the dispatcher
/// drops its senders once the phase source is exhausted. A transiently
/// empty channel only flushes the current partial batch early.
pub async fn run_worker(
    phase: Phase,
    shard: usize,
    mut rx: mpsc::Receiver<Statement>,
    factory: Arc<dyn SessionFactory>,
    batch_size: usize,
    liveness_timeout: Duration,
    stats: Arc<LoadStats>,
) -> ShardOutcome {
    let mut outcome = ShardOutcome {
        shard,
        executed: 0,
        batches: 0,
        error: None,
    };

    let mut session = match factory.connect().await {
        Ok(session) => session,
        Err(err) => {
            warn!(%phase, shard, error = %format!("{err:#}"), "worker failed to open session");
            outcome.error = Some(format!("{err:#}"));
            stats.record_failed_shard();
            return outcome;
        }
    };

    // Verify the session before touching any batch; a dead session fails
    // this worker only.
    match time::timeout(liveness_timeout, session.ping()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(%phase, shard, error = %format!("{err:#}"), "session liveness probe failed");
            outcome.error = Some(format!("liveness probe: {err:#}"));
            stats.record_failed_shard();
            return outcome;
        }
        Err(_) => {
            warn!(%phase, shard, timeout = ?liveness_timeout, "session liveness probe timed out");
            outcome.error = Some(format!(
                "liveness probe timed out after {}",
                humantime::format_duration(liveness_timeout)
            ));
            stats.record_failed_shard();
            return outcome;
        }
    }

    let mut batch: Vec<Statement> = Vec::with_capacity(batch_size);
    loop {
        batch.clear();
        match rx.recv().await {
            Some(stmt) => batch.push(stmt),
            // Channel closed and drained: this phase is complete.
            None => break,
        }
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(stmt) => batch.push(stmt),
                // Empty right now (or closed): flush the partial batch.
                Err(_) => break,
            }
        }

        for stmt in &batch {
            trace!(%phase, shard, statement = stmt.preview(), "queued in batch");
        }

        if let Err(err) = session.execute_batch(&batch).await {
            warn!(
                %phase,
                shard,
                statements = batch.len(),
                error = %format!("{err:#}"),
                "batch failed; abandoning remaining work for this shard"
            );
            outcome.error = Some(format!("{err:#}"));
            stats.record_failed_shard();
            break;
        }

        outcome.batches += 1;
        outcome.executed += batch.len() as u64;
        stats.record_batch(phase, batch.len() as u64);
        debug!(
            %phase,
            shard,
            commit = outcome.batches,
            statements = batch.len(),
            "committed batch"
        );
    }

    // Dropping `rx` discards any undispatched remainder after a failure;
    // dropping the session closes the connection, success or failure.
    outcome
}

//! Phase orchestration: sharded dispatch, worker barriers, run reports.
//!
//! `Loader::run` streams the dump through the classifier while executing
//! the three phases strictly in order. Within a phase, a single dispatcher
//! routes statements to P bounded shard channels by stable content hash;
//! a full channel suspends the dispatcher, coupling dispatch rate to the
//! slowest worker. The phase barrier is the join of all P worker tasks.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::ensure;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::classifier::{classify_file, phase_channels};
use crate::session::SessionFactory;
use crate::shard::shard_index;
use crate::statement::{Phase, Statement};
use crate::stats::{LoadStats, LoadStatsSnapshot};
use crate::worker::run_worker;

/// Tunables for one load run.
#[derive(Clone, Debug)]
pub struct LoadConfig {
    /// Statements per transaction; also the shard-channel capacity.
    pub batch_size: usize,
    /// Number of shards (= workers) per phase.
    pub partitions: usize,
    /// Upper bound for the pre-batch session liveness probe.
    pub liveness_timeout: Duration,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            partitions: 4,
            liveness_timeout: Duration::from_secs(10),
        }
    }
}

/// One shard's result within a phase.
#[derive(Clone, Debug, Serialize)]
pub struct ShardReport {
    pub shard: usize,
    pub executed: u64,
    pub batches: u64,
    pub error: Option<String>,
}

/// Aggregated result of one phase.
#[derive(Clone, Debug, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Statements the classifier routed into this phase.
    pub classified: u64,
    /// Statements handed to a shard channel.
    pub dispatched: u64,
    /// Statements that could not be dispatched because their shard's worker
    /// had already abandoned its channel.
    pub undispatched: u64,
    pub executed: u64,
    pub batches: u64,
    pub shards: Vec<ShardReport>,
}

impl PhaseReport {
    pub fn failed(&self) -> bool {
        self.shards.iter().any(|s| s.error.is_some())
    }
}

/// Full result of a load run.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub phases: Vec<PhaseReport>,
    pub stats: LoadStatsSnapshot,
    pub classifier_error: Option<String>,
    pub elapsed_ms: u64,
    pub batch_size: usize,
    pub partitions: usize,
}

impl RunReport {
    /// True when any shard failed or the dump could not be fully read.
    pub fn failed(&self) -> bool {
        self.classifier_error.is_some() || self.phases.iter().any(PhaseReport::failed)
    }
}

/// Orchestrates classification and the three execution phases.
pub struct Loader {
    config: LoadConfig,
    factory: Arc<dyn SessionFactory>,
    stats: Arc<LoadStats>,
}

impl Loader {
    pub fn new(config: LoadConfig, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            config,
            factory,
            stats: Arc::new(LoadStats::default()),
        }
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// Load one dump file to completion.
    ///
    /// Shard failures do not abort the run; they are isolated to their
    /// shard, carried in the report, and surfaced via `RunReport::failed`.
    pub async fn run(&self, path: &Path) -> anyhow::Result<RunReport> {
        ensure!(self.config.batch_size > 0, "batch_size must be > 0");
        ensure!(self.config.partitions > 0, "partitions must be > 0");

        let start = Instant::now();
        let (senders, mut receivers) = phase_channels();

        // Classification streams into the phase channels while the first
        // phase is already executing; dropped senders mark each channel
        // complete.
        let classifier = {
            let path = path.to_path_buf();
            let stats = self.stats.clone();
            tokio::spawn(async move { classify_file(&path, senders, stats).await })
        };

        let mut phases = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            let report = self.run_phase(phase, receivers.take(phase)).await;
            info!(
                %phase,
                classified = report.classified,
                executed = report.executed,
                batches = report.batches,
                failed_shards = report.shards.iter().filter(|s| s.error.is_some()).count(),
                "phase complete"
            );
            phases.push(report);
        }

        // The classifier finished before the first phase barrier (its
        // senders had to close); this only collects its result.
        let classifier_error = match classifier.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => {
                warn!(error = %format!("{err:#}"), "classification aborted early");
                Some(format!("{err:#}"))
            }
            Err(err) => Some(format!("classifier task panicked: {err}")),
        };

        Ok(RunReport {
            phases,
            stats: self.stats.snapshot(),
            classifier_error,
            elapsed_ms: start.elapsed().as_millis().min(u128::from(u64::MAX)) as u64,
            batch_size: self.config.batch_size,
            partitions: self.config.partitions,
        })
    }

    /// Run one phase end-to-end and wait for every worker (the barrier).
    async fn run_phase(
        &self,
        phase: Phase,
        mut source: mpsc::UnboundedReceiver<Statement>,
    ) -> PhaseReport {
        let partitions = self.config.partitions;
        let mut shard_txs = Vec::with_capacity(partitions);
        let mut workers = Vec::with_capacity(partitions);
        for shard in 0..partitions {
            let (tx, rx) = mpsc::channel(self.config.batch_size);
            shard_txs.push(tx);
            workers.push(tokio::spawn(run_worker(
                phase,
                shard,
                rx,
                self.factory.clone(),
                self.config.batch_size,
                self.config.liveness_timeout,
                self.stats.clone(),
            )));
        }

        // Single dispatcher per phase: route by stable hash, block on a
        // full shard channel. A closed shard channel means its worker
        // already failed; that statement joins the shard's abandoned
        // remainder.
        let mut dispatched = 0u64;
        let mut undispatched = 0u64;
        while let Some(stmt) = source.recv().await {
            let idx = shard_index(&stmt.text, partitions);
            if shard_txs[idx].send(stmt).await.is_ok() {
                dispatched += 1;
            } else {
                undispatched += 1;
            }
        }
        drop(shard_txs);

        let mut shards = Vec::with_capacity(partitions);
        for (shard, worker) in workers.into_iter().enumerate() {
            match worker.await {
                Ok(outcome) => shards.push(ShardReport {
                    shard: outcome.shard,
                    executed: outcome.executed,
                    batches: outcome.batches,
                    error: outcome.error,
                }),
                Err(err) => {
                    self.stats.record_failed_shard();
                    shards.push(ShardReport {
                        shard,
                        executed: 0,
                        batches: 0,
                        error: Some(format!("worker task panicked: {err}")),
                    });
                }
            }
        }

        if undispatched > 0 {
            warn!(
                %phase,
                undispatched,
                "statements skipped because their shard's worker had failed"
            );
        }

        PhaseReport {
            phase,
            classified: self.stats.classified(phase),
            dispatched,
            undispatched,
            executed: shards.iter().map(|s| s.executed).sum(),
            batches: shards.iter().map(|s| s.batches).sum(),
            shards,
        }
    }
}

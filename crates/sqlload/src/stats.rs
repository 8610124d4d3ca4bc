//! Load counters shared across the classifier, dispatcher, and workers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::statement::Phase;

/// Internal counters used to build `LoadStatsSnapshot`.
#[derive(Default)]
pub struct LoadStats {
    classified: [AtomicU64; 3],
    discarded: AtomicU64,
    comment_lines: AtomicU64,
    executed: [AtomicU64; 3],
    batches: AtomicU64,
    failed_shards: AtomicU64,
}

/// Point-in-time view of the load counters.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct LoadStatsSnapshot {
    pub classified_drop: u64,
    pub classified_create: u64,
    pub classified_insert: u64,
    pub discarded: u64,
    pub comment_lines: u64,
    pub executed_drop: u64,
    pub executed_create: u64,
    pub executed_insert: u64,
    pub batches: u64,
    pub failed_shards: u64,
}

impl LoadStats {
    pub fn record_classified(&self, phase: Phase) {
        self.classified[phase.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_comment_lines(&self, lines: u64) {
        self.comment_lines.fetch_add(lines, Ordering::Relaxed);
    }

    pub fn record_batch(&self, phase: Phase, statements: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.executed[phase.index()].fetch_add(statements, Ordering::Relaxed);
    }

    pub fn record_failed_shard(&self) {
        self.failed_shards.fetch_add(1, Ordering::Relaxed);
    }

    pub fn classified(&self, phase: Phase) -> u64 {
        self.classified[phase.index()].load(Ordering::Relaxed)
    }

    pub fn executed(&self, phase: Phase) -> u64 {
        self.executed[phase.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> LoadStatsSnapshot {
        LoadStatsSnapshot {
            classified_drop: self.classified(Phase::Drop),
            classified_create: self.classified(Phase::Create),
            classified_insert: self.classified(Phase::Insert),
            discarded: self.discarded.load(Ordering::Relaxed),
            comment_lines: self.comment_lines.load(Ordering::Relaxed),
            executed_drop: self.executed(Phase::Drop),
            executed_create: self.executed(Phase::Create),
            executed_insert: self.executed(Phase::Insert),
            batches: self.batches.load(Ordering::Relaxed),
            failed_shards: self.failed_shards.load(Ordering::Relaxed),
        }
    }
}

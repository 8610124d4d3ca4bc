//! Streaming SQL-dump classifier.
//!
//! Reads the dump line by line, accumulates physical lines until one ends
//! with the `;` terminator, and streams each flushed statement into the
//! phase channel matching its leading keyword. Classification overlaps with
//! execution: the first phase may start draining its channel while the tail
//! of the file is still being read.
//!
//! Dropping the phase senders at end-of-input (or on a read error) is the
//! phase-complete signal the rest of the pipeline relies on; there is no
//! emptiness polling anywhere downstream.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::statement::{Phase, Statement};
use crate::stats::LoadStats;

/// Per-phase statement senders, dropped when classification ends.
pub struct PhaseSenders {
    senders: [mpsc::UnboundedSender<Statement>; 3],
}

/// Per-phase statement receivers, consumed one phase at a time.
pub struct PhaseReceivers {
    receivers: [Option<mpsc::UnboundedReceiver<Statement>>; 3],
}

impl PhaseReceivers {
    /// Take ownership of one phase's receiver. Panics if taken twice.
    pub fn take(&mut self, phase: Phase) -> mpsc::UnboundedReceiver<Statement> {
        self.receivers[phase.index()]
            .take()
            .expect("phase receiver already taken")
    }
}

/// Build the three unbounded phase channels.
///
/// The phase channels are unbounded like the reference design's phase
/// queues; backpressure applies downstream at the bounded shard channels.
pub fn phase_channels() -> (PhaseSenders, PhaseReceivers) {
    let (drop_tx, drop_rx) = mpsc::unbounded_channel();
    let (create_tx, create_rx) = mpsc::unbounded_channel();
    let (insert_tx, insert_rx) = mpsc::unbounded_channel();
    (
        PhaseSenders {
            senders: [drop_tx, create_tx, insert_tx],
        },
        PhaseReceivers {
            receivers: [Some(drop_rx), Some(create_rx), Some(insert_rx)],
        },
    )
}

/// Classify a dump file, streaming statements into the phase channels.
///
/// A read error aborts classification; statements already streamed stay in
/// their channels and are still executed.
pub async fn classify_file(
    path: &Path,
    senders: PhaseSenders,
    stats: Arc<LoadStats>,
) -> anyhow::Result<()> {
    let file = File::open(path)
        .await
        .with_context(|| format!("open dump file {}", path.display()))?;
    classify_reader(BufReader::new(file), senders, stats).await
}

/// Classify statements from any buffered line source.
pub async fn classify_reader<R: AsyncBufRead + Unpin>(
    reader: R,
    senders: PhaseSenders,
    stats: Arc<LoadStats>,
) -> anyhow::Result<()> {
    let mut lines = reader.lines();
    let mut pending = String::new();
    let mut in_comment = false;

    while let Some(mut line) = lines.next_line().await.context("read dump line")? {
        if line.ends_with('\r') {
            line.pop();
        }

        // Block comments are line-delimited: a line starting with `/*`
        // opens one, and every line through the one ending with `*/` is
        // discarded. An unterminated comment consumes the rest of the file.
        if in_comment || line.starts_with("/*") {
            stats.record_comment_lines(1);
            in_comment = !line.ends_with("*/");
            continue;
        }

        pending.push_str(&line);
        if !line.ends_with(';') {
            continue;
        }

        let text = std::mem::take(&mut pending);
        match Phase::of_statement(&text) {
            Some(phase) => {
                stats.record_classified(phase);
                // The receiver only disappears once the run is over; a
                // failed send just means nobody is left to execute.
                let _ = senders.senders[phase.index()].send(Statement::new(phase, text));
            }
            None => {
                stats.record_discarded();
                trace!(statement = %text, "discarding unclassified statement");
            }
        }
    }

    if in_comment {
        debug!("dump ended inside an unterminated block comment");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn classify_str(input: &str) -> (Vec<Vec<Statement>>, Arc<LoadStats>) {
        let stats = Arc::new(LoadStats::default());
        let (senders, mut receivers) = phase_channels();
        classify_reader(BufReader::new(input.as_bytes()), senders, stats.clone())
            .await
            .unwrap();

        let mut out = Vec::new();
        for phase in Phase::ALL {
            let mut rx = receivers.take(phase);
            let mut stmts = Vec::new();
            while let Ok(stmt) = rx.try_recv() {
                stmts.push(stmt);
            }
            // The senders are gone, so the channel must be fully closed.
            assert!(rx.try_recv().is_err());
            out.push(stmts);
        }
        (out, stats)
    }

    #[tokio::test]
    async fn splits_dump_into_phase_queues() {
        let input = "DROP TABLE foo;\nCREATE TABLE foo(id int);\nINSERT INTO foo VALUES(1);\nINSERT INTO foo VALUES(2);\n";
        let (phases, stats) = classify_str(input).await;
        assert_eq!(phases[0].len(), 1);
        assert_eq!(phases[1].len(), 1);
        assert_eq!(phases[2].len(), 2);
        assert_eq!(stats.classified(Phase::Insert), 2);
    }

    #[tokio::test]
    async fn accumulates_multi_line_statements() {
        let input = "CREATE TABLE foo (\n  id int,\n  name text\n);\n";
        let (phases, _) = classify_str(input).await;
        assert_eq!(phases[1].len(), 1);
        assert_eq!(phases[1][0].text, "CREATE TABLE foo (  id int,  name text);");
    }

    #[tokio::test]
    async fn discards_statements_of_other_kinds() {
        let input = "SET NAMES utf8;\nDROP TABLE t;\nSELECT 1;\n";
        let (phases, stats) = classify_str(input).await;
        assert_eq!(phases[0].len(), 1);
        assert_eq!(phases[1].len(), 0);
        assert_eq!(phases[2].len(), 0);
        assert_eq!(stats.snapshot().discarded, 2);
    }

    #[tokio::test]
    async fn skips_block_comments_entirely() {
        let input = "/* comment\nline2\n*/\nINSERT INTO t VALUES(1);\n";
        let (phases, stats) = classify_str(input).await;
        assert_eq!(phases[2].len(), 1);
        assert_eq!(phases[2][0].text, "INSERT INTO t VALUES(1);");
        assert_eq!(stats.snapshot().comment_lines, 3);
    }

    #[tokio::test]
    async fn single_line_block_comment_skips_one_line() {
        let input = "/* header */\nDROP TABLE t;\n";
        let (phases, stats) = classify_str(input).await;
        assert_eq!(phases[0].len(), 1);
        assert_eq!(stats.snapshot().comment_lines, 1);
    }

    #[tokio::test]
    async fn unterminated_comment_consumes_remaining_input() {
        let input = "DROP TABLE t;\n/* open comment\nINSERT INTO t VALUES(1);\n";
        let (phases, _) = classify_str(input).await;
        assert_eq!(phases[0].len(), 1);
        assert_eq!(phases[2].len(), 0);
    }

    #[tokio::test]
    async fn handles_crlf_line_endings() {
        let input = "DROP TABLE t;\r\nINSERT INTO t VALUES(1);\r\n";
        let (phases, _) = classify_str(input).await;
        assert_eq!(phases[0].len(), 1);
        assert_eq!(phases[2].len(), 1);
        assert_eq!(phases[2][0].text, "INSERT INTO t VALUES(1);");
    }

    #[tokio::test]
    async fn statement_without_terminator_is_never_flushed() {
        let input = "INSERT INTO t VALUES(1);\nINSERT INTO t VALUES(2)\n";
        let (phases, _) = classify_str(input).await;
        assert_eq!(phases[2].len(), 1);
    }
}

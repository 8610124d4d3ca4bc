//! Shared mock session plumbing for pipeline tests.

use std::sync::{Arc, Mutex};

use anyhow::bail;
use async_trait::async_trait;
use sqlload::{Phase, SessionFactory, SqlSession, Statement};

/// One committed batch observed by a mock session, in commit order.
#[derive(Clone, Debug)]
pub struct Commit {
    pub phase: Phase,
    pub statements: Vec<String>,
}

/// Session factory that records every commit into a shared log and can
/// inject failures.
#[derive(Default)]
pub struct MockFactory {
    log: Arc<Mutex<Vec<Commit>>>,
    fail_matching: Option<String>,
    fail_ping: bool,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any batch containing a statement with this substring.
    pub fn failing_on(substr: &str) -> Self {
        Self {
            fail_matching: Some(substr.to_string()),
            ..Self::default()
        }
    }

    /// Fail every session's liveness probe.
    pub fn failing_ping() -> Self {
        Self {
            fail_ping: true,
            ..Self::default()
        }
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.log.lock().unwrap().clone()
    }

    /// All committed statement texts for one phase, in commit order.
    pub fn committed(&self, phase: Phase) -> Vec<String> {
        self.commits()
            .into_iter()
            .filter(|c| c.phase == phase)
            .flat_map(|c| c.statements)
            .collect()
    }
}

struct MockSession {
    log: Arc<Mutex<Vec<Commit>>>,
    fail_matching: Option<String>,
    fail_ping: bool,
}

#[async_trait]
impl SqlSession for MockSession {
    async fn ping(&mut self) -> anyhow::Result<()> {
        if self.fail_ping {
            bail!("injected liveness failure");
        }
        Ok(())
    }

    async fn execute_batch(&mut self, batch: &[Statement]) -> anyhow::Result<()> {
        if let Some(needle) = &self.fail_matching {
            if batch.iter().any(|stmt| stmt.text.contains(needle)) {
                bail!("injected batch failure on {needle:?}");
            }
        }
        let phase = batch.first().expect("empty batch").phase;
        self.log.lock().unwrap().push(Commit {
            phase,
            statements: batch.iter().map(|s| s.text.clone()).collect(),
        });
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn connect(&self) -> anyhow::Result<Box<dyn SqlSession>> {
        Ok(Box::new(MockSession {
            log: self.log.clone(),
            fail_matching: self.fail_matching.clone(),
            fail_ping: self.fail_ping,
        }))
    }
}

/// Write a dump fixture and return the file (kept alive by the caller).
pub fn dump_file(contents: &str) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().expect("create dump fixture");
    std::fs::write(file.path(), contents).expect("write dump fixture");
    file
}

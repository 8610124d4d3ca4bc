//! Database session seam.
//!
//! Workers talk to the database through `SqlSession` so the batch pipeline
//! can be exercised against a recording mock in tests. The production
//! implementation wraps a `tokio_postgres::Client` with one connection task
//! per session; sessions are opened per worker per phase and never shared.

use anyhow::Context;
use async_trait::async_trait;
use tokio_postgres::NoTls;
use tracing::warn;

use crate::statement::Statement;

/// One worker's exclusive database session.
#[async_trait]
pub trait SqlSession: Send {
    /// Cheap liveness probe, run once before any batch executes.
    async fn ping(&mut self) -> anyhow::Result<()>;

    /// Execute one batch of statements as a single transaction.
    async fn execute_batch(&mut self, batch: &[Statement]) -> anyhow::Result<()>;
}

/// Opens fresh sessions for workers at phase start.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Box<dyn SqlSession>>;
}

/// Postgres-backed session factory.
pub struct PgSessionFactory {
    config: tokio_postgres::Config,
}

impl PgSessionFactory {
    /// Build a factory from a connection string, e.g.
    /// `host=localhost user=postgres dbname=dump` or a `postgres://` URL.
    pub fn from_dsn(
        dsn: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut config = dsn
            .parse::<tokio_postgres::Config>()
            .context("parse database DSN")?;
        if let Some(user) = user {
            config.user(user);
        }
        if let Some(password) = password {
            config.password(password);
        }
        Ok(Self { config })
    }
}

#[async_trait]
impl SessionFactory for PgSessionFactory {
    async fn connect(&self) -> anyhow::Result<Box<dyn SqlSession>> {
        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .context("connect to database")?;
        // The connection task ends when the client is dropped; a mid-run
        // failure surfaces to the worker as a failed batch.
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!(error = %err, "database connection task ended with error");
            }
        });
        Ok(Box::new(PgSession { client }))
    }
}

/// `SqlSession` over a dedicated tokio-postgres client.
pub struct PgSession {
    client: tokio_postgres::Client,
}

#[async_trait]
impl SqlSession for PgSession {
    async fn ping(&mut self) -> anyhow::Result<()> {
        self.client
            .simple_query("SELECT 1")
            .await
            .context("session liveness probe")?;
        Ok(())
    }

    async fn execute_batch(&mut self, batch: &[Statement]) -> anyhow::Result<()> {
        let joined = batch
            .iter()
            .map(|stmt| stmt.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let tx = self
            .client
            .transaction()
            .await
            .context("begin batch transaction")?;
        tx.batch_execute(&joined)
            .await
            .context("execute statement batch")?;
        tx.commit().await.context("commit statement batch")?;
        Ok(())
    }
}

//! Partitioned bulk loader for large SQL dump files.
//!
//! The dump is classified into three strictly ordered phases (DROP, CREATE,
//! INSERT). Within a phase, statements are sharded by a stable content hash
//! across a fixed set of workers, each of which owns one bounded channel and
//! one database session and commits fixed-size batches transactionally.
//! Shard failures are isolated and reported, never retried.
//!
//! Relative order of same-kind statements is only preserved within one
//! shard's FIFO channel; dumps whose statements depend on cross-statement
//! ordering inside a phase (e.g. foreign-key-ordered inserts) are not safe
//! to load with this tool.

pub mod classifier;
pub mod runner;
pub mod session;
pub mod shard;
pub mod statement;
pub mod stats;
pub mod worker;

pub use runner::{LoadConfig, Loader, PhaseReport, RunReport, ShardReport};
pub use session::{PgSessionFactory, SessionFactory, SqlSession};
pub use statement::{Phase, Statement};
pub use stats::{LoadStats, LoadStatsSnapshot};

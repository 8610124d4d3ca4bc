//! Stable statement-to-shard routing.
//!
//! Routing must be a pure function of the statement text so a statement
//! always lands on the same shard within a run, independent of platform or
//! process. A CRC32 of the raw bytes gives that stability cheaply.

/// Select the shard index for a statement.
pub fn shard_index(text: &str, partitions: usize) -> usize {
    debug_assert!(partitions > 0);
    crc32fast::hash(text.as_bytes()) as usize % partitions.max(1)
}

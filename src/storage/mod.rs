//! Storage boundary.
//!
//! The backend is modeled as a separate key-value service supporting
//! concurrent readers and writers: per-key puts and removes rely only on
//! whatever synchronization the backend natively provides, and there is no
//! multi-key transaction. [`MemoryStorage`] is the in-process implementation;
//! a networked backend plugs in behind the same trait.

mod memory;

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;

use crate::entry::{CacheEntry, Freshness};
use crate::error::StorageError;
use crate::fingerprint::CacheKey;
use crate::invalidate::Pattern;

pub use memory::MemoryStorage;

/// Connectivity report for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStatus {
    pub connected: bool,
    pub backend: String,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The cache storage backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist an entry under `key`, indexed by `flags`.
    async fn put(
        &self,
        key: &CacheKey,
        entry: CacheEntry,
        flags: &[String],
    ) -> Result<(), StorageError>;

    /// Fetch an entry with its freshness at `now`.
    ///
    /// Entries past TTL and grace are removed and reported as absent.
    async fn lookup(
        &self,
        key: &CacheKey,
        now: OffsetDateTime,
    ) -> Result<Option<(CacheEntry, Freshness)>, StorageError>;

    /// Remove every entry reachable through flags matching `pattern`.
    ///
    /// Returns the number of entries purged. Must be idempotent: re-running
    /// the same pattern after a partial failure completes the purge.
    async fn purge(&self, pattern: &Pattern) -> Result<u64, StorageError>;

    /// Report backend connectivity and size.
    async fn status(&self) -> StorageStatus;
}

//! Shared test doubles for the integration suite.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rime::entry::{CacheEntry, Freshness};
use rime::error::StorageError;
use rime::fingerprint::CacheKey;
use rime::invalidate::Pattern;
use rime::storage::{MemoryStorage, Storage, StorageStatus};
use time::OffsetDateTime;

/// One observed `put` call.
#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub key: String,
    pub entry: CacheEntry,
    pub flags: Vec<String>,
}

/// Storage double that records every write while delegating to a real
/// in-memory backend, so tests can assert on exactly what was stored.
pub struct RecordingStorage {
    inner: MemoryStorage,
    puts: Mutex<Vec<RecordedPut>>,
}

impl RecordingStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStorage::new(),
            puts: Mutex::new(Vec::new()),
        })
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().expect("puts lock").clone()
    }

    pub fn last_put(&self) -> Option<RecordedPut> {
        self.puts().into_iter().next_back()
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn put(
        &self,
        key: &CacheKey,
        entry: CacheEntry,
        flags: &[String],
    ) -> Result<(), StorageError> {
        self.puts.lock().expect("puts lock").push(RecordedPut {
            key: key.as_str().to_string(),
            entry: entry.clone(),
            flags: flags.to_vec(),
        });
        self.inner.put(key, entry, flags).await
    }

    async fn lookup(
        &self,
        key: &CacheKey,
        now: OffsetDateTime,
    ) -> Result<Option<(CacheEntry, Freshness)>, StorageError> {
        self.inner.lookup(key, now).await
    }

    async fn purge(&self, pattern: &Pattern) -> Result<u64, StorageError> {
        self.inner.purge(pattern).await
    }

    async fn status(&self) -> StorageStatus {
        self.inner.status().await
    }
}

/// Storage double whose every operation fails, for exercising the
/// swallow-and-serve error paths.
pub struct FailingStorage;

#[async_trait]
impl Storage for FailingStorage {
    async fn put(
        &self,
        _key: &CacheKey,
        _entry: CacheEntry,
        _flags: &[String],
    ) -> Result<(), StorageError> {
        Err(StorageError::connection("backend unreachable"))
    }

    async fn lookup(
        &self,
        _key: &CacheKey,
        _now: OffsetDateTime,
    ) -> Result<Option<(CacheEntry, Freshness)>, StorageError> {
        Err(StorageError::connection("backend unreachable"))
    }

    async fn purge(&self, _pattern: &Pattern) -> Result<u64, StorageError> {
        Err(StorageError::connection("backend unreachable"))
    }

    async fn status(&self) -> StorageStatus {
        StorageStatus {
            connected: false,
            backend: "failing".to_string(),
            entries: 0,
            error: Some("backend unreachable".to_string()),
        }
    }
}

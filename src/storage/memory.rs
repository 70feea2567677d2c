//! In-memory storage backend.
//!
//! Entries live in a concurrent map; a flag → key-set index realizes the
//! many-to-many relation between flags and entries for pattern purges. The
//! index is kept consistent on every removal path so that a purge retried
//! after interruption finds a coherent view.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::debug;

use crate::entry::{CacheEntry, Freshness};
use crate::error::StorageError;
use crate::fingerprint::CacheKey;
use crate::invalidate::Pattern;
use crate::lock::{rw_read, rw_write};

use super::{Storage, StorageStatus};

const SOURCE: &str = "storage::memory";

struct Stored {
    entry: CacheEntry,
    flags: Vec<String>,
}

/// Process-local storage backend.
pub struct MemoryStorage {
    entries: DashMap<String, Stored>,
    flag_index: RwLock<HashMap<String, HashSet<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            flag_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flags currently tagging `key`, for inspection in tests and tooling.
    pub fn flags_for(&self, key: &CacheKey) -> Vec<String> {
        self.entries
            .get(key.as_str())
            .map(|stored| stored.flags.clone())
            .unwrap_or_default()
    }

    fn unindex(&self, key: &str, flags: &[String]) {
        let mut index = rw_write(&self.flag_index, SOURCE, "unindex");
        for flag in flags {
            if let Some(keys) = index.get_mut(flag) {
                keys.remove(key);
                if keys.is_empty() {
                    index.remove(flag);
                }
            }
        }
    }

    fn remove_entry(&self, key: &str) -> bool {
        let Some((_, stored)) = self.entries.remove(key) else {
            return false;
        };
        self.unindex(key, &stored.flags);
        true
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(
        &self,
        key: &CacheKey,
        entry: CacheEntry,
        flags: &[String],
    ) -> Result<(), StorageError> {
        // Re-writing a key must not leave stale index pointers behind.
        if let Some(previous) = self.entries.get(key.as_str()) {
            let old_flags = previous.flags.clone();
            drop(previous);
            self.unindex(key.as_str(), &old_flags);
        }

        {
            let mut index = rw_write(&self.flag_index, SOURCE, "put.index");
            for flag in flags {
                index
                    .entry(flag.clone())
                    .or_default()
                    .insert(key.as_str().to_string());
            }
        }

        self.entries.insert(
            key.as_str().to_string(),
            Stored {
                entry,
                flags: flags.to_vec(),
            },
        );
        Ok(())
    }

    async fn lookup(
        &self,
        key: &CacheKey,
        now: OffsetDateTime,
    ) -> Result<Option<(CacheEntry, Freshness)>, StorageError> {
        let expired = match self.entries.get(key.as_str()) {
            None => return Ok(None),
            Some(stored) => match stored.entry.freshness(now) {
                Some(freshness) => return Ok(Some((stored.entry.clone(), freshness))),
                None => true,
            },
        };

        if expired {
            debug!(key = %key, "entry past grace; removing");
            self.remove_entry(key.as_str());
        }
        Ok(None)
    }

    async fn purge(&self, pattern: &Pattern) -> Result<u64, StorageError> {
        let matched: Vec<String> = {
            let index = rw_read(&self.flag_index, SOURCE, "purge.scan");
            index
                .keys()
                .filter(|flag| pattern.matches(flag))
                .cloned()
                .collect()
        };

        let mut keys: HashSet<String> = HashSet::new();
        {
            let mut index = rw_write(&self.flag_index, SOURCE, "purge.take");
            for flag in &matched {
                if let Some(flagged) = index.remove(flag) {
                    keys.extend(flagged);
                }
            }
        }

        let mut purged = 0;
        for key in keys {
            if self.remove_entry(&key) {
                purged += 1;
            }
        }
        Ok(purged)
    }

    async fn status(&self) -> StorageStatus {
        StorageStatus {
            connected: true,
            backend: "memory".to_string(),
            entries: self.entries.len(),
            error: None,
        }
    }
}

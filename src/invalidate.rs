//! Pattern-based invalidation.
//!
//! Clearing is a two-step operation: patterns are enqueued on a shared queue
//! and purged in a batch by `execute_queue`. Execution is best-effort and
//! idempotent; a failed run can be retried with the same pattern and the flag
//! index is never left pointing at purged entries.

use std::fmt;
use std::sync::{Arc, Mutex};

use metrics::counter;
use tracing::{info, warn};

use crate::lock::mutex_lock;
use crate::storage::Storage;

const SOURCE: &str = "invalidate";

pub(crate) const METRIC_INVALIDATION_RUN_TOTAL: &str = "rime_cache_invalidation_run_total";
pub(crate) const METRIC_INVALIDATED_ENTRIES_TOTAL: &str = "rime_cache_invalidated_entries_total";

/// A flag pattern: exact match, prefix wildcard, or match-everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    All,
    Prefix(String),
    Exact(String),
}

impl Pattern {
    pub fn parse(raw: &str) -> Self {
        if raw == "*" {
            Self::All
        } else if let Some(prefix) = raw.strip_suffix('*') {
            Self::Prefix(prefix.to_string())
        } else {
            Self::Exact(raw.to_string())
        }
    }

    pub fn matches(&self, flag: &str) -> bool {
        match self {
            Self::All => true,
            Self::Prefix(prefix) => flag.starts_with(prefix.as_str()),
            Self::Exact(exact) => flag == exact,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
            Self::Exact(exact) => f.write_str(exact),
        }
    }
}

/// Shared queue of pending invalidation patterns.
pub struct ClearQueue {
    pending: Mutex<Vec<Pattern>>,
}

impl ClearQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn enqueue(&self, pattern: Pattern) {
        mutex_lock(&self.pending, SOURCE, "enqueue").push(pattern);
    }

    pub fn drain(&self) -> Vec<Pattern> {
        mutex_lock(&self.pending, SOURCE, "drain")
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.pending, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ClearQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `CacheEngine::clear`; executes the queued purge.
pub struct ClearHandle {
    queue: Arc<ClearQueue>,
    storage: Arc<dyn Storage>,
}

impl ClearHandle {
    pub(crate) fn new(queue: Arc<ClearQueue>, storage: Arc<dyn Storage>) -> Self {
        Self { queue, storage }
    }

    /// Enqueue a further pattern before execution.
    pub fn flags(self, pattern: &str) -> Self {
        self.queue.enqueue(Pattern::parse(pattern));
        self
    }

    /// Drain the queue and purge every entry reachable through matched flags.
    ///
    /// Returns `false` if any pattern failed to purge; the failed patterns can
    /// be re-enqueued and retried without corrupting the flag index.
    pub async fn execute_queue(self) -> bool {
        let patterns = self.queue.drain();
        if patterns.is_empty() {
            return true;
        }

        let mut purged_total: u64 = 0;
        let mut ok = true;

        for pattern in patterns {
            match self.storage.purge(&pattern).await {
                Ok(purged) => {
                    info!(pattern = %pattern, purged, "invalidation pattern executed");
                    purged_total += purged;
                }
                Err(error) => {
                    warn!(pattern = %pattern, %error, "invalidation pattern failed; retryable");
                    ok = false;
                }
            }
        }

        counter!(METRIC_INVALIDATION_RUN_TOTAL).increment(1);
        counter!(METRIC_INVALIDATED_ENTRIES_TOTAL).increment(purged_total);
        ok
    }
}

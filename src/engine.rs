//! The cache engine.
//!
//! Composes the decision gate, fingerprint generator, entry writer, and
//! invalidation queue over an injected storage backend. Consumers receive the
//! engine as an explicit dependency (middleware state, listener constructor);
//! there is no global accessor.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Settings;
use crate::decision::{self, CacheRule, Decision};
use crate::entry::EntryWriter;
use crate::fingerprint::{self, CacheKey, RequestState};
use crate::invalidate::{ClearHandle, ClearQueue, Pattern};
use crate::storage::{Storage, StorageStatus};

pub struct CacheEngine {
    settings: Settings,
    rules: Vec<Box<dyn CacheRule>>,
    storage: Arc<dyn Storage>,
    writer: EntryWriter,
    queue: Arc<ClearQueue>,
}

impl CacheEngine {
    pub fn new(settings: Settings, storage: Arc<dyn Storage>) -> Self {
        let writer = EntryWriter::new(&settings.cache, storage.clone());
        Self {
            settings,
            rules: vec![Box::new(decision::MethodRule)],
            storage,
            writer,
            queue: Arc::new(ClearQueue::new()),
        }
    }

    /// Add rules to the decision gate, after the built-in method rule.
    pub fn with_rules(mut self, rules: Vec<Box<dyn CacheRule>>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    pub fn writer(&self) -> &EntryWriter {
        &self.writer
    }

    /// Normalize an axum request into caching-relevant state.
    pub fn request_state(&self, request: &axum::http::Request<axum::body::Body>) -> RequestState {
        RequestState::from_request(request, &self.settings.cache.vary_cookies)
    }

    /// Gate pre-check: aggregate the injected rules. Never errors; degrades
    /// to a deny.
    pub fn is_caching_allowed(&self, request: &RequestState) -> Decision {
        decision::evaluate(&self.rules, request)
    }

    pub fn is_cacheable_status(&self, status: u16) -> bool {
        self.settings
            .cache
            .cacheable_status_codes
            .contains(&status)
    }

    pub fn fingerprint(&self, request: &RequestState) -> CacheKey {
        fingerprint::generate(request)
    }

    pub fn url_hash(&self, request: &RequestState) -> String {
        fingerprint::url_hash(request)
    }

    /// Enqueue an invalidation pattern; call `execute_queue` on the returned
    /// handle to run the purge.
    pub fn clear(&self, pattern: &str) -> ClearHandle {
        self.queue.enqueue(Pattern::parse(pattern));
        ClearHandle::new(self.queue.clone(), self.storage.clone())
    }

    /// Build the status report consumed by the CLI.
    pub async fn status(&self) -> StatusReport {
        StatusReport {
            middleware_enabled: self.settings.middleware.enabled,
            groups: self.settings.middleware.groups.clone(),
            cacheable_status_codes: self.settings.cache.cacheable_status_codes.clone(),
            compression: self.settings.cache.compression,
            clear_mappings: self.settings.clear.len(),
            storage: self.storage.status().await,
        }
    }
}

/// Snapshot of engine configuration and backend connectivity.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub middleware_enabled: bool,
    pub groups: Vec<String>,
    pub cacheable_status_codes: Vec<u16>,
    pub compression: bool,
    pub clear_mappings: usize,
    pub storage: StorageStatus,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let middleware = if self.middleware_enabled {
            format!("Enabled [{}]", self.groups.join(", "))
        } else {
            "Disabled".to_string()
        };
        let storage = if self.storage.connected {
            format!("Connected ({})", self.storage.backend)
        } else {
            format!(
                "Unavailable ({})",
                self.storage.error.as_deref().unwrap_or("connection failed")
            )
        };
        let codes: Vec<String> = self
            .cacheable_status_codes
            .iter()
            .map(u16::to_string)
            .collect();

        writeln!(f, "{:<28}{}", "Middleware", middleware)?;
        writeln!(f, "{:<28}{}", "Storage Backend", storage)?;
        writeln!(f, "{:<28}{}", "Cached Entries", self.storage.entries)?;
        writeln!(f, "{:<28}{}", "Cacheable Status Codes", codes.join(", "))?;
        writeln!(
            f,
            "{:<28}{}",
            "Compression",
            if self.compression { "On" } else { "Off" }
        )?;
        write!(f, "{:<28}{}", "Clear Mappings", self.clear_mappings)
    }
}

//! Cache entries and the entry writer.
//!
//! The writer builds an immutable [`CacheEntry`] from a produced response,
//! optionally compresses it, and persists it under its fingerprint together
//! with invalidation flags. Once stored, an entry is owned by the backend and
//! only ever removed again, by expiry or by invalidation.

use std::io::{Read, Write};
use std::sync::Arc;

use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use time::OffsetDateTime;
use tracing::warn;

use crate::config::CacheSettings;
use crate::error::StorageError;
use crate::fingerprint::CacheKey;
use crate::storage::Storage;

/// Header prefix reserved by the engine; never replayed from cache.
pub const RESERVED_HEADER_PREFIX: &str = "x-rime";

/// Freshness of a stored entry relative to its expiry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within TTL.
    Fresh,
    /// TTL elapsed, grace remaining; servable while a refresh happens.
    Stale,
}

/// A stored response: body, replayable headers, status, and expiry policy.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub body: Bytes,
    pub headers: Vec<(String, String)>,
    pub status: u16,
    pub created_at: OffsetDateTime,
    pub ttl: u64,
    pub grace: u64,
    pub compressed: bool,
}

impl CacheEntry {
    /// Freshness at `now`; `None` means the entry is past TTL and grace and
    /// must be treated as absent.
    pub fn freshness(&self, now: OffsetDateTime) -> Option<Freshness> {
        let age = (now - self.created_at).whole_seconds();
        if age < 0 {
            return Some(Freshness::Fresh);
        }
        let age = age as u64;
        if age < self.ttl {
            Some(Freshness::Fresh)
        } else if age < self.ttl + self.grace {
            Some(Freshness::Stale)
        } else {
            None
        }
    }
}

/// Predicate deciding which response headers may be persisted.
///
/// Cookie-setting headers and the engine's own reserved headers must never be
/// replayed to a future cached response. The exclusion set is configuration,
/// not mechanism, so it can grow without touching the writer.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    excluded: Vec<String>,
    reserved_prefix: String,
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self {
            excluded: vec!["set-cookie".to_string()],
            reserved_prefix: RESERVED_HEADER_PREFIX.to_string(),
        }
    }
}

impl HeaderPolicy {
    pub fn with_excluded(mut self, name: impl Into<String>) -> Self {
        self.excluded.push(name.into().to_ascii_lowercase());
        self
    }

    pub fn retains(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        !name.starts_with(&self.reserved_prefix) && !self.excluded.contains(&name)
    }
}

/// Builds, compresses, and persists cache entries.
pub struct EntryWriter {
    default_ttl: u64,
    default_grace: u64,
    compression: bool,
    policy: HeaderPolicy,
    storage: Arc<dyn Storage>,
}

impl EntryWriter {
    pub fn new(settings: &CacheSettings, storage: Arc<dyn Storage>) -> Self {
        Self {
            default_ttl: settings.ttl,
            default_grace: settings.grace,
            compression: settings.compression,
            policy: HeaderPolicy::default(),
            storage,
        }
    }

    pub fn with_header_policy(mut self, policy: HeaderPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build an entry from response parts.
    ///
    /// Headers failing the policy are dropped; explicit TTL/grace overrides
    /// win over the configured defaults.
    pub fn create_entry(
        &self,
        body: Bytes,
        headers: &[(String, String)],
        status: u16,
        ttl_override: Option<u64>,
        grace_override: Option<u64>,
    ) -> CacheEntry {
        let headers = headers
            .iter()
            .filter(|(name, _)| self.policy.retains(name))
            .cloned()
            .collect();

        CacheEntry {
            body,
            headers,
            status,
            created_at: OffsetDateTime::now_utc(),
            ttl: ttl_override.unwrap_or(self.default_ttl),
            grace: grace_override.unwrap_or(self.default_grace),
            compressed: false,
        }
    }

    /// Gzip the entry body when compression is enabled.
    ///
    /// Idempotent; a failed compression keeps the entry uncompressed rather
    /// than losing it.
    pub fn compress(&self, entry: CacheEntry) -> CacheEntry {
        if !self.compression || entry.compressed {
            return entry;
        }

        match gzip(&entry.body) {
            Ok(compressed) => CacheEntry {
                body: Bytes::from(compressed),
                compressed: true,
                ..entry
            },
            Err(error) => {
                warn!(%error, "entry compression failed; storing uncompressed");
                entry
            }
        }
    }

    /// Persist the entry under `key`, tagged with deduplicated `flags`.
    pub async fn store(
        &self,
        key: &CacheKey,
        entry: CacheEntry,
        mut flags: Vec<String>,
    ) -> Result<(), StorageError> {
        let mut seen = std::collections::HashSet::new();
        flags.retain(|flag| seen.insert(flag.clone()));
        self.storage.put(key, entry, &flags).await
    }
}

fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

/// Inflate a compressed entry body; the serving layer calls this when the
/// `compressed` marker is set.
pub fn decompress(entry: &CacheEntry) -> std::io::Result<Bytes> {
    if !entry.compressed {
        return Ok(entry.body.clone());
    }
    let mut decoder = GzDecoder::new(entry.body.as_ref());
    let mut inflated = Vec::new();
    decoder.read_to_end(&mut inflated)?;
    Ok(Bytes::from(inflated))
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::config::CacheSettings;
    use crate::storage::MemoryStorage;

    fn writer(compression: bool) -> EntryWriter {
        let settings = CacheSettings {
            compression,
            ..CacheSettings::default()
        };
        EntryWriter::new(&settings, Arc::new(MemoryStorage::new()))
    }

    fn entry_with(ttl: u64, grace: u64) -> CacheEntry {
        CacheEntry {
            body: Bytes::from("body"),
            headers: Vec::new(),
            status: 200,
            created_at: OffsetDateTime::now_utc(),
            ttl,
            grace,
            compressed: false,
        }
    }

    #[test]
    fn header_policy_strips_cookies_and_reserved_headers() {
        let writer = writer(false);
        let headers = vec![
            ("Content-Type".to_string(), "text/html".to_string()),
            ("Set-Cookie".to_string(), "session=abc".to_string()),
            ("X-Rime-Status".to_string(), "miss".to_string()),
            ("X-Custom".to_string(), "kept".to_string()),
        ];

        let entry = writer.create_entry(Bytes::from("x"), &headers, 200, None, None);

        let names: Vec<&str> = entry.headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Content-Type", "X-Custom"]);
    }

    #[test]
    fn overrides_win_over_defaults() {
        let writer = writer(false);
        let entry = writer.create_entry(Bytes::new(), &[], 200, Some(60), Some(0));
        assert_eq!(entry.ttl, 60);
        assert_eq!(entry.grace, 0);

        let defaulted = writer.create_entry(Bytes::new(), &[], 200, None, None);
        assert_eq!(defaulted.ttl, 3600);
        assert_eq!(defaulted.grace, 600);
    }

    #[test]
    fn compression_round_trips_and_marks_the_entry() {
        let writer = writer(true);
        let body = Bytes::from("hello hello hello hello hello");
        let entry = writer.create_entry(body.clone(), &[], 200, None, None);
        let compressed = writer.compress(entry);

        assert!(compressed.compressed);
        assert_ne!(compressed.body, body);
        assert_eq!(decompress(&compressed).unwrap(), body);
    }

    #[test]
    fn compress_is_a_no_op_when_disabled_or_already_compressed() {
        let disabled = writer(false);
        let entry = disabled.create_entry(Bytes::from("x"), &[], 200, None, None);
        assert!(!disabled.compress(entry).compressed);

        let enabled = writer(true);
        let once = enabled.compress(enabled.create_entry(Bytes::from("x"), &[], 200, None, None));
        let body_after_once = once.body.clone();
        let twice = enabled.compress(once);
        assert_eq!(twice.body, body_after_once);
    }

    #[test]
    fn freshness_state_machine() {
        let entry = entry_with(3600, 600);
        let created = entry.created_at;

        assert_eq!(
            entry.freshness(created + Duration::seconds(10)),
            Some(Freshness::Fresh)
        );
        assert_eq!(
            entry.freshness(created + Duration::seconds(3700)),
            Some(Freshness::Stale)
        );
        assert_eq!(entry.freshness(created + Duration::seconds(4300)), None);
    }

    #[test]
    fn zero_grace_disables_stale_serving() {
        let entry = entry_with(60, 0);
        let created = entry.created_at;

        assert_eq!(
            entry.freshness(created + Duration::seconds(59)),
            Some(Freshness::Fresh)
        );
        assert_eq!(entry.freshness(created + Duration::seconds(61)), None);
    }
}

//! Rime, a tag-aware HTTP response cache engine.
//!
//! The engine stores whole responses keyed by a deterministic request
//! fingerprint and tagged with invalidation flags, so entire families of
//! entries can be purged by pattern (`route:products:index`, `route*`, `*`).
//!
//! Four components cooperate:
//!
//! - **Decision gate** ([`decision`]): per-request cacheability, re-checked
//!   after the handler runs because it can change mid-request.
//! - **Fingerprint generator** ([`fingerprint`]): stable cache keys from
//!   normalized request state, plus a coarse URL hash.
//! - **Entry writer** ([`entry`]): builds, compresses, and persists entries
//!   with a TTL/grace expiry policy.
//! - **Invalidation queue** ([`invalidate`]): pattern-based bulk purges,
//!   typically driven by [`listener::ClearListener`] when a mapped command
//!   finishes successfully.
//!
//! The axum integration is a single middleware stage,
//! [`middleware::store_response_layer`]; it only *stores* responses on a
//! MISS. Serving cached HITs belongs to the serving layer in front.
//!
//! ## Configuration
//!
//! Behavior is controlled via `rime.toml` (or `config/default.toml`):
//!
//! ```toml
//! [middleware]
//! enabled = true
//! groups = ["web"]
//!
//! [cache]
//! ttl = 3600
//! grace = 600
//! compression = true
//! cacheable_status_codes = [200]
//!
//! [clear]
//! "optimize:clear" = "route*"
//! ```

pub mod config;
pub mod context;
pub mod decision;
pub mod engine;
pub mod entry;
pub mod error;
pub mod fingerprint;
pub mod flags;
pub mod invalidate;
pub mod listener;
mod lock;
pub mod middleware;
pub mod storage;
pub mod telemetry;

pub use config::{CacheSettings, MiddlewareSettings, Settings};
pub use decision::{CacheRule, Decision, RuleOutcome};
pub use engine::{CacheEngine, StatusReport};
pub use entry::{CacheEntry, EntryWriter, Freshness, HeaderPolicy};
pub use error::StorageError;
pub use fingerprint::{CacheKey, RequestState};
pub use flags::RouteName;
pub use invalidate::{ClearHandle, Pattern};
pub use listener::{ClearListener, CommandFinished};
pub use middleware::{CacheState, store_response_layer};
pub use storage::{MemoryStorage, Storage, StorageStatus};

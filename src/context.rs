//! Per-request cache context.
//!
//! Uses `tokio::task_local!` to scope a mutable cache context to a single
//! request. Application code running inside the handler can veto caching,
//! attach invalidation flags, name the route, or override TTL/grace without
//! holding a reference to the engine. If no context is active the calls are
//! silently ignored.
//!
//! The cacheability decision lives here precisely because it can change
//! *during* request processing: the middleware checks it once before running
//! the handler and again from the snapshot afterwards.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::flags::RouteName;
use crate::lock::mutex_lock;

const SOURCE: &str = "context";

tokio::task_local! {
    static CONTEXT: Arc<RequestContext>;
}

/// Mutable cache state for one in-flight request.
#[derive(Debug, Default)]
pub struct RequestContext {
    denied: AtomicBool,
    note: Mutex<Option<String>>,
    flags: Mutex<Vec<String>>,
    route: Mutex<Option<RouteName>>,
    ttl_override: Mutex<Option<u64>>,
    grace_override: Mutex<Option<u64>>,
}

impl RequestContext {
    fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            allowed: !self.denied.load(Ordering::SeqCst),
            note: mutex_lock(&self.note, SOURCE, "snapshot.note").clone(),
            flags: mutex_lock(&self.flags, SOURCE, "snapshot.flags").clone(),
            route: mutex_lock(&self.route, SOURCE, "snapshot.route").clone(),
            ttl: *mutex_lock(&self.ttl_override, SOURCE, "snapshot.ttl"),
            grace: *mutex_lock(&self.grace_override, SOURCE, "snapshot.grace"),
        }
    }
}

/// Immutable view of the request context, taken after the handler returned.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    /// Whether caching is still allowed after the handler ran.
    pub allowed: bool,
    /// Optional note attached to a `do_not_cache` call.
    pub note: Option<String>,
    /// Custom invalidation flags recorded during the request.
    pub flags: Vec<String>,
    /// Route identity, if the handler (or a route layer) named itself.
    pub route: Option<RouteName>,
    /// Per-response TTL override in seconds.
    pub ttl: Option<u64>,
    /// Per-response grace override in seconds.
    pub grace: Option<u64>,
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self {
            allowed: true,
            note: None,
            flags: Vec::new(),
            route: None,
            ttl: None,
            grace: None,
        }
    }
}

/// Veto caching for the current request.
pub fn do_not_cache(note: impl Into<String>) {
    let _ = CONTEXT.try_with(|ctx| {
        ctx.denied.store(true, Ordering::SeqCst);
        *mutex_lock(&ctx.note, SOURCE, "do_not_cache") = Some(note.into());
    });
}

/// Attach a custom invalidation flag to the response being produced.
pub fn add_flag(flag: impl Into<String>) {
    let _ = CONTEXT.try_with(|ctx| {
        mutex_lock(&ctx.flags, SOURCE, "add_flag").push(flag.into());
    });
}

/// Name the route handling the current request.
pub fn set_route(route: RouteName) {
    let _ = CONTEXT.try_with(|ctx| {
        *mutex_lock(&ctx.route, SOURCE, "set_route") = Some(route);
    });
}

/// Override the TTL for the entry written from this response.
pub fn set_ttl(seconds: u64) {
    let _ = CONTEXT.try_with(|ctx| {
        *mutex_lock(&ctx.ttl_override, SOURCE, "set_ttl") = Some(seconds);
    });
}

/// Override the grace period for the entry written from this response.
///
/// `0` disables stale serving for the entry.
pub fn set_grace(seconds: u64) {
    let _ = CONTEXT.try_with(|ctx| {
        *mutex_lock(&ctx.grace_override, SOURCE, "set_grace") = Some(seconds);
    });
}

/// Run a future with a fresh request context and return its snapshot.
///
/// The context is shared by `Arc` so the snapshot remains readable after the
/// task-local scope ends.
pub async fn scope<F>(f: F) -> (F::Output, ContextSnapshot)
where
    F: std::future::Future,
{
    let ctx = Arc::new(RequestContext::default());
    let result = CONTEXT.scope(ctx.clone(), f).await;
    let snapshot = ctx.snapshot();
    (result, snapshot)
}

//! Response storage middleware.
//!
//! Captures cacheable responses on a MISS and writes them to the storage
//! backend in the format the serving layer expects. Serving cached HITs is
//! the serving layer's job; this middleware only handles storage.
//!
//! The cacheability decision is checked twice: once before running the
//! handler (rules) and again afterwards from the request context, because a
//! rule or the handler itself may disallow caching mid-request. Storage
//! failures are logged and swallowed; the response delivered to the client is
//! never altered by this layer.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{Request, StatusCode, header::CONTENT_LENGTH},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::context;
use crate::engine::CacheEngine;
use crate::flags;

pub(crate) const METRIC_STORE_TOTAL: &str = "rime_cache_store_total";
pub(crate) const METRIC_STORE_ERROR_TOTAL: &str = "rime_cache_store_error_total";
pub(crate) const METRIC_SKIP_TOTAL: &str = "rime_cache_skip_total";

/// Shared middleware state.
#[derive(Clone)]
pub struct CacheState {
    pub engine: Arc<CacheEngine>,
}

impl CacheState {
    pub fn new(engine: Arc<CacheEngine>) -> Self {
        Self { engine }
    }
}

/// Middleware storing cacheable responses on a MISS.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn store_response_layer(
    State(state): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let engine = &state.engine;

    if !engine.settings().middleware.enabled {
        return next.run(request).await;
    }

    let request_state = engine.request_state(&request);

    // Pre-check: rules may already rule this request out.
    let decision = engine.is_caching_allowed(&request_state);
    if !decision.is_allowed() {
        debug!(note = decision.note(), "request not cacheable; bypassing");
        counter!(METRIC_SKIP_TOTAL).increment(1);
        return next.run(request).await;
    }

    let (response, ctx) = context::scope(next.run(request)).await;

    if !engine.is_cacheable_status(response.status().as_u16()) {
        debug!(status = response.status().as_u16(), "status not cacheable");
        counter!(METRIC_SKIP_TOTAL).increment(1);
        return response;
    }

    // Re-check after the handler ran: rules or handler code may have
    // changed the decision during request handling.
    if !ctx.allowed {
        debug!(note = ctx.note.as_deref(), "caching vetoed during request");
        counter!(METRIC_SKIP_TOTAL).increment(1);
        return response;
    }

    // Streaming responses have no declared length and are never buffered.
    let max_body_bytes = engine.settings().middleware.max_body_bytes.get();
    let Some(declared) = declared_length(&response) else {
        debug!("response has no declared length; serving uncached");
        counter!(METRIC_SKIP_TOTAL).increment(1);
        return response;
    };
    if declared > max_body_bytes {
        debug!(declared, max_body_bytes, "response exceeds buffer ceiling");
        counter!(METRIC_SKIP_TOTAL).increment(1);
        return response;
    }

    let (parts, body) = response.into_parts();
    let limit = usize::try_from(max_body_bytes).unwrap_or(usize::MAX);
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(error) => {
            // The body stream itself failed; the response was undeliverable
            // regardless of caching.
            warn!(%error, "failed to read response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();

    let key = engine.fingerprint(&request_state);
    let url_hash = engine.url_hash(&request_state);
    let entry_flags = flags::assemble(&ctx.flags, ctx.route.as_ref(), &url_hash);

    let entry = engine.writer().create_entry(
        bytes.clone(),
        &headers,
        parts.status.as_u16(),
        ctx.ttl,
        ctx.grace,
    );
    let entry = engine.writer().compress(entry);

    match engine.writer().store(&key, entry, entry_flags).await {
        Ok(()) => {
            debug!(key = %key, "response stored");
            counter!(METRIC_STORE_TOTAL).increment(1);
        }
        Err(error) => {
            // Cache failures must never break the response.
            warn!(key = %key, %error, "cache store failed; serving uncached");
            counter!(METRIC_STORE_ERROR_TOTAL).increment(1);
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

/// Declared response length, from the `content-length` header when set or
/// the body's exact size hint otherwise. `None` means the length is unknown
/// (a streaming body, or an unparseable header).
fn declared_length(response: &Response) -> Option<u64> {
    match response.headers().get(CONTENT_LENGTH) {
        Some(value) => value.to_str().ok().and_then(|value| value.parse().ok()),
        None => response.body().size_hint().exact(),
    }
}

//! Verifies the metric keys emitted along the store and invalidation paths.

mod support;

use std::collections::HashSet;
use std::sync::Arc;

use axum::{Router, body::Body, http::Request, middleware, routing::get};
use metrics_util::debugging::DebuggingRecorder;
use rime::config::Settings;
use rime::engine::CacheEngine;
use rime::middleware::{CacheState, store_response_layer};
use tower::ServiceExt;

use support::{FailingStorage, RecordingStorage};

fn app(engine: Arc<CacheEngine>) -> Router {
    Router::new()
        .route("/page", get(|| async { "page" }))
        .layer(middleware::from_fn_with_state(
            CacheState::new(engine),
            store_response_layer,
        ))
}

async fn hit(engine: Arc<CacheEngine>, method: &str) {
    let request = Request::builder()
        .method(method)
        .uri("/page")
        .body(Body::empty())
        .unwrap();
    app(engine).oneshot(request).await.unwrap();
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Store, skip, and store-error paths through the middleware.
    let storage = RecordingStorage::new();
    let engine = Arc::new(CacheEngine::new(Settings::default(), storage.clone()));
    hit(engine.clone(), "GET").await;
    hit(engine.clone(), "POST").await;
    assert!(storage.last_put().is_some());

    let failing = Arc::new(CacheEngine::new(
        Settings::default(),
        Arc::new(FailingStorage),
    ));
    hit(failing.clone(), "GET").await;

    // Invalidation run over real storage.
    engine.clear("*").execute_queue().await;

    let seen: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect();

    for expected in [
        "rime_cache_store_total",
        "rime_cache_skip_total",
        "rime_cache_store_error_total",
        "rime_cache_invalidation_run_total",
        "rime_cache_invalidated_entries_total",
    ] {
        assert!(seen.contains(expected), "missing metric key {expected}");
    }
}

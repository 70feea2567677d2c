//! Command-completion invalidation over a real engine and storage.

mod support;

use std::sync::Arc;

use axum::{Router, body::Body, http::Request, middleware, routing::get};
use rime::config::Settings;
use rime::context;
use rime::engine::CacheEngine;
use rime::flags::RouteName;
use rime::listener::{ClearListener, CommandFinished};
use rime::middleware::{CacheState, store_response_layer};
use rime::storage::Storage;
use tokio::sync::mpsc;
use tower::ServiceExt;

use support::RecordingStorage;

fn settings_with_clear(mappings: &[(&str, &str)]) -> Settings {
    let mut settings = Settings::default();
    settings.cache.compression = false;
    for (command, pattern) in mappings {
        settings
            .clear
            .insert(command.to_string(), pattern.to_string());
    }
    settings
}

fn app(engine: Arc<CacheEngine>) -> Router {
    Router::new()
        .route(
            "/products",
            get(|| async {
                context::set_route(RouteName::new("products.index"));
                "products"
            }),
        )
        .route(
            "/orders",
            get(|| async {
                context::set_route(RouteName::new("orders.index"));
                "orders"
            }),
        )
        .layer(middleware::from_fn_with_state(
            CacheState::new(engine),
            store_response_layer,
        ))
}

async fn seed(engine: Arc<CacheEngine>, paths: &[&str]) {
    for path in paths {
        let request = Request::builder().uri(*path).body(Body::empty()).unwrap();
        app(engine.clone()).oneshot(request).await.unwrap();
    }
}

async fn entry_count(storage: &RecordingStorage) -> usize {
    storage.status().await.entries
}

#[tokio::test]
async fn mapped_command_purges_matching_entries() {
    let storage = RecordingStorage::new();
    let engine = Arc::new(CacheEngine::new(
        settings_with_clear(&[("products:refresh", "route:products:index")]),
        storage.clone(),
    ));
    seed(engine.clone(), &["/products", "/orders"]).await;
    assert_eq!(entry_count(&storage).await, 2);

    let listener = ClearListener::new(engine);
    let executed = listener
        .on_command_finished(&CommandFinished::new("products:refresh", 0))
        .await;

    assert!(executed);
    assert_eq!(entry_count(&storage).await, 1);
}

#[tokio::test]
async fn prefix_mapping_purges_every_route() {
    let storage = RecordingStorage::new();
    let engine = Arc::new(CacheEngine::new(
        settings_with_clear(&[("optimize:clear", "route*")]),
        storage.clone(),
    ));
    seed(engine.clone(), &["/products", "/orders"]).await;
    assert_eq!(entry_count(&storage).await, 2);

    let listener = ClearListener::new(engine);
    assert!(
        listener
            .on_command_finished(&CommandFinished::new("optimize:clear", 0))
            .await
    );
    assert_eq!(entry_count(&storage).await, 0);
}

#[tokio::test]
async fn failed_command_leaves_the_cache_intact() {
    let storage = RecordingStorage::new();
    let engine = Arc::new(CacheEngine::new(
        settings_with_clear(&[("optimize:clear", "*")]),
        storage.clone(),
    ));
    seed(engine.clone(), &["/products"]).await;

    let listener = ClearListener::new(engine);
    let executed = listener
        .on_command_finished(&CommandFinished::new("optimize:clear", 2))
        .await;

    assert!(!executed);
    assert_eq!(entry_count(&storage).await, 1);
}

#[tokio::test]
async fn unmapped_command_leaves_the_cache_intact() {
    let storage = RecordingStorage::new();
    let engine = Arc::new(CacheEngine::new(
        settings_with_clear(&[("optimize:clear", "*")]),
        storage.clone(),
    ));
    seed(engine.clone(), &["/products"]).await;

    let listener = ClearListener::new(engine);
    assert!(
        !listener
            .on_command_finished(&CommandFinished::new("cache:warm", 0))
            .await
    );
    assert_eq!(entry_count(&storage).await, 1);
}

#[tokio::test]
async fn listener_drains_a_channel_of_completions() {
    let storage = RecordingStorage::new();
    let engine = Arc::new(CacheEngine::new(
        settings_with_clear(&[("optimize:clear", "*")]),
        storage.clone(),
    ));
    seed(engine.clone(), &["/products", "/orders"]).await;

    let listener = ClearListener::new(engine);
    let (tx, rx) = mpsc::channel(4);
    tx.send(CommandFinished::new("optimize:clear", 1))
        .await
        .unwrap();
    tx.send(CommandFinished::new("optimize:clear", 0))
        .await
        .unwrap();
    drop(tx);

    listener.listen(rx).await;
    assert_eq!(entry_count(&storage).await, 0);
}

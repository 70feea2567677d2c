use std::sync::Once;

use metrics::{Unit, describe_counter};
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
#[error("telemetry initialization failed: {0}")]
pub struct TelemetryError(String);

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| TelemetryError(format!("failed to install tracing subscriber: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "rime_cache_store_total",
            Unit::Count,
            "Total number of responses stored in the cache."
        );
        describe_counter!(
            "rime_cache_store_error_total",
            Unit::Count,
            "Total number of cache writes that failed at the storage backend."
        );
        describe_counter!(
            "rime_cache_skip_total",
            Unit::Count,
            "Total number of responses that bypassed cache storage."
        );
        describe_counter!(
            "rime_cache_invalidation_run_total",
            Unit::Count,
            "Total number of invalidation queue executions."
        );
        describe_counter!(
            "rime_cache_invalidated_entries_total",
            Unit::Count,
            "Total number of cache entries removed by invalidation."
        );
    });
}

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    application::{
        print::{METRIC_RENDER_FAILURES, METRIC_RENDER_MS},
        store::{
            METRIC_ARTIFACTS_EVICTED, METRIC_ARTIFACTS_REGISTERED, METRIC_ARTIFACTS_STORED,
            METRIC_EVICTION_SKIPPED,
        },
    },
    config::{LogFormat, LoggingSettings},
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
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
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register metric descriptions with the installed recorder. Safe to call
/// more than once.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_ARTIFACTS_REGISTERED,
            Unit::Count,
            "Total number of artifacts published under a handle."
        );
        describe_counter!(
            METRIC_ARTIFACTS_EVICTED,
            Unit::Count,
            "Total number of artifacts removed by eviction sweeps or shutdown drain."
        );
        describe_gauge!(
            METRIC_ARTIFACTS_STORED,
            Unit::Count,
            "Current number of artifacts awaiting pickup."
        );
        describe_counter!(
            METRIC_EVICTION_SKIPPED,
            Unit::Count,
            "Total number of eviction sweeps skipped because one was already running."
        );
        describe_counter!(
            METRIC_RENDER_FAILURES,
            Unit::Count,
            "Total number of print jobs that failed in the renderer."
        );
        describe_histogram!(
            METRIC_RENDER_MS,
            Unit::Milliseconds,
            "Renderer latency in milliseconds."
        );
    });
}

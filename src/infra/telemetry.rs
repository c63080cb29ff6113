use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "scorta_route_bypass_total",
            Unit::Count,
            "Total number of requests forwarded to the network without cache involvement."
        );
        describe_counter!(
            "scorta_cache_hit_total",
            Unit::Count,
            "Total number of intercepted requests served from the named cache."
        );
        describe_counter!(
            "scorta_cache_miss_total",
            Unit::Count,
            "Total number of intercepted requests that waited on a network refresh."
        );
        describe_counter!(
            "scorta_refresh_success_total",
            Unit::Count,
            "Total number of refreshes that produced a cacheable response."
        );
        describe_counter!(
            "scorta_refresh_skipped_total",
            Unit::Count,
            "Total number of refreshes whose non-success status left the cache untouched."
        );
        describe_counter!(
            "scorta_refresh_failure_total",
            Unit::Count,
            "Total number of refreshes that failed at the network layer."
        );
        describe_counter!(
            "scorta_precache_entries_total",
            Unit::Count,
            "Total number of entries written by the installer's bulk precache."
        );
    });
}

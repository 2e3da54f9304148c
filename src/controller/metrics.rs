//! Prometheus metrics for the AWS operator
//!
//! # Exported metrics
//! - `aws_operator_resource_duration_seconds` (histogram): duration of one
//!   resource's ensure call labeled by resource and operation.
//! - `aws_operator_resource_errors_total` (counter): failed ensure calls
//!   labeled by resource, operation and error kind.
//! - `aws_operator_passes_total` (counter): finished reconciliation passes
//!   labeled by operation and result.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for per-resource metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResourceLabels {
    /// Resource name, e.g. "tccp"
    pub resource: String,
    /// "create" or "delete"
    pub operation: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResourceErrorLabels {
    pub resource: String,
    pub operation: String,
    /// Error kind, e.g. "aws", "kube", "invalid_config"
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PassLabels {
    pub operation: String,
    /// "completed", "cancelled", "finalizer_kept" or "failed"
    pub result: String,
}

/// Histogram tracking ensure-call duration (seconds)
pub static RESOURCE_DURATION_SECONDS: Lazy<Family<ResourceLabels, Histogram>> = Lazy::new(|| {
    fn resource_histogram() -> Histogram {
        // 5ms .. ~164s across 16 buckets; stack waits land in the top buckets.
        Histogram::new(exponential_buckets(0.005, 2.0, 16))
    }

    Family::new_with_constructor(resource_histogram)
});

pub static RESOURCE_ERRORS_TOTAL: Lazy<Family<ResourceErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static PASSES_TOTAL: Lazy<Family<PassLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "aws_operator_resource_duration_seconds",
        "Duration of resource ensure calls in seconds",
        RESOURCE_DURATION_SECONDS.clone(),
    );
    registry.register(
        // The encoder appends the `_total` suffix to counters.
        "aws_operator_resource_errors",
        "Total number of failed resource ensure calls",
        RESOURCE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "aws_operator_passes",
        "Total number of finished reconciliation passes",
        PASSES_TOTAL.clone(),
    );

    registry
});

pub fn observe_resource_duration_seconds(resource: &str, operation: &str, seconds: f64) {
    RESOURCE_DURATION_SECONDS
        .get_or_create(&ResourceLabels {
            resource: resource.to_string(),
            operation: operation.to_string(),
        })
        .observe(seconds);
}

pub fn inc_resource_error(resource: &str, operation: &str, kind: &str) {
    RESOURCE_ERRORS_TOTAL
        .get_or_create(&ResourceErrorLabels {
            resource: resource.to_string(),
            operation: operation.to_string(),
            kind: kind.to_string(),
        })
        .inc();
}

pub fn inc_pass(operation: &str, result: &str) {
    PASSES_TOTAL
        .get_or_create(&PassLabels {
            operation: operation.to_string(),
            result: result.to_string(),
        })
        .inc();
}

/// Render the registry in the Prometheus text format.
pub fn encode() -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &REGISTRY)?;
    Ok(buffer)
}

//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! All metrics carry a `kind` label (`database`, `aws`, `gcp`, `azure`).
//!
//! - `credential_request_reconciliations_total` - Total number of reconciliations
//! - `credential_request_reconciliation_errors_total` - Total number of reconciliation errors
//! - `credential_request_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `credential_request_credentials_issued_total` - Credentials issued and fully wired up
//! - `credential_request_leases_revoked_total` - Leases revoked (compensation or deletion)
//! - `credential_request_compensations_total` - Compensation runs after a partial failure
//! - `credential_request_requeues_dropped_total` - Request keys dropped after exhausting retries

use crate::crd::RequestKind;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credential_request_reconciliations_total",
            "Total number of reconciliations by request kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credential_request_reconciliation_errors_total",
            "Total number of reconciliation errors by request kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "credential_request_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds by request kind",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static CREDENTIALS_ISSUED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credential_request_credentials_issued_total",
            "Total number of credentials issued and exposed to their subjects",
        ),
        &["kind"],
    )
    .expect("Failed to create CREDENTIALS_ISSUED_TOTAL metric - this should never happen")
});

static LEASES_REVOKED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credential_request_leases_revoked_total",
            "Total number of backend leases revoked",
        ),
        &["kind"],
    )
    .expect("Failed to create LEASES_REVOKED_TOTAL metric - this should never happen")
});

static COMPENSATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credential_request_compensations_total",
            "Total number of compensation runs by outcome",
        ),
        &["kind", "outcome"],
    )
    .expect("Failed to create COMPENSATIONS_TOTAL metric - this should never happen")
});

static REQUEUES_DROPPED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credential_request_requeues_dropped_total",
            "Total number of request keys dropped after exhausting their retries",
        ),
        &["kind"],
    )
    .expect("Failed to create REQUEUES_DROPPED_TOTAL metric - this should never happen")
});

/// Register all metrics with the registry
///
/// # Errors
///
/// Returns an error if a metric is registered twice.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CREDENTIALS_ISSUED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LEASES_REVOKED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMPENSATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_DROPPED_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(kind: RequestKind) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind.label()]).inc();
}

pub fn increment_reconciliation_errors(kind: RequestKind) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[kind.label()])
        .inc();
}

pub fn observe_reconciliation_duration(kind: RequestKind, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind.label()])
        .observe(duration);
}

pub fn increment_credentials_issued(kind: RequestKind) {
    CREDENTIALS_ISSUED_TOTAL.with_label_values(&[kind.label()]).inc();
}

pub fn increment_leases_revoked(kind: RequestKind) {
    LEASES_REVOKED_TOTAL.with_label_values(&[kind.label()]).inc();
}

/// Record a compensation run; `succeeded` is false when revoke or delete failed
pub fn increment_compensations(kind: RequestKind, succeeded: bool) {
    let outcome = if succeeded { "success" } else { "failure" };
    COMPENSATIONS_TOTAL
        .with_label_values(&[kind.label(), outcome])
        .inc();
}

pub fn increment_requeues_dropped(kind: RequestKind) {
    REQUEUES_DROPPED_TOTAL.with_label_values(&[kind.label()]).inc();
}

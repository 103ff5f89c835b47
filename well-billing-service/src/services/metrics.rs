//! Metrics module for well-billing-service.
//! Provides Prometheus metrics for distribution runs and per-tenant metering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_histogram_vec, register_int_counter_vec,
    CounterVec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Recorder handle for the HTTP metrics emitted by service-core middleware
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "well_billing_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Distribution runs counter (per-tenant metering)
pub static DISTRIBUTIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Distributed amount counter (monetary tracking)
pub static DISTRIBUTED_AMOUNT_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Fields with weight but no owners, for reconciliation alerts
pub static UNOWNED_FIELDS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Period operations counter (per-tenant metering)
pub static PERIOD_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::warn!(error = %e, "Prometheus recorder already installed"),
        }
    }

    DISTRIBUTIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "well_billing_distributions_total",
                "Total distribution runs by tenant and outcome"
            ),
            &["tenant_id", "outcome"]
        )
        .expect("Failed to register DISTRIBUTIONS_TOTAL")
    });

    DISTRIBUTED_AMOUNT_TOTAL.get_or_init(|| {
        register_counter_vec!(
            opts!(
                "well_billing_distributed_amount_total",
                "Total amount distributed to owners by tenant"
            ),
            &["tenant_id"]
        )
        .expect("Failed to register DISTRIBUTED_AMOUNT_TOTAL")
    });

    UNOWNED_FIELDS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "well_billing_unowned_fields_total",
                "Fields with irrigation weight but no ownership rows, by policy"
            ),
            &["tenant_id", "policy"]
        )
        .expect("Failed to register UNOWNED_FIELDS_TOTAL")
    });

    PERIOD_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "well_billing_period_operations_total",
                "Total billing period operations by tenant and operation type"
            ),
            &["tenant_id", "operation"]
        )
        .expect("Failed to register PERIOD_OPERATIONS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("well_billing_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return output;
    }
    output.push_str(&String::from_utf8(buffer).unwrap_or_default());
    output
}

/// Record a distribution run outcome.
pub fn record_distribution(tenant_id: &str, outcome: &str) {
    if let Some(counter) = DISTRIBUTIONS_TOTAL.get() {
        counter.with_label_values(&[tenant_id, outcome]).inc();
    }
}

/// Record an amount distributed to owners.
pub fn record_distributed_amount(tenant_id: &str, amount: f64) {
    if let Some(counter) = DISTRIBUTED_AMOUNT_TOTAL.get() {
        counter.with_label_values(&[tenant_id]).inc_by(amount.abs());
    }
}

/// Record a field that carried weight without owners.
pub fn record_unowned_field(tenant_id: &str, policy: &str) {
    if let Some(counter) = UNOWNED_FIELDS_TOTAL.get() {
        counter.with_label_values(&[tenant_id, policy]).inc();
    }
}

/// Record a billing period operation.
pub fn record_period_operation(tenant_id: &str, operation: &str) {
    if let Some(counter) = PERIOD_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[tenant_id, operation]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}

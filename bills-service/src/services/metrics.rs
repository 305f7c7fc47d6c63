//! Prometheus metrics for bills-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};

/// Histogram for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bills_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for generated bill occurrences.
pub static OCCURRENCES_GENERATED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "bills_occurrences_generated_total",
        "Total number of bill occurrences expanded from recurring bills"
    )
    .expect("Failed to register OCCURRENCES_GENERATED")
});

/// Counter for reconcile operations by operation and status.
pub static RECONCILE_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bills_reconcile_operations_total",
        "Total number of reconcile operations",
        &["operation", "status"]
    )
    .expect("Failed to register RECONCILE_OPERATIONS")
});

/// Counter for transaction matches by confidence tier.
pub static TRANSACTION_MATCHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bills_transaction_matches_total",
        "Total number of transaction-to-occurrence matches",
        &["tier"]
    )
    .expect("Failed to register TRANSACTION_MATCHES")
});

/// Counter for calendar view cache lookups.
pub static VIEW_CACHE: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bills_view_cache_total",
        "Total number of calendar view cache lookups",
        &["result"]
    )
    .expect("Failed to register VIEW_CACHE")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bills_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&OCCURRENCES_GENERATED);
    Lazy::force(&RECONCILE_OPERATIONS);
    Lazy::force(&TRANSACTION_MATCHES);
    Lazy::force(&VIEW_CACHE);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}

/// Record occurrences produced by one expansion.
pub fn record_occurrences_generated(count: usize) {
    OCCURRENCES_GENERATED.inc_by(count as f64);
}

/// Record a reconcile operation.
pub fn record_reconcile_operation(operation: &str, status: &str) {
    RECONCILE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record a transaction match.
pub fn record_transaction_match(tier: &str) {
    TRANSACTION_MATCHES.with_label_values(&[tier]).inc();
}

/// Record a view cache lookup result.
pub fn record_view_cache(result: &str) {
    VIEW_CACHE.with_label_values(&[result]).inc();
}

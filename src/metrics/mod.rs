pub mod prometheus_metrics;

pub use prometheus_metrics::{
    METRICS_REGISTRY, MetricsRegistry, metrics_handler, record_admission, record_store_duration,
    record_test_submitted,
};

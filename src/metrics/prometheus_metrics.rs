use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::admission::AdmissionResult;
use crate::models::TestSection;

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Arc<MetricsRegistry> = Arc::new(MetricsRegistry::new());
}

pub struct MetricsRegistry {
    pub registry: Registry,

    // Admission metrics
    pub admission_results_total: IntCounterVec,

    // Store latency
    pub store_operation_duration_seconds: HistogramVec,

    // Practice tests
    pub test_results_submitted_total: IntCounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let admission_results_total = IntCounterVec::new(
            Opts::new(
                "admission_results_total",
                "Device admission attempts by result",
            ),
            &["result"],
        )
        .unwrap();

        let store_operation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "store_operation_duration_seconds",
                "Identity store operation duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["operation"],
        )
        .unwrap();

        let test_results_submitted_total = IntCounterVec::new(
            Opts::new(
                "test_results_submitted_total",
                "Practice test results submitted by section",
            ),
            &["section"],
        )
        .unwrap();

        registry
            .register(Box::new(admission_results_total.clone()))
            .unwrap();
        registry
            .register(Box::new(store_operation_duration_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(test_results_submitted_total.clone()))
            .unwrap();

        Self {
            registry,
            admission_results_total,
            store_operation_duration_seconds,
            test_results_submitted_total,
        }
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn record_admission(result: AdmissionResult) {
    METRICS_REGISTRY
        .admission_results_total
        .with_label_values(&[result.as_str()])
        .inc();
}

pub fn record_store_duration(operation: &str, duration_secs: f64) {
    METRICS_REGISTRY
        .store_operation_duration_seconds
        .with_label_values(&[operation])
        .observe(duration_secs);
}

pub fn record_test_submitted(section: TestSection) {
    METRICS_REGISTRY
        .test_results_submitted_total
        .with_label_values(&[section.as_str()])
        .inc();
}

/// Metrics handler for Prometheus
pub async fn metrics_handler() -> impl IntoResponse {
    match METRICS_REGISTRY.render() {
        Ok(metrics) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            metrics,
        )
            .into_response(),
        Err(e) => Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::from(format!("Failed to render metrics: {}", e)))
            .unwrap_or_default(),
    }
}

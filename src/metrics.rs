use std::sync::atomic::AtomicU64;
use std::sync::LazyLock;

use prometheus::{
    register_histogram_vec_with_registry, register_histogram_with_registry,
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry,
};
use prometheus::{
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    Registry as PrometheusRegistry, TextEncoder,
};

pub static IN_FLIGHT_REQUESTS: AtomicU64 = AtomicU64::new(0);

pub static DECISIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "reauth_decisions_total",
        "Total number of authorization decisions, by outcome",
        &["decision"],
        &METRICS_PROVIDER.registry
    )
    .expect("Failed to register reauth_decisions_total metric")
});

pub static BACKEND_RESULTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "reauth_backend_results_total",
        "Total number of backend authentication results",
        &["backend", "result"],
        &METRICS_PROVIDER.registry
    )
    .expect("Failed to register reauth_backend_results_total metric")
});

pub static BACKEND_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec_with_registry!(
        "reauth_backend_duration_seconds",
        "Backend authentication latency",
        &["backend"],
        &METRICS_PROVIDER.registry
    )
    .expect("Failed to register reauth_backend_duration_seconds metric")
});

pub static METRICS_PROVIDER: LazyLock<MetricsProvider> =
    LazyLock::new(|| MetricsProvider::new().expect("Unable to create metrics provider"));

pub struct MetricsProvider {
    registry: PrometheusRegistry,
    pub metric_http_request_total: IntCounter,
    pub metric_http_request_duration: Histogram,
    pub metric_http_request_in_flight: IntGauge,
}

impl MetricsProvider {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = PrometheusRegistry::new();

        let metric_http_request_total = register_int_counter_with_registry!(
            "http_requests_total",
            "Total number of HTTP requests made.",
            &registry
        )?;

        let metric_http_request_duration = register_histogram_with_registry!(
            "http_request_duration_ms",
            "The HTTP request latencies in milliseconds.",
            &registry
        )?;

        let metric_http_request_in_flight = register_int_gauge_with_registry!(
            "http_requests_in_flight",
            "The current number of in-flight HTTP requests.",
            &registry
        )?;

        Ok(Self {
            registry,
            metric_http_request_total,
            metric_http_request_duration,
            metric_http_request_in_flight,
        })
    }

    /// Text exposition of every metric, with its content type.
    pub fn gather(&self) -> Result<(String, Vec<u8>), prometheus::Error> {
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

//! # Prometheus Metrics
//!
//! Operational metrics for the session server, scraped at `/metrics` on the
//! metrics port. Everything lives in a dedicated [`prometheus::Registry`]
//! prefixed `veritas_`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metric handles shared across handlers and the eviction task.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Sessions currently open.
    pub sessions_active: IntGauge,
    /// Sessions force-closed by the eviction task.
    pub sessions_evicted_total: IntCounter,
    pub transactions_opened_total: IntCounter,
    pub transactions_committed_total: IntCounter,
    pub transactions_rolled_back_total: IntCounter,
    /// Verifiable reads served (`/verifiable/:key`).
    pub verified_reads_total: IntCounter,
    /// Wall time of engine commits, in seconds.
    pub commit_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("veritas".into()), None)?;

        let sessions_active = IntGauge::new("sessions_active", "Number of open sessions")?;
        registry.register(Box::new(sessions_active.clone()))?;

        let sessions_evicted_total = IntCounter::new(
            "sessions_evicted_total",
            "Sessions force-closed after exceeding the dead timeout",
        )?;
        registry.register(Box::new(sessions_evicted_total.clone()))?;

        let transactions_opened_total =
            IntCounter::new("transactions_opened_total", "Transactions opened")?;
        registry.register(Box::new(transactions_opened_total.clone()))?;

        let transactions_committed_total =
            IntCounter::new("transactions_committed_total", "Transactions committed")?;
        registry.register(Box::new(transactions_committed_total.clone()))?;

        let transactions_rolled_back_total = IntCounter::new(
            "transactions_rolled_back_total",
            "Transactions rolled back by request",
        )?;
        registry.register(Box::new(transactions_rolled_back_total.clone()))?;

        let verified_reads_total =
            IntCounter::new("verified_reads_total", "Verifiable entries served")?;
        registry.register(Box::new(verified_reads_total.clone()))?;

        let commit_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("commit_latency_seconds", "Engine commit latency in seconds")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(commit_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            sessions_active,
            sessions_evicted_total,
            transactions_opened_total,
            transactions_committed_total,
            transactions_rolled_back_total,
            verified_reads_total,
            commit_latency_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

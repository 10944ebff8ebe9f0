//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define pipeline metrics (requests, latency, stage saturation)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `horizon_requests_total` (counter): requests by scheme, intent, outcome
//! - `horizon_request_duration_seconds` (histogram): latency by scheme
//! - `horizon_stage_caller_runs_total` (counter): saturated submissions by stage
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The exporter is installed by the binary, never by the library

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::observability::RequestEvent;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    metrics::describe_counter!("horizon_requests_total", "Requests handled, by outcome");
    metrics::describe_histogram!(
        "horizon_request_duration_seconds",
        metrics::Unit::Seconds,
        "End-to-end pipeline latency"
    );
    metrics::describe_counter!(
        "horizon_stage_caller_runs_total",
        "Submissions run on the caller because the stage was saturated"
    );

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one finished request.
pub fn record_request(event: &RequestEvent) {
    metrics::counter!(
        "horizon_requests_total",
        "scheme" => event.scheme.to_string(),
        "intent" => event.intent_label().to_string(),
        "outcome" => event.outcome
    )
    .increment(1);

    metrics::histogram!(
        "horizon_request_duration_seconds",
        "scheme" => event.scheme.to_string()
    )
    .record(event.duration.as_secs_f64());
}

//! Query lifecycle metrics.
//!
//! Counters for every job state transition plus retrieval outcomes. Without an
//! installed recorder the macros are no-ops, so library users and tests pay
//! nothing.

use std::sync::OnceLock;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const QUERIES_SUBMITTED: &str = "flightpoll_queries_submitted_total";
pub const QUERIES_COMPLETED: &str = "flightpoll_queries_completed_total";
pub const QUERIES_EXPIRED: &str = "flightpoll_queries_expired_total";
pub const QUERIES_INTERRUPTED: &str = "flightpoll_queries_interrupted_total";
pub const QUERIES_IN_FLIGHT: &str = "flightpoll_queries_in_flight";
pub const QUERY_DURATION: &str = "flightpoll_query_duration_seconds";
pub const POLLS: &str = "flightpoll_polls_total";
pub const RETRIEVALS: &str = "flightpoll_retrievals_total";

static PROMETHEUS_HANDLE: OnceLock<std::result::Result<PrometheusHandle, String>> =
    OnceLock::new();

/// Install the global Prometheus recorder.
///
/// Safe to call more than once; only the first call installs.
pub fn init_metrics() -> Result<PrometheusHandle, String> {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| format!("failed to install prometheus recorder: {e}"))?;

            describe_counter!(QUERIES_SUBMITTED, "Queries accepted by the poll protocol");
            describe_counter!(QUERIES_COMPLETED, "Queries whose result was materialized");
            describe_counter!(QUERIES_EXPIRED, "Queries reclaimed after their expiry bound");
            describe_counter!(
                QUERIES_INTERRUPTED,
                "Executors stopped before their query completed"
            );
            describe_gauge!(QUERIES_IN_FLIGHT, "Jobs currently held by the registry");
            describe_histogram!(QUERY_DURATION, "Submission to completion in seconds");
            describe_counter!(POLLS, "PollQuery calls by outcome");
            describe_counter!(RETRIEVALS, "DoGet calls by ticket kind and outcome");

            tracing::info!("Prometheus metrics recorder initialized");
            Ok(handle)
        })
        .clone()
}

pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().and_then(|h| h.as_ref().ok().cloned())
}

/// Handler for `/metrics`.
pub async fn serve_metrics() -> impl IntoResponse {
    match prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}

pub fn record_submitted(query: &str) {
    counter!(QUERIES_SUBMITTED, "query" => query.to_string()).increment(1);
}

pub fn record_completed(query: &str, elapsed_secs: f64) {
    counter!(QUERIES_COMPLETED, "query" => query.to_string()).increment(1);
    histogram!(QUERY_DURATION, "query" => query.to_string()).record(elapsed_secs);
}

pub fn record_expired(query: &str) {
    counter!(QUERIES_EXPIRED, "query" => query.to_string()).increment(1);
}

pub fn record_interrupted(query: &str) {
    counter!(QUERIES_INTERRUPTED, "query" => query.to_string()).increment(1);
}

pub fn set_in_flight(jobs: usize) {
    gauge!(QUERIES_IN_FLIGHT).set(jobs as f64);
}

pub fn record_poll(outcome: &'static str) {
    counter!(POLLS, "outcome" => outcome).increment(1);
}

pub fn record_retrieval(kind: &'static str, outcome: &'static str) {
    counter!(RETRIEVALS, "kind" => kind, "outcome" => outcome).increment(1);
}

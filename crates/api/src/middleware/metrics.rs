//! Prometheus metrics middleware and scheduling counters.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::models::{ReconcileReport, SweepReport, WatchCoverageReport};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Records `http_requests_total` and `http_request_duration_seconds`,
/// labelled by method and matched route.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = method_to_str(req.method());
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    counter!(
        "http_requests_total",
        "method" => method,
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}

fn method_to_str(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        _ => "OTHER",
    }
}

pub fn record_slots_opened(created: usize, skipped: usize) {
    counter!("slots_created_total").increment(created as u64);
    counter!("slots_skipped_total").increment(skipped as u64);
}

/// Counts a lifecycle transition and whether its calendar side effect landed.
pub fn record_transition(operation: &'static str, calendar_synced: bool) {
    counter!(
        "appointment_transitions_total",
        "operation" => operation,
        "calendar_synced" => if calendar_synced { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_sweep(report: &SweepReport) {
    counter!("slots_expired_total").increment(report.expired.max(0) as u64);
    counter!("slots_realized_total").increment(report.realized.max(0) as u64);
}

pub fn record_reconcile(report: &ReconcileReport) {
    counter!("reconcile_appointments_examined_total").increment(report.examined as u64);
    counter!("reconcile_transitions_total", "kind" => "confirmed")
        .increment(report.confirmed as u64);
    counter!("reconcile_transitions_total", "kind" => "cancelled")
        .increment(report.cancelled as u64);
    counter!("reconcile_transitions_total", "kind" => "reaccepted")
        .increment(report.reaccepted as u64);
    counter!("reconcile_failures_total").increment(report.failed as u64);
}

/// Counts an authenticated push notification. Unknown states share one label.
pub fn record_webhook_notification(resource_state: &str) {
    counter!(
        "calendar_webhook_notifications_total",
        "resource_state" => resource_state_label(resource_state)
    )
    .increment(1);
}

fn resource_state_label(resource_state: &str) -> &'static str {
    match resource_state {
        "sync" => "sync",
        "exists" => "exists",
        "not_exists" => "not_exists",
        _ => "other",
    }
}

pub fn record_watch_coverage(report: &WatchCoverageReport) {
    counter!("watch_channels_created_total").increment(report.created as u64);
    counter!("watch_channel_failures_total").increment(report.failed as u64);
}

/// Prometheus text exposition for `/metrics`.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Installs the global Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() -> Result<(), BuildError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0])?
        .install_recorder()?;

    // A concurrent initializer may have won; its handle serves the same recorder.
    let _ = PROMETHEUS_HANDLE.set(handle);
    Ok(())
}

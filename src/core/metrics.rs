//! Prometheus metrics.
//!
//! Installs a global recorder backed by `metrics-exporter-prometheus`, records
//! per-request counters and durations, per-operation outcomes of the file
//! service, and a few tokio runtime gauges. Rendered at `GET /metrics`.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::error::AppError;

/// Total HTTP requests. Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "storage_gateway_http_requests_total";

/// HTTP request duration in seconds. Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "storage_gateway_http_request_duration_seconds";

/// File service calls. Labels: operation, outcome.
pub const FILE_OPERATIONS_TOTAL: &str = "storage_gateway_file_operations_total";

/// File service call duration in seconds. Labels: operation.
pub const FILE_OPERATION_DURATION_SECONDS: &str = "storage_gateway_file_operation_duration_seconds";

/// Declared bytes of successful uploads.
pub const UPLOADED_BYTES_TOTAL: &str = "storage_gateway_uploaded_bytes_total";

/// Session service round trip in seconds. Labels: outcome.
pub const SESSION_CHECK_DURATION_SECONDS: &str = "storage_gateway_session_check_duration_seconds";

pub const RUNTIME_WORKERS: &str = "storage_gateway_runtime_workers";
pub const RUNTIME_ALIVE_TASKS: &str = "storage_gateway_runtime_alive_tasks";

static PROMETHEUS_HANDLE: OnceLock<Result<PrometheusHandle, String>> = OnceLock::new();

/// Install the global Prometheus recorder. Repeated calls return the same handle.
pub fn init_metrics() -> Result<&'static PrometheusHandle, String> {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))
        })
        .as_ref()
        .map_err(Clone::clone)
}

pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(FILE_OPERATIONS_TOTAL, "File operations by outcome");
    describe_histogram!(
        FILE_OPERATION_DURATION_SECONDS,
        "File operation duration in seconds"
    );
    describe_counter!(UPLOADED_BYTES_TOTAL, "Declared bytes of stored uploads");
    describe_histogram!(
        SESSION_CHECK_DURATION_SECONDS,
        "Session service check duration in seconds"
    );
    describe_gauge!(RUNTIME_WORKERS, "Tokio worker threads");
    describe_gauge!(RUNTIME_ALIVE_TASKS, "Tokio tasks currently alive");
}

/// Records request count and duration. `/metrics` itself is not counted.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status)
        .increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

/// Route template for a request path, so file uids do not become label values
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/api/1/upload" => "/api/1/upload",
        "/api/1/files/list" => "/api/1/files/list",
        "/api/1/swagger" => "/api/1/swagger",
        p if p.starts_with("/api/1/download/") => "/api/1/download/{uid}",
        p if p.starts_with("/api/1/files/") => "/api/1/files/{uid}",
        p if p.starts_with("/swagger-ui") || p.starts_with("/api-docs") => "/swagger-ui",
        _ => "other",
    }
}

/// `GET /metrics`: Prometheus text exposition
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(Ok(handle)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Label value for the result of a file operation
pub fn outcome<T>(result: &Result<T, AppError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(AppError::Unauthorized(_)) => "unauthorized",
        Err(AppError::Validation(_)) | Err(AppError::BadRequest(_)) => "rejected",
        Err(AppError::NotFound(_)) => "not_found",
        Err(AppError::Database(_)) | Err(AppError::Internal(_)) => "error",
    }
}

pub fn record_file_operation<T>(
    operation: &'static str,
    started: Instant,
    result: &Result<T, AppError>,
) {
    counter!(FILE_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome(result))
        .increment(1);
    histogram!(FILE_OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

/// `outcome` is `ok`, `not_found` or `error`
pub fn record_session_check(started: Instant, outcome: &'static str) {
    histogram!(SESSION_CHECK_DURATION_SECONDS, "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_uploaded_bytes(size: i64) {
    counter!(UPLOADED_BYTES_TOTAL).increment(size.max(0) as u64);
}

/// Sample tokio runtime gauges every `period` until the runtime shuts down
pub fn spawn_runtime_collector(period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let runtime = tokio::runtime::Handle::current().metrics();
            gauge!(RUNTIME_WORKERS).set(runtime.num_workers() as f64);
            gauge!(RUNTIME_ALIVE_TASKS).set(runtime.num_alive_tasks() as f64);
        }
    })
}

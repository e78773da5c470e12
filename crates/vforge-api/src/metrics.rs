//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vforge_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vforge_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vforge_http_requests_in_flight";

    // Queue handoff metrics
    pub const JOBS_ENQUEUED_TOTAL: &str = "vforge_jobs_enqueued_total";

    // Admission metrics
    pub const ADMISSION_DENIALS_TOTAL: &str = "vforge_admission_denials_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a render operation handed to the queue.
pub fn record_job_enqueued(op: &str) {
    let labels = [("op", op.to_string())];
    counter!(names::JOBS_ENQUEUED_TOTAL, &labels).increment(1);
}

/// Record an admission denial.
pub fn record_admission_denial(reason: &'static str) {
    let labels = [("reason", reason)];
    counter!(names::ADMISSION_DENIALS_TOTAL, &labels).increment(1);
}

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    // Job ids are UUIDs
    let path = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap()
    .replace_all(path, ":job_id");
    // Shot ids are numeric path segments
    let path = regex_lite::Regex::new(r"/shots/[0-9]+")
        .unwrap()
        .replace_all(&path, "/shots/:shot_id");
    // Asset files under the static mount keep only their top-level directory
    let path = regex_lite::Regex::new(r"^(/static/[a-z]+)/.+$")
        .unwrap()
        .replace_all(&path, "$1/*");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    // Increment in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    // Decrement in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

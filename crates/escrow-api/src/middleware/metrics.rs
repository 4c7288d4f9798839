//! # HTTP Metrics
//!
//! Request counters and latency histograms recorded through the `metrics`
//! facade. The binary installs a Prometheus recorder and exposes it at
//! `/metrics`; without a recorder the calls are no-ops.
//!
//! - `escrow_http_requests_total{method, route, status}`
//! - `escrow_http_request_duration_seconds{method, route}`
//! - `escrow_http_errors_total{method, route, status}` (4xx and 5xx)

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

/// Middleware that records request count, latency, and errors.
///
/// Labels use the route template from [`MatchedPath`], never the raw URI.
/// Requests that match no route are labelled `unmatched`.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let status_label = status.as_u16().to_string();
    ::metrics::counter!(
        "escrow_http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status_label.clone()
    )
    .increment(1);
    ::metrics::histogram!(
        "escrow_http_request_duration_seconds",
        "method" => method.clone(),
        "route" => route.clone()
    )
    .record(start.elapsed().as_secs_f64());
    if status.is_client_error() || status.is_server_error() {
        ::metrics::counter!(
            "escrow_http_errors_total",
            "method" => method,
            "route" => route,
            "status" => status_label
        )
        .increment(1);
    }

    response
}

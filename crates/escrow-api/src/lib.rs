//! # escrow-api: HTTP Service for Escrow Chain Sync
//!
//! Thin Axum layer over [`escrow_sync::EscrowChainSync`]. Every action is
//! logged to the primary datastore; the `isPremium` flag selects ledger
//! mirroring and the audit trail.
//!
//! ## API Surface
//!
//! | Path | Module |
//! |------|--------|
//! | `/v1/escrow/*` | [`routes::escrow`] |
//! | `/openapi.json` | [`openapi`] |
//! | `/metrics` | Prometheus text format, when a recorder is installed |
//! | `/health/liveness`, `/health/readiness` | probes |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → Handler
//! ```

pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::error::AppError;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes are mounted outside the metrics and tracing layers.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::escrow::router())
        .merge(openapi::router())
        .route("/metrics", get(prometheus_metrics))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .with_state(state.clone());

    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .with_state(state);

    Router::new().merge(health).merge(api)
}

/// GET /metrics: Prometheus exposition of the installed recorder.
async fn prometheus_metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let handle = state
        .prometheus
        .as_ref()
        .ok_or_else(|| AppError::service_unavailable("metrics recorder not installed"))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    ))
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: checks the database when one is configured.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::ping(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }
    (StatusCode::OK, "ready").into_response()
}

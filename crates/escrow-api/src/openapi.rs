//! # OpenAPI Specification Assembly
//!
//! Collects the utoipa-documented escrow routes into one OpenAPI document
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Escrow Sync API",
        version = "0.1.0",
        description = "Escrow action logging with optional blockchain mirroring.\n\nEvery action is stored in the primary datastore. Premium callers (`isPremium`) additionally mirror actions to an external ledger and can read the ledger audit trail."
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    paths(
        crate::routes::escrow::sync_action,
        crate::routes::escrow::escrow_status,
        crate::routes::escrow::audit_trail,
        crate::routes::escrow::action_history,
        crate::routes::escrow::ledger_record,
    ),
    components(
        schemas(
            crate::routes::escrow::SyncRequest,
            crate::routes::escrow::SyncResponse,
            crate::routes::escrow::SyncResponseData,
            crate::routes::escrow::BlockchainResult,
            crate::routes::escrow::StatusResponse,
            crate::routes::escrow::AuditTrailResponse,
            crate::routes::escrow::HistoryResponse,
            crate::routes::escrow::LedgerRecordResponse,
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
        ),
    ),
    tags(
        (name = "escrow", description = "Escrow action log, ledger mirroring, and audit trail"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

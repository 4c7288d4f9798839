//! # Escrow Sync API
//!
//! | Method | Path | Tier |
//! |--------|------|------|
//! | `POST` | `/v1/escrow/sync` | all; mirrors to the ledger when `isPremium` |
//! | `GET` | `/v1/escrow/status/{transaction_id}` | all; audit trail merged when `isPremium` |
//! | `GET` | `/v1/escrow/audit/{transaction_id}` | premium only |
//! | `GET` | `/v1/escrow/history/{transaction_id}` | all |
//! | `GET` | `/v1/escrow/ledger/{tx_hash}` | premium only |
//!
//! A premium sync always logs the action first. If mirroring then fails the
//! response is still `201`, with `data.blockchain.synced = false` and the
//! reason in `data.blockchain.error`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use escrow_core::{ActionRecord, EscrowAction};
use escrow_sync::{AuditTrail, SyncError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{error_chain, AppError};
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::state::AppState;

/// Body of `POST /v1/escrow/sync`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// The escrow action: `transactionId`, `actionType`, `userId`,
    /// optional `metadata` and `status`.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub action_data: EscrowAction,
    /// Mirror the logged action to the ledger.
    #[serde(default)]
    pub is_premium: bool,
}

impl Validate for SyncRequest {
    fn validate(&self) -> Result<(), String> {
        self.action_data
            .validate()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// `?isPremium=` query flag.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumQuery {
    #[serde(default)]
    pub is_premium: bool,
}

/// Outcome of the ledger mirror attempted by a premium sync.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainResult {
    pub synced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponseData {
    /// The stored record; reflects the ledger hash when mirroring succeeded.
    #[schema(value_type = Object)]
    pub record: ActionRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockchain: Option<BlockchainResult>,
}

/// Response of `POST /v1/escrow/sync`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    pub success: bool,
    pub data: SyncResponseData,
}

/// Ledger-side audit information for a transaction.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrailResponse {
    pub transaction_id: String,
    pub record_id: Uuid,
    pub blockchain_hash: String,
    pub synced_at: Option<DateTime<Utc>>,
    /// Transaction details as returned by the ledger.
    #[schema(value_type = Object)]
    pub details: escrow_ledger::LedgerTransactionDetails,
}

impl From<AuditTrail> for AuditTrailResponse {
    fn from(trail: AuditTrail) -> Self {
        Self {
            transaction_id: trail.transaction_id.to_string(),
            record_id: trail.record_id,
            blockchain_hash: trail.blockchain_hash.to_string(),
            synced_at: trail.synced_at,
            details: trail.details,
        }
    }
}

/// Response of `GET /v1/escrow/status/{transaction_id}`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: Option<String>,
    #[schema(value_type = Object)]
    pub record: ActionRecord,
    pub action_count: usize,
    /// Present for premium callers when the transaction was mirrored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_trail: Option<AuditTrailResponse>,
    /// Why `auditTrail` is absent for a premium caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_trail_error: Option<String>,
}

/// Response of `GET /v1/escrow/history/{transaction_id}`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub transaction_id: String,
    pub count: usize,
    /// Action records, oldest first.
    #[schema(value_type = Vec<Object>)]
    pub records: Vec<ActionRecord>,
}

/// Response of `GET /v1/escrow/ledger/{tx_hash}`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecordResponse {
    pub blockchain_hash: String,
    /// The stored record the hash was issued for.
    #[schema(value_type = Object)]
    pub record: ActionRecord,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/escrow/sync", post(sync_action))
        .route("/v1/escrow/status/{transaction_id}", get(escrow_status))
        .route("/v1/escrow/audit/{transaction_id}", get(audit_trail))
        .route("/v1/escrow/history/{transaction_id}", get(action_history))
        .route("/v1/escrow/ledger/{tx_hash}", get(ledger_record))
}

/// POST /v1/escrow/sync: Log an escrow action; mirror it when premium.
#[utoipa::path(
    post,
    path = "/v1/escrow/sync",
    request_body = SyncRequest,
    responses(
        (status = 201, description = "Action logged", body = SyncResponse),
        (status = 400, description = "Missing or malformed action field", body = crate::error::ErrorBody),
        (status = 500, description = "Store failure", body = crate::error::ErrorBody),
    ),
    tag = "escrow"
)]
pub(crate) async fn sync_action(
    State(state): State<AppState>,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SyncResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let record = state.sync.sync_escrow_action(&req.action_data).await?;

    let (record, blockchain) = if req.is_premium {
        let (record, result) = mirror(&state, record).await;
        (record, Some(result))
    } else {
        (record, None)
    };

    Ok((
        StatusCode::CREATED,
        Json(SyncResponse {
            success: true,
            data: SyncResponseData { record, blockchain },
        }),
    ))
}

async fn mirror(state: &AppState, record: ActionRecord) -> (ActionRecord, BlockchainResult) {
    match state
        .sync
        .mirror_record_with_retry(&record, &state.retry)
        .await
    {
        Ok(outcome) => {
            let result = BlockchainResult {
                synced: true,
                tx_hash: Some(outcome.tx_hash.to_string()),
                synced_at: outcome.record.sync.synced_at(),
                error: None,
            };
            (outcome.record, result)
        }
        Err(err) => {
            tracing::error!(
                transaction_id = %record.transaction_id,
                action_type = %record.action_type,
                record_id = %record.id,
                error = %error_chain(&err),
                "premium ledger mirror failed; action remains logged"
            );
            let result = BlockchainResult {
                synced: false,
                tx_hash: None,
                synced_at: None,
                error: Some(err.to_string()),
            };
            (record, result)
        }
    }
}

/// GET /v1/escrow/status/{transaction_id}: Current escrow status.
#[utoipa::path(
    get,
    path = "/v1/escrow/status/{transaction_id}",
    params(
        ("transaction_id" = String, Path, description = "Escrow transaction identifier"),
        ("isPremium" = Option<bool>, Query, description = "Merge the ledger audit trail"),
    ),
    responses(
        (status = 200, description = "Escrow status", body = StatusResponse),
        (status = 404, description = "Escrow transaction not found", body = crate::error::ErrorBody),
    ),
    tag = "escrow"
)]
pub(crate) async fn escrow_status(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    query: Result<Query<PremiumQuery>, QueryRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let query = extract_query(query)?;
    let status = state.sync.get_escrow_status(&transaction_id).await?;

    let (audit_trail, audit_trail_error) = if query.is_premium {
        match state.sync.get_blockchain_audit_trail(&transaction_id).await {
            Ok(trail) => (Some(trail.into()), None),
            Err(err) => {
                if !matches!(err, SyncError::NoLedgerRecord { .. }) {
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        error = %error_chain(&err),
                        "audit trail unavailable for status request"
                    );
                }
                (None, Some(err.to_string()))
            }
        }
    } else {
        (None, None)
    };

    Ok(Json(StatusResponse {
        status: status.status,
        record: status.record,
        action_count: status.action_count,
        audit_trail,
        audit_trail_error,
    }))
}

/// GET /v1/escrow/audit/{transaction_id}: Ledger audit trail (premium).
#[utoipa::path(
    get,
    path = "/v1/escrow/audit/{transaction_id}",
    params(
        ("transaction_id" = String, Path, description = "Escrow transaction identifier"),
        ("isPremium" = Option<bool>, Query, description = "Must be true"),
    ),
    responses(
        (status = 200, description = "Ledger audit trail", body = AuditTrailResponse),
        (status = 403, description = "Premium feature", body = crate::error::ErrorBody),
        (status = 404, description = "Transaction or ledger record not found", body = crate::error::ErrorBody),
        (status = 503, description = "Ledger not configured", body = crate::error::ErrorBody),
    ),
    tag = "escrow"
)]
pub(crate) async fn audit_trail(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    query: Result<Query<PremiumQuery>, QueryRejection>,
) -> Result<Json<AuditTrailResponse>, AppError> {
    let query = extract_query(query)?;
    if !query.is_premium {
        return Err(AppError::forbidden(
            "Blockchain audit trail is only available for premium users",
        ));
    }
    let trail = state.sync.get_blockchain_audit_trail(&transaction_id).await?;
    Ok(Json(trail.into()))
}

/// GET /v1/escrow/history/{transaction_id}: Append-only action log.
#[utoipa::path(
    get,
    path = "/v1/escrow/history/{transaction_id}",
    params(
        ("transaction_id" = String, Path, description = "Escrow transaction identifier"),
    ),
    responses(
        (status = 200, description = "Action log, oldest first", body = HistoryResponse),
        (status = 404, description = "Escrow transaction not found", body = crate::error::ErrorBody),
    ),
    tag = "escrow"
)]
pub(crate) async fn action_history(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let records = state.sync.get_action_history(&transaction_id).await?;
    Ok(Json(HistoryResponse {
        transaction_id,
        count: records.len(),
        records,
    }))
}

/// GET /v1/escrow/ledger/{tx_hash}: Stored record behind a ledger hash (premium).
#[utoipa::path(
    get,
    path = "/v1/escrow/ledger/{tx_hash}",
    params(
        ("tx_hash" = String, Path, description = "Ledger transaction hash"),
        ("isPremium" = Option<bool>, Query, description = "Must be true"),
    ),
    responses(
        (status = 200, description = "Record mirrored under this hash", body = LedgerRecordResponse),
        (status = 403, description = "Premium feature", body = crate::error::ErrorBody),
        (status = 404, description = "No record carries this hash", body = crate::error::ErrorBody),
    ),
    tag = "escrow"
)]
pub(crate) async fn ledger_record(
    State(state): State<AppState>,
    Path(tx_hash): Path<String>,
    query: Result<Query<PremiumQuery>, QueryRejection>,
) -> Result<Json<LedgerRecordResponse>, AppError> {
    let query = extract_query(query)?;
    if !query.is_premium {
        return Err(AppError::forbidden(
            "Ledger record lookup is only available for premium users",
        ));
    }
    let record = state.sync.find_by_blockchain_hash(&tx_hash).await?;
    let blockchain_hash = record
        .blockchain_hash()
        .map(ToString::to_string)
        .unwrap_or(tx_hash);
    Ok(Json(LedgerRecordResponse {
        blockchain_hash,
        record,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_request_defaults() {
        let req: SyncRequest = serde_json::from_str("{}").unwrap();
        assert!(!req.is_premium);
        assert_eq!(req.validate().unwrap_err(), "transactionId is required");
    }

    #[test]
    fn sync_request_reads_camel_case() {
        let req: SyncRequest = serde_json::from_value(serde_json::json!({
            "actionData": {
                "transactionId": "tx-1",
                "actionType": "deposit",
                "userId": "u-1",
                "metadata": {"amount": 100}
            },
            "isPremium": true
        }))
        .unwrap();
        assert!(req.is_premium);
        assert!(req.validate().is_ok());
        assert_eq!(req.action_data.metadata["amount"], 100);
    }

    #[test]
    fn failed_mirror_omits_hash() {
        let result = BlockchainResult {
            synced: false,
            tx_hash: None,
            synced_at: None,
            error: Some("Blockchain sync failed".into()),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"synced": false, "error": "Blockchain sync failed"})
        );
    }
}

//! Contract tests for HttpLedgerClient against a wiremock gateway.
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | POST   | `/api/v1/transactions` | `record_action_*` |
//! | GET    | `/api/v1/transactions/{txHash}` | `transaction_details_*` |

use escrow_core::{ActionRecord, ActionType, LedgerSync, Metadata, TransactionId, TxHash, UserId};
use escrow_ledger::{
    HttpLedgerClient, LedgerAdapter, LedgerConfig, LedgerError, LedgerSubmission,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> HttpLedgerClient {
    let mut config = LedgerConfig::new(&server.uri(), "test-token").unwrap();
    config.timeout_secs = 5;
    HttpLedgerClient::new(config).unwrap()
}

fn submission() -> LedgerSubmission {
    let record = ActionRecord {
        id: uuid::Uuid::new_v4(),
        sequence: 3,
        transaction_id: TransactionId::new("tx-100").unwrap(),
        action_type: ActionType::new("release").unwrap(),
        user_id: UserId::new("seller-7").unwrap(),
        metadata: Metadata::new(),
        status: Some("released".into()),
        created_at: chrono::Utc::now(),
        sync: LedgerSync::LedgerPending {
            claimed_at: chrono::Utc::now(),
        },
    };
    LedgerSubmission::for_record(&record).unwrap()
}

// ── POST /api/v1/transactions ────────────────────────────────────────

#[tokio::test]
async fn record_action_posts_submission_and_returns_hash() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/transactions"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_partial_json(serde_json::json!({
            "transactionId": "tx-100",
            "actionType": "release",
            "userId": "seller-7",
            "status": "released"
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"txHash": "0xABC"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let receipt = client(&server).record_action(&submission()).await.unwrap();
    assert_eq!(receipt.tx_hash.as_str(), "0xABC");
}

#[tokio::test]
async fn record_action_is_not_retried_on_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/transactions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .record_action(&submission())
        .await
        .unwrap_err();
    match err {
        LedgerError::Api { status, body, .. } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn record_action_rejects_receipt_without_hash() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/transactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"txHash": ""})))
        .mount(&server)
        .await;

    let err = client(&server)
        .record_action(&submission())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Deserialization { .. }));
}

// ── GET /api/v1/transactions/{txHash} ───────────────────────────────

#[tokio::test]
async fn transaction_details_exposes_common_fields() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/transactions/0xABC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "txHash": "0xABC",
            "status": "confirmed",
            "blockNumber": 19_000_001u64,
            "confirmations": 12,
            "gasUsed": "21000"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let details = client(&server)
        .transaction_details(&TxHash::new("0xABC").unwrap())
        .await
        .unwrap();
    assert_eq!(details.status(), Some("confirmed"));
    assert_eq!(details.block_number(), Some(19_000_001));
    assert_eq!(details.get("confirmations"), Some(&serde_json::json!(12)));
    assert_eq!(details.get("gasUsed"), Some(&serde_json::json!("21000")));
}

#[tokio::test]
async fn transaction_details_body_survives_round_trip() {
    let server = MockServer::start().await;
    // Compact with sorted keys, the form serde_json writes back out.
    let bodies = [
        r#"{"blockNumber":"0x1a","status":"finalized","txHash":"0xABC"}"#,
        r#"{"status":"confirmed"}"#,
        r#"{"confirmations":null,"proof":{"root":"0x01","siblings":["0x02","0x03"]},"status":"reorged"}"#,
    ];

    for (i, body) in bodies.iter().enumerate() {
        let hash = format!("0xROUND{i}");
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/transactions/{hash}")))
            .respond_with(ResponseTemplate::new(200).set_body_raw(*body, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let details = client(&server)
            .transaction_details(&TxHash::new(hash).unwrap())
            .await
            .unwrap();
        assert_eq!(serde_json::to_string(&details).unwrap(), *body);
    }
}

#[tokio::test]
async fn transaction_details_maps_404_to_unknown_transaction() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/transactions/0xMISSING"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client(&server)
        .transaction_details(&TxHash::new("0xMISSING").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownTransaction(ref h) if h == "0xMISSING"));
}

#[tokio::test]
async fn transaction_details_surfaces_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/transactions/0xABC"))
        .respond_with(ResponseTemplate::new(500).set_body_string("node offline"))
        .mount(&server)
        .await;

    let err = client(&server)
        .transaction_details(&TxHash::new("0xABC").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Api { status: 500, .. }));
}

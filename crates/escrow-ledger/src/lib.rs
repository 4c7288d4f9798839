//! # escrow-ledger: Ledger Adapter for Escrow Records
//!
//! Mirrors stored escrow action records onto an externally verifiable
//! ledger and reads confirmation details back.
//!
//! - [`LedgerAdapter`]: the object-safe trait the sync core talks to.
//! - [`HttpLedgerClient`]: typed `reqwest` client for a ledger gateway.
//! - [`MockLedger`]: deterministic in-process ledger for development and
//!   tests, with failure injection.
//!
//! ## Gateway API
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/api/v1/transactions` | Record an action, returns `{ "txHash": ... }` |
//! | GET    | `/api/v1/transactions/{txHash}` | Confirmation details |
//!
//! Submissions are not retried: a timed-out POST may still have landed, and
//! resubmitting would mirror the record twice. Detail reads retry transient
//! transport failures with exponential backoff.

pub mod config;
pub mod error;
pub mod http;
pub mod mock;
pub(crate) mod retry;

pub use config::{ConfigError, LedgerConfig};
pub use error::LedgerError;
pub use http::HttpLedgerClient;
pub use mock::MockLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow_core::{
    sha256_hex, ActionRecord, ActionType, CanonicalBytes, CanonicalizationError, Metadata,
    TransactionId, TxHash, UserId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fields of a stored record that are written to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPayload {
    pub record_id: Uuid,
    pub transaction_id: TransactionId,
    pub action_type: ActionType,
    pub user_id: UserId,
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Creation time of the stored record.
    pub timestamp: DateTime<Utc>,
}

/// A ledger write: the payload plus the SHA-256 digest of its canonical
/// bytes, so a mirrored entry can be checked against the store copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSubmission {
    #[serde(flatten)]
    pub payload: LedgerPayload,
    pub payload_digest: String,
}

impl LedgerSubmission {
    /// Compose the submission for a stored record.
    pub fn for_record(record: &ActionRecord) -> Result<Self, CanonicalizationError> {
        let payload = LedgerPayload {
            record_id: record.id,
            transaction_id: record.transaction_id.clone(),
            action_type: record.action_type.clone(),
            user_id: record.user_id.clone(),
            metadata: record.metadata.clone(),
            status: record.status.clone(),
            timestamp: record.created_at,
        };
        let payload_digest = sha256_hex(&CanonicalBytes::new(&payload)?);
        Ok(Self {
            payload,
            payload_digest,
        })
    }
}

/// Confirmation returned by a successful ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub tx_hash: TxHash,
}

/// Ledger-side details of a mirrored record, exactly as the gateway
/// returned them.
///
/// No field is required and none is reinterpreted: the object serializes
/// back to the same JSON it was read from. The accessors are read-only
/// conveniences for logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerTransactionDetails(serde_json::Map<String, serde_json::Value>);

impl LedgerTransactionDetails {
    pub fn new(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }

    pub fn into_map(self) -> serde_json::Map<String, serde_json::Value> {
        self.0
    }

    /// `txHash`, when the gateway reports one as a string.
    pub fn tx_hash(&self) -> Option<&str> {
        self.get("txHash").and_then(serde_json::Value::as_str)
    }

    /// `status` as reported (`pending`, `confirmed`, `finalized`, ...).
    pub fn status(&self) -> Option<&str> {
        self.get("status").and_then(serde_json::Value::as_str)
    }

    /// `blockNumber` as an integer. Accepts JSON numbers and `0x`-prefixed
    /// hex strings.
    pub fn block_number(&self) -> Option<u64> {
        match self.get("blockNumber")? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => {
                let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
                u64::from_str_radix(hex, 16).ok()
            }
            _ => None,
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for LedgerTransactionDetails {
    fn from(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(fields)
    }
}

/// An externally verifiable ledger.
///
/// Implementations must be `Send + Sync` so they can be shared across
/// request handlers behind an `Arc`.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// Write a submission. Fails loudly; never returns a receipt without a hash.
    async fn record_action(
        &self,
        submission: &LedgerSubmission,
    ) -> Result<LedgerReceipt, LedgerError>;

    /// Fetch confirmation details for a previously returned hash.
    async fn transaction_details(
        &self,
        tx_hash: &TxHash,
    ) -> Result<LedgerTransactionDetails, LedgerError>;

    /// Short name for logs ("http", "mock").
    fn name(&self) -> &'static str;
}

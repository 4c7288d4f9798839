//! Deterministic in-process ledger.
//!
//! Hashes are `0x` + SHA-256 of the canonical submission, so the same record
//! always mirrors to the same hash. Failures can be injected per operation.

use async_trait::async_trait;
use escrow_core::{sha256_hex, CanonicalBytes, TxHash};
use parking_lot::Mutex;

use crate::error::LedgerError;
use crate::{LedgerAdapter, LedgerReceipt, LedgerSubmission, LedgerTransactionDetails};

#[derive(Debug, Default)]
struct MockState {
    entries: Vec<(TxHash, LedgerSubmission)>,
    submit_failure: Option<String>,
    query_failure: Option<String>,
    submit_calls: usize,
    query_calls: usize,
}

/// In-memory [`LedgerAdapter`].
#[derive(Debug, Default)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `record_action` fail with `reason`.
    pub fn fail_submissions(&self, reason: impl Into<String>) {
        self.state.lock().submit_failure = Some(reason.into());
    }

    /// Make every subsequent `transaction_details` fail with `reason`.
    pub fn fail_queries(&self, reason: impl Into<String>) {
        self.state.lock().query_failure = Some(reason.into());
    }

    /// Clear injected failures.
    pub fn recover(&self) {
        let mut state = self.state.lock();
        state.submit_failure = None;
        state.query_failure = None;
    }

    /// Submissions the ledger accepted, oldest first.
    pub fn submissions(&self) -> Vec<LedgerSubmission> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// Number of `record_action` calls, including failed ones.
    pub fn submit_calls(&self) -> usize {
        self.state.lock().submit_calls
    }

    /// Number of `transaction_details` calls, including failed ones.
    pub fn query_calls(&self) -> usize {
        self.state.lock().query_calls
    }
}

#[async_trait]
impl LedgerAdapter for MockLedger {
    async fn record_action(
        &self,
        submission: &LedgerSubmission,
    ) -> Result<LedgerReceipt, LedgerError> {
        let mut state = self.state.lock();
        state.submit_calls += 1;
        if let Some(reason) = &state.submit_failure {
            return Err(LedgerError::Unavailable(reason.clone()));
        }

        let bytes = CanonicalBytes::new(submission)
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        let tx_hash = TxHash::new(format!("0x{}", sha256_hex(&bytes)))
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        state.entries.push((tx_hash.clone(), submission.clone()));
        Ok(LedgerReceipt { tx_hash })
    }

    async fn transaction_details(
        &self,
        tx_hash: &TxHash,
    ) -> Result<LedgerTransactionDetails, LedgerError> {
        let mut state = self.state.lock();
        state.query_calls += 1;
        if let Some(reason) = &state.query_failure {
            return Err(LedgerError::Unavailable(reason.clone()));
        }

        let block = state
            .entries
            .iter()
            .position(|(h, _)| h == tx_hash)
            .ok_or_else(|| LedgerError::UnknownTransaction(tx_hash.to_string()))?;
        let (_, submission) = &state.entries[block];
        let confirmations = (state.entries.len() - block) as u64;

        let details = serde_json::json!({
            "txHash": tx_hash,
            "status": "confirmed",
            "blockNumber": block as u64 + 1,
            "confirmations": confirmations,
            "network": "mock",
            "payloadDigest": submission.payload_digest,
        });
        match details {
            serde_json::Value::Object(fields) => Ok(fields.into()),
            _ => Err(LedgerError::Unavailable("mock details are not an object".into())),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LedgerPayload;
    use escrow_core::{ActionType, Metadata, TransactionId, UserId};
    use uuid::Uuid;

    fn submission(tx: &str) -> LedgerSubmission {
        LedgerSubmission {
            payload: LedgerPayload {
                record_id: Uuid::new_v4(),
                transaction_id: TransactionId::new(tx).unwrap(),
                action_type: ActionType::new("deposit").unwrap(),
                user_id: UserId::new("u1").unwrap(),
                metadata: Metadata::new(),
                status: None,
                timestamp: chrono::Utc::now(),
            },
            payload_digest: "00".repeat(32),
        }
    }

    #[tokio::test]
    async fn records_and_reads_back() {
        let ledger = MockLedger::new();
        let receipt = ledger.record_action(&submission("tx1")).await.unwrap();
        assert!(receipt.tx_hash.as_str().starts_with("0x"));

        let details = ledger.transaction_details(&receipt.tx_hash).await.unwrap();
        assert_eq!(details.tx_hash(), Some(receipt.tx_hash.as_str()));
        assert_eq!(details.status(), Some("confirmed"));
        assert_eq!(details.block_number(), Some(1));
        assert_eq!(details.get("network"), Some(&serde_json::json!("mock")));
    }

    #[tokio::test]
    async fn same_submission_same_hash() {
        let ledger = MockLedger::new();
        let sub = submission("tx1");
        let a = ledger.record_action(&sub).await.unwrap();
        let b = ledger.record_action(&sub).await.unwrap();
        assert_eq!(a.tx_hash, b.tx_hash);
    }

    #[tokio::test]
    async fn injected_failures_and_recovery() {
        let ledger = MockLedger::new();
        ledger.fail_submissions("ledger down");
        let err = ledger.record_action(&submission("tx1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(ref m) if m == "ledger down"));
        assert!(ledger.submissions().is_empty());
        assert_eq!(ledger.submit_calls(), 1);

        ledger.recover();
        let receipt = ledger.record_action(&submission("tx1")).await.unwrap();

        ledger.fail_queries("rpc timeout");
        assert!(ledger.transaction_details(&receipt.tx_hash).await.is_err());
        assert_eq!(ledger.query_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_hash_is_reported() {
        let ledger = MockLedger::new();
        let err = ledger
            .transaction_details(&TxHash::new("0xdead").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownTransaction(_)));
    }
}

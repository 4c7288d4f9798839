//! Error types for escrow synchronization.
//!
//! Display strings of the collaborator-failure variants are the messages
//! callers see; the underlying store or ledger error is kept as the source
//! and logged, never shown.

use escrow_core::{CanonicalizationError, ValidationError};
use escrow_ledger::LedgerError;
use escrow_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by [`crate::EscrowChainSync`].
#[derive(Error, Debug)]
pub enum SyncError {
    /// Required input was missing or malformed. No I/O was performed.
    #[error("{0}")]
    InvalidInput(#[from] ValidationError),

    /// The transaction has no stored action records.
    #[error("Escrow transaction not found")]
    NotFound { transaction_id: String },

    /// The transaction has records, but none was mirrored to the ledger.
    #[error("No blockchain record found")]
    NoLedgerRecord { transaction_id: String },

    /// No stored record carries the given ledger hash.
    #[error("No escrow record found for blockchain hash")]
    UnknownLedgerHash { tx_hash: String },

    /// The primary datastore failed.
    #[error("{context}")]
    Persistence {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    /// The ledger write failed. The stored record is marked `SYNC_FAILED`.
    #[error("Blockchain sync failed")]
    LedgerSync(#[source] LedgerError),

    /// Reading confirmation details from the ledger failed.
    #[error("Failed to fetch blockchain audit trail")]
    LedgerQuery(#[source] LedgerError),

    /// The ledger payload could not be serialized.
    #[error("Failed to compose ledger payload")]
    Payload(#[from] CanonicalizationError),

    /// The target record was mirrored already.
    #[error("escrow record {record_id} is already synced to the blockchain")]
    AlreadySynced { record_id: Uuid, tx_hash: String },

    /// Another caller holds the mirroring claim on the target record.
    #[error("escrow record {record_id} is already being synced")]
    SyncInProgress { record_id: Uuid },

    /// Every attempt allowed by the retry policy failed.
    #[error("Blockchain sync failed after {attempts} attempts")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<SyncError>,
    },

    /// No ledger adapter is configured for this deployment.
    #[error("Blockchain ledger is not configured")]
    LedgerNotConfigured,
}

impl SyncError {
    /// Whether another attempt at the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerSync(_))
    }

    pub(crate) fn persistence(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Persistence { context, source }
    }
}

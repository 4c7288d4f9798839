//! # escrow-store: Action Record Persistence
//!
//! The [`ActionRecordStore`] trait is the seam between escrow synchronization
//! and its primary datastore. Two implementations ship here:
//!
//! - [`MemoryActionStore`]: process-local, used when `DATABASE_URL` is unset
//!   and in tests.
//! - [`PgActionStore`]: Postgres via SQLx, with embedded migrations in
//!   [`MIGRATOR`].
//!
//! ## Semantics shared by every implementation
//!
//! - Records form an append-only log. `create` assigns `id`, `sequence` and
//!   `createdAt`; nothing is ever deleted.
//! - `find_one` and `update_one` act on the most recent record (highest
//!   `sequence`) matching the filter.
//! - `update_one` only touches the sync fields, and only when the target's
//!   current [`SyncState`] is in the filter's expected states. This is the
//!   compare-and-swap the mirroring claim relies on.
//! - A `LEDGER_PENDING` record whose claim is older than the filter's
//!   stale-claim cutoff counts as being in an expected state, so an
//!   abandoned claim can be taken over.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow_core::{
    ActionRecord, LedgerSync, SyncState, TransactionId, TxHash, ValidatedAction, ValidationError,
};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryActionStore;
pub use postgres::{PgActionStore, MIGRATOR};

/// Failure reported by a store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database rejected the query or was unreachable.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be turned back into an [`ActionRecord`].
    #[error("corrupt record {id}: {source}")]
    Corrupt {
        id: Uuid,
        #[source]
        source: ValidationError,
    },

    /// The backend is not accepting requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Selection criteria for `find_one` / `update_one`.
///
/// Unset fields match anything. An empty `sync_states` list matches every
/// state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub transaction_id: Option<TransactionId>,
    pub blockchain_hash: Option<TxHash>,
    pub id: Option<Uuid>,
    pub sync_states: Vec<SyncState>,
    /// Also accept `LEDGER_PENDING` records claimed strictly before this
    /// instant. Only consulted when `sync_states` is non-empty.
    pub stale_claims_before: Option<DateTime<Utc>>,
    /// Only a `LEDGER_PENDING` record claimed at exactly this instant.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Only records that carry an escrow `status`.
    pub status_bearing: bool,
}

impl RecordFilter {
    /// Records of one transaction.
    pub fn transaction(transaction_id: &TransactionId) -> Self {
        Self {
            transaction_id: Some(transaction_id.clone()),
            ..Self::default()
        }
    }

    /// Reverse lookup by ledger hash.
    pub fn blockchain_hash(hash: &TxHash) -> Self {
        Self {
            blockchain_hash: Some(hash.clone()),
            ..Self::default()
        }
    }

    /// Exactly one record.
    pub fn record(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Restrict to records currently in one of `states`.
    pub fn in_states(mut self, states: &[SyncState]) -> Self {
        self.sync_states = states.to_vec();
        self
    }

    /// Additionally accept `LEDGER_PENDING` records whose claim predates
    /// `cutoff`.
    pub fn or_claimed_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.stale_claims_before = Some(cutoff);
        self
    }

    /// Restrict to the claim taken at `claimed_at`.
    pub fn claimed_at(mut self, claimed_at: DateTime<Utc>) -> Self {
        self.claimed_at = Some(claimed_at);
        self
    }

    /// Restrict to records that carry a `status`.
    pub fn status_bearing(mut self) -> Self {
        self.status_bearing = true;
        self
    }

    /// Restrict to records mirrored to the ledger.
    pub fn synced(self) -> Self {
        self.in_states(&[SyncState::Synced])
    }

    /// Whether `record` satisfies every set criterion.
    pub fn matches(&self, record: &ActionRecord) -> bool {
        if let Some(tx) = &self.transaction_id {
            if &record.transaction_id != tx {
                return false;
            }
        }
        if let Some(hash) = &self.blockchain_hash {
            if record.blockchain_hash() != Some(hash) {
                return false;
            }
        }
        if let Some(id) = self.id {
            if record.id != id {
                return false;
            }
        }
        if !self.sync_states.is_empty()
            && !self.sync_states.contains(&record.sync_state())
            && !self.is_stale_claim(record)
        {
            return false;
        }
        if let Some(claimed_at) = self.claimed_at {
            if record.sync.claimed_at() != Some(claimed_at) {
                return false;
            }
        }
        if self.status_bearing && record.status.is_none() {
            return false;
        }
        true
    }

    fn is_stale_claim(&self, record: &ActionRecord) -> bool {
        match (self.stale_claims_before, record.sync.claimed_at()) {
            (Some(cutoff), Some(claimed_at)) => claimed_at < cutoff,
            _ => false,
        }
    }
}

/// Persistent store of escrow action records.
#[async_trait]
pub trait ActionRecordStore: Send + Sync {
    /// Append a new record with `syncedToBlockchain = false`.
    async fn create(&self, action: &ValidatedAction) -> Result<ActionRecord, StoreError>;

    /// The most recent record matching `filter`, if any.
    async fn find_one(&self, filter: &RecordFilter) -> Result<Option<ActionRecord>, StoreError>;

    /// Every record of a transaction, oldest first.
    async fn find_all(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<ActionRecord>, StoreError>;

    /// Replace the sync status of the most recent record matching `filter`.
    ///
    /// Returns the updated record, or `None` when nothing matched (including
    /// when the target exists but is not in one of the expected states).
    async fn update_one(
        &self,
        filter: &RecordFilter,
        sync: LedgerSync,
    ) -> Result<Option<ActionRecord>, StoreError>;
}

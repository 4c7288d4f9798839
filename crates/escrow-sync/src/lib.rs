//! # escrow-sync: Escrow Chain Synchronization
//!
//! [`EscrowChainSync`] coordinates the primary datastore with an optional
//! ledger mirror:
//!
//! | Operation | Store | Ledger |
//! |-----------|-------|--------|
//! | [`sync_escrow_action`](EscrowChainSync::sync_escrow_action) | append | none |
//! | [`get_escrow_status`](EscrowChainSync::get_escrow_status) | read | none |
//! | [`sync_to_blockchain`](EscrowChainSync::sync_to_blockchain) | claim, commit | write |
//! | [`get_blockchain_audit_trail`](EscrowChainSync::get_blockchain_audit_trail) | read | read |
//! | [`get_action_history`](EscrowChainSync::get_action_history) | read | none |
//! | [`find_by_blockchain_hash`](EscrowChainSync::find_by_blockchain_hash) | read | none |
//!
//! ## Mirroring
//!
//! A ledger write is always preceded by a durable store write, and a record
//! is only reported as synced once the ledger returned a hash. Mirroring is
//! a compare-and-swap state machine on the record's [`SyncState`]:
//!
//! 1. claim `UNSYNCED | SYNC_FAILED → LEDGER_PENDING`, stamping the claim
//!    time
//! 2. submit to the ledger
//! 3. commit `LEDGER_PENDING → SYNCED` with the hash, or on ledger failure
//!    `LEDGER_PENDING → SYNC_FAILED` with no hash
//!
//! A caller that loses the claim gets [`SyncError::SyncInProgress`] or
//! [`SyncError::AlreadySynced`] and performs no ledger I/O.
//!
//! Commit and release only apply to the claim the caller stamped. If the
//! mirror future is dropped while the ledger call is in flight, the claim is
//! released to `SYNC_FAILED` from a spawned task. A claim that still outlives
//! the [claim lease](EscrowChainSync::with_claim_lease) (crash, failed
//! commit write) is treated as abandoned and may be claimed again.
//!
//! Validation runs before any I/O. The core holds no mutable state of its
//! own; clones share the same collaborators.

pub mod error;
pub mod metrics;
pub mod retry;

pub use error::SyncError;
pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use escrow_core::{ActionRecord, EscrowAction, LedgerSync, SyncState, TransactionId, TxHash};
use escrow_ledger::{LedgerAdapter, LedgerSubmission, LedgerTransactionDetails};
use escrow_store::{ActionRecordStore, RecordFilter};
use serde::Serialize;
use uuid::Uuid;

/// Current status of an escrow transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowStatus {
    /// Status of the canonical record; `None` if no record carries one.
    pub status: Option<String>,
    /// The canonical record: the most recent status-bearing record, or the
    /// most recent record when none carries a status.
    pub record: ActionRecord,
    /// Number of actions logged for the transaction.
    pub action_count: usize,
}

/// Result of a successful mirror.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub tx_hash: TxHash,
    /// The record after the commit, in state `SYNCED`.
    pub record: ActionRecord,
}

/// Ledger-side audit information for a transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrail {
    pub transaction_id: TransactionId,
    pub record_id: Uuid,
    pub blockchain_hash: TxHash,
    pub synced_at: Option<DateTime<Utc>>,
    /// Details exactly as the ledger returned them.
    pub details: LedgerTransactionDetails,
}

/// How long a `LEDGER_PENDING` claim is honoured before another caller may
/// take it over.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(300);

/// Escrow action logging, ledger mirroring, and reconciliation.
#[derive(Clone)]
pub struct EscrowChainSync {
    store: Arc<dyn ActionRecordStore>,
    ledger: Option<Arc<dyn LedgerAdapter>>,
    claim_lease: Duration,
}

impl std::fmt::Debug for EscrowChainSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowChainSync")
            .field("ledger", &self.ledger.as_ref().map(|l| l.name()))
            .field("claim_lease", &self.claim_lease)
            .finish_non_exhaustive()
    }
}

impl EscrowChainSync {
    pub fn new(store: Arc<dyn ActionRecordStore>, ledger: Arc<dyn LedgerAdapter>) -> Self {
        Self {
            store,
            ledger: Some(ledger),
            claim_lease: DEFAULT_CLAIM_LEASE,
        }
    }

    /// A sync core with no ledger. Ledger operations fail with
    /// [`SyncError::LedgerNotConfigured`].
    pub fn without_ledger(store: Arc<dyn ActionRecordStore>) -> Self {
        Self {
            store,
            ledger: None,
            claim_lease: DEFAULT_CLAIM_LEASE,
        }
    }

    /// Override how long a mirroring claim is honoured. Should comfortably
    /// exceed the ledger client's request timeout.
    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    pub fn claim_lease(&self) -> Duration {
        self.claim_lease
    }

    /// Whether a ledger adapter is configured.
    pub fn has_ledger(&self) -> bool {
        self.ledger.is_some()
    }

    fn ledger(&self) -> Result<&Arc<dyn LedgerAdapter>, SyncError> {
        self.ledger.as_ref().ok_or(SyncError::LedgerNotConfigured)
    }

    /// Validate and persist an escrow action. Never touches the ledger.
    ///
    /// The returned record has `syncedToBlockchain = false`.
    pub async fn sync_escrow_action(
        &self,
        action: &EscrowAction,
    ) -> Result<ActionRecord, SyncError> {
        let action = action.validate()?;

        let record = self.store.create(&action).await.map_err(|e| {
            tracing::error!(
                transaction_id = %action.transaction_id,
                action_type = %action.action_type,
                error = %e,
                "failed to log escrow action"
            );
            SyncError::persistence("Failed to log escrow action")(e)
        })?;

        metrics::record_action_logged();
        tracing::info!(
            transaction_id = %record.transaction_id,
            action_type = %record.action_type,
            record_id = %record.id,
            sequence = record.sequence,
            "escrow action logged"
        );
        Ok(record)
    }

    /// Current status of a transaction, derived from its canonical record.
    pub async fn get_escrow_status(&self, transaction_id: &str) -> Result<EscrowStatus, SyncError> {
        let tx = TransactionId::new(transaction_id)?;
        let mut records = self.load_log(&tx).await?;
        let action_count = records.len();
        let latest = records.pop().ok_or_else(|| SyncError::NotFound {
            transaction_id: tx.to_string(),
        })?;

        let with_status = self
            .store
            .find_one(&RecordFilter::transaction(&tx).status_bearing())
            .await
            .map_err(SyncError::persistence("Failed to read escrow records"))?;
        let canonical = with_status.unwrap_or(latest);

        Ok(EscrowStatus {
            status: canonical.status.clone(),
            record: canonical,
            action_count,
        })
    }

    /// The transaction's full action log, oldest first.
    pub async fn get_action_history(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<ActionRecord>, SyncError> {
        let tx = TransactionId::new(transaction_id)?;
        let records = self.load_log(&tx).await?;
        if records.is_empty() {
            return Err(SyncError::NotFound {
                transaction_id: tx.to_string(),
            });
        }
        Ok(records)
    }

    /// The stored record a ledger hash was issued for.
    pub async fn find_by_blockchain_hash(&self, tx_hash: &str) -> Result<ActionRecord, SyncError> {
        let hash = TxHash::new(tx_hash)?;
        self.store
            .find_one(&RecordFilter::blockchain_hash(&hash))
            .await
            .map_err(SyncError::persistence("Failed to read escrow records"))?
            .ok_or_else(|| SyncError::UnknownLedgerHash {
                tx_hash: hash.to_string(),
            })
    }

    async fn load_log(&self, tx: &TransactionId) -> Result<Vec<ActionRecord>, SyncError> {
        self.store.find_all(tx).await.map_err(|e| {
            tracing::error!(transaction_id = %tx, error = %e, "failed to read escrow records");
            SyncError::persistence("Failed to read escrow records")(e)
        })
    }

    /// Mirror the most recent record of `action.transactionId` to the ledger.
    ///
    /// Fails with [`SyncError::NotFound`] before any ledger I/O when the
    /// transaction has no stored record.
    pub async fn sync_to_blockchain(&self, action: &EscrowAction) -> Result<SyncOutcome, SyncError> {
        let action = action.validate()?;
        self.ledger()?;

        let target = self
            .store
            .find_one(&RecordFilter::transaction(&action.transaction_id))
            .await
            .map_err(SyncError::persistence("Failed to read escrow records"))?
            .ok_or_else(|| SyncError::NotFound {
                transaction_id: action.transaction_id.to_string(),
            })?;

        self.mirror_record(&target).await
    }

    /// Mirror one specific stored record to the ledger.
    pub async fn mirror_record(&self, target: &ActionRecord) -> Result<SyncOutcome, SyncError> {
        let ledger = self.ledger()?;
        let submission = LedgerSubmission::for_record(target)?;

        // 1. Claim.
        let now = Utc::now();
        let mut claim = RecordFilter::record(target.id).in_states(&SyncState::CLAIMABLE);
        if let Some(cutoff) = self.stale_claim_cutoff(now) {
            claim = claim.or_claimed_before(cutoff);
        }
        let claimed = self
            .store
            .update_one(&claim, LedgerSync::LedgerPending { claimed_at: now })
            .await
            .map_err(SyncError::persistence("Failed to claim escrow record"))?;
        let Some(claimed_at) = claimed.and_then(|r| r.sync.claimed_at()) else {
            metrics::record_ledger_sync("conflict");
            return Err(self.claim_conflict(target.id).await);
        };
        if let Some(previous) = target.sync.claimed_at() {
            tracing::warn!(
                record_id = %target.id,
                previous_claim = %previous,
                "took over an abandoned mirroring claim"
            );
        }
        let guard = ClaimGuard {
            store: self.store.clone(),
            record_id: target.id,
            claimed_at,
            armed: true,
        };

        // 2. Submit.
        let submitted = ledger.record_action(&submission).await;
        guard.settle();
        let receipt = match submitted {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::error!(
                    transaction_id = %target.transaction_id,
                    action_type = %target.action_type,
                    record_id = %target.id,
                    ledger = ledger.name(),
                    error = %e,
                    "blockchain sync failed"
                );
                release_claim(self.store.as_ref(), target.id, claimed_at, &e.to_string()).await;
                metrics::record_ledger_sync("failed");
                return Err(SyncError::LedgerSync(e));
            }
        };

        // 3. Commit.
        let ours = RecordFilter::record(target.id)
            .in_states(&[SyncState::LedgerPending])
            .claimed_at(claimed_at);
        let synced = LedgerSync::Synced {
            tx_hash: receipt.tx_hash.clone(),
            synced_at: Utc::now(),
        };
        let record = match self.store.update_one(&ours, synced).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::error!(
                    record_id = %target.id,
                    tx_hash = %receipt.tx_hash,
                    "mirroring claim was taken over before commit"
                );
                return Err(SyncError::SyncInProgress {
                    record_id: target.id,
                });
            }
            Err(e) => {
                // The ledger holds the entry but the store does not know it.
                // The record stays LEDGER_PENDING until the claim lease runs out.
                tracing::error!(
                    transaction_id = %target.transaction_id,
                    record_id = %target.id,
                    tx_hash = %receipt.tx_hash,
                    error = %e,
                    "failed to record blockchain hash"
                );
                return Err(SyncError::persistence("Failed to record blockchain hash")(e));
            }
        };

        metrics::record_ledger_sync("synced");
        tracing::info!(
            transaction_id = %record.transaction_id,
            record_id = %record.id,
            tx_hash = %receipt.tx_hash,
            "escrow action synced to blockchain"
        );
        Ok(SyncOutcome {
            tx_hash: receipt.tx_hash,
            record,
        })
    }

    /// Claims taken before this instant are abandoned. `None` when the lease
    /// reaches back past the representable range.
    fn stale_claim_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(self.claim_lease)
            .ok()
            .and_then(|lease| now.checked_sub_signed(lease))
    }

    /// Explain why a claim on `record_id` was refused.
    async fn claim_conflict(&self, record_id: Uuid) -> SyncError {
        match self.store.find_one(&RecordFilter::record(record_id)).await {
            Ok(Some(current)) => match current.sync {
                LedgerSync::Synced { tx_hash, .. } => SyncError::AlreadySynced {
                    record_id,
                    tx_hash: tx_hash.to_string(),
                },
                _ => SyncError::SyncInProgress { record_id },
            },
            Ok(None) => SyncError::NotFound {
                transaction_id: record_id.to_string(),
            },
            Err(e) => SyncError::persistence("Failed to read escrow records")(e),
        }
    }

    /// [`sync_to_blockchain`](Self::sync_to_blockchain) with exponential
    /// backoff on ledger write failures.
    pub async fn sync_to_blockchain_with_retry(
        &self,
        action: &EscrowAction,
        policy: &RetryPolicy,
    ) -> Result<SyncOutcome, SyncError> {
        retry::with_retry(policy, || self.sync_to_blockchain(action)).await
    }

    /// [`mirror_record`](Self::mirror_record) with exponential backoff on
    /// ledger write failures.
    pub async fn mirror_record_with_retry(
        &self,
        target: &ActionRecord,
        policy: &RetryPolicy,
    ) -> Result<SyncOutcome, SyncError> {
        retry::with_retry(policy, || self.mirror_record(target)).await
    }

    /// Ledger confirmation details for the most recent mirrored record of a
    /// transaction.
    ///
    /// Precedence: no record at all → [`SyncError::NotFound`]; records but no
    /// hash → [`SyncError::NoLedgerRecord`]; ledger lookup failure →
    /// [`SyncError::LedgerQuery`].
    pub async fn get_blockchain_audit_trail(
        &self,
        transaction_id: &str,
    ) -> Result<AuditTrail, SyncError> {
        let tx = TransactionId::new(transaction_id)?;
        let read_err = SyncError::persistence("Failed to read escrow records");

        let synced = self
            .store
            .find_one(&RecordFilter::transaction(&tx).synced())
            .await;
        let record = match synced {
            Ok(Some(record)) => record,
            Ok(None) => {
                let any = self
                    .store
                    .find_one(&RecordFilter::transaction(&tx))
                    .await
                    .map_err(read_err)?;
                return Err(match any {
                    Some(_) => SyncError::NoLedgerRecord {
                        transaction_id: tx.to_string(),
                    },
                    None => SyncError::NotFound {
                        transaction_id: tx.to_string(),
                    },
                });
            }
            Err(e) => return Err(read_err(e)),
        };

        let Some(hash) = record.blockchain_hash().cloned() else {
            return Err(SyncError::NoLedgerRecord {
                transaction_id: tx.to_string(),
            });
        };

        let ledger = self.ledger()?;
        let details = ledger.transaction_details(&hash).await.map_err(|e| {
            tracing::error!(
                transaction_id = %tx,
                tx_hash = %hash,
                error = %e,
                "failed to fetch blockchain audit trail"
            );
            metrics::record_ledger_query("failed");
            SyncError::LedgerQuery(e)
        })?;
        metrics::record_ledger_query("ok");
        tracing::debug!(
            transaction_id = %tx,
            tx_hash = %hash,
            ledger_status = details.status().unwrap_or("unreported"),
            block_number = details.block_number(),
            "fetched blockchain audit trail"
        );

        Ok(AuditTrail {
            transaction_id: tx,
            record_id: record.id,
            blockchain_hash: hash,
            synced_at: record.sync.synced_at(),
            details,
        })
    }
}

/// Move the claim stamped `claimed_at` to `SYNC_FAILED` so the record can
/// be claimed again.
async fn release_claim(
    store: &dyn ActionRecordStore,
    record_id: Uuid,
    claimed_at: DateTime<Utc>,
    error: &str,
) {
    let ours = RecordFilter::record(record_id)
        .in_states(&[SyncState::LedgerPending])
        .claimed_at(claimed_at);
    let failed = LedgerSync::SyncFailed {
        error: error.to_string(),
    };
    match store.update_one(&ours, failed).await {
        Ok(Some(_)) => {}
        Ok(None) => tracing::warn!(%record_id, "claim vanished before it could be released"),
        Err(e) => tracing::warn!(
            %record_id,
            error = %e,
            "failed to mark record SYNC_FAILED; it stays LEDGER_PENDING until the lease expires"
        ),
    }
}

/// Releases a mirroring claim when the mirror is dropped mid ledger call.
struct ClaimGuard {
    store: Arc<dyn ActionRecordStore>,
    record_id: Uuid,
    claimed_at: DateTime<Utc>,
    armed: bool,
}

impl ClaimGuard {
    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let record_id = self.record_id;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%record_id, "mirror dropped outside a runtime; claim held until lease expiry");
            return;
        };
        tracing::warn!(%record_id, "mirror dropped during ledger call; releasing claim");
        let store = self.store.clone();
        let claimed_at = self.claimed_at;
        runtime.spawn(async move {
            release_claim(
                store.as_ref(),
                record_id,
                claimed_at,
                "mirror cancelled before the ledger answered",
            )
            .await;
        });
    }
}

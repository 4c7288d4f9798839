//! In-memory action store.
//!
//! All operations are synchronous under a `parking_lot::RwLock`; the lock is
//! never held across an `.await`. `update_one` selects and mutates under a
//! single write guard, so the expected-state check and the write cannot be
//! interleaved with another caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use escrow_core::{ActionRecord, LedgerSync, TransactionId, ValidatedAction};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{ActionRecordStore, RecordFilter, StoreError};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<Uuid, ActionRecord>,
    last_sequence: i64,
}

impl Inner {
    fn latest_id(&self, filter: &RecordFilter) -> Option<Uuid> {
        self.records
            .values()
            .filter(|r| filter.matches(r))
            .max_by_key(|r| r.sequence)
            .map(|r| r.id)
    }
}

/// Thread-safe, cloneable in-memory [`ActionRecordStore`].
///
/// Clones share the same underlying records.
#[derive(Debug, Clone, Default)]
pub struct MemoryActionStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all transactions.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ActionRecordStore for MemoryActionStore {
    async fn create(&self, action: &ValidatedAction) -> Result<ActionRecord, StoreError> {
        let mut guard = self.inner.write();
        guard.last_sequence += 1;
        let record = ActionRecord {
            id: Uuid::new_v4(),
            sequence: guard.last_sequence,
            transaction_id: action.transaction_id.clone(),
            action_type: action.action_type.clone(),
            user_id: action.user_id.clone(),
            metadata: action.metadata.clone(),
            status: action.status.clone(),
            created_at: Utc::now(),
            sync: LedgerSync::Unsynced,
        };
        guard.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_one(&self, filter: &RecordFilter) -> Result<Option<ActionRecord>, StoreError> {
        let guard = self.inner.read();
        Ok(guard
            .latest_id(filter)
            .and_then(|id| guard.records.get(&id).cloned()))
    }

    async fn find_all(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<ActionRecord>, StoreError> {
        let mut records: Vec<ActionRecord> = self
            .inner
            .read()
            .records
            .values()
            .filter(|r| &r.transaction_id == transaction_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.sequence);
        Ok(records)
    }

    async fn update_one(
        &self,
        filter: &RecordFilter,
        sync: LedgerSync,
    ) -> Result<Option<ActionRecord>, StoreError> {
        let mut guard = self.inner.write();
        let Some(id) = guard.latest_id(filter) else {
            return Ok(None);
        };
        Ok(guard.records.get_mut(&id).map(|record| {
            record.sync = sync;
            record.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_core::{EscrowAction, SyncState, TxHash};

    fn pending() -> LedgerSync {
        LedgerSync::LedgerPending {
            claimed_at: Utc::now(),
        }
    }

    fn action(tx: &str, kind: &str, status: Option<&str>) -> ValidatedAction {
        let mut a = EscrowAction::new(tx, kind, "u1");
        a.status = status.map(String::from);
        a.validate().unwrap()
    }

    #[tokio::test]
    async fn create_assigns_increasing_sequence() {
        let store = MemoryActionStore::new();
        let a = store.create(&action("tx1", "deposit", None)).await.unwrap();
        let b = store.create(&action("tx1", "release", None)).await.unwrap();
        assert!(b.sequence > a.sequence);
        assert_ne!(a.id, b.id);
        assert!(!a.synced_to_blockchain());
        assert_eq!(a.sync_state(), SyncState::Unsynced);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn find_one_returns_most_recent() {
        let store = MemoryActionStore::new();
        store.create(&action("tx1", "deposit", None)).await.unwrap();
        store.create(&action("tx2", "deposit", None)).await.unwrap();
        let latest = store.create(&action("tx1", "release", None)).await.unwrap();

        let tx1 = TransactionId::new("tx1").unwrap();
        let found = store
            .find_one(&RecordFilter::transaction(&tx1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, latest.id);
    }

    #[tokio::test]
    async fn find_all_is_oldest_first_and_scoped() {
        let store = MemoryActionStore::new();
        for kind in ["deposit", "payment-initiated", "release"] {
            store.create(&action("tx1", kind, None)).await.unwrap();
        }
        store.create(&action("other", "deposit", None)).await.unwrap();

        let all = store
            .find_all(&TransactionId::new("tx1").unwrap())
            .await
            .unwrap();
        let kinds: Vec<_> = all.iter().map(|r| r.action_type.as_str()).collect();
        assert_eq!(kinds, ["deposit", "payment-initiated", "release"]);
    }

    #[tokio::test]
    async fn update_one_respects_expected_states() {
        let store = MemoryActionStore::new();
        let rec = store.create(&action("tx1", "deposit", None)).await.unwrap();
        let claim = RecordFilter::record(rec.id).in_states(&SyncState::CLAIMABLE);

        let claimed = store.update_one(&claim, pending()).await.unwrap();
        assert_eq!(claimed.unwrap().sync_state(), SyncState::LedgerPending);

        // Second claim loses: the record is no longer claimable.
        let again = store.update_one(&claim, pending()).await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn abandoned_claim_can_be_taken_over() {
        let store = MemoryActionStore::new();
        let rec = store.create(&action("tx1", "deposit", None)).await.unwrap();
        let first = store
            .update_one(
                &RecordFilter::record(rec.id).in_states(&SyncState::CLAIMABLE),
                LedgerSync::LedgerPending {
                    claimed_at: Utc::now() - chrono::Duration::minutes(30),
                },
            )
            .await
            .unwrap()
            .unwrap();
        let first_claim = first.sync.claimed_at().unwrap();

        let takeover = RecordFilter::record(rec.id)
            .in_states(&SyncState::CLAIMABLE)
            .or_claimed_before(Utc::now() - chrono::Duration::minutes(5));
        let second = store.update_one(&takeover, pending()).await.unwrap();
        assert!(second.is_some());

        // The original holder can no longer commit against its claim.
        let stale_commit = RecordFilter::record(rec.id)
            .in_states(&[SyncState::LedgerPending])
            .claimed_at(first_claim);
        let committed = store
            .update_one(
                &stale_commit,
                LedgerSync::SyncFailed {
                    error: "late".into(),
                },
            )
            .await
            .unwrap();
        assert!(committed.is_none());
    }

    #[tokio::test]
    async fn reverse_lookup_by_hash() {
        let store = MemoryActionStore::new();
        let rec = store.create(&action("tx1", "deposit", None)).await.unwrap();
        let hash = TxHash::new("0xfeed").unwrap();
        store
            .update_one(
                &RecordFilter::record(rec.id),
                LedgerSync::Synced {
                    tx_hash: hash.clone(),
                    synced_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let found = store
            .find_one(&RecordFilter::blockchain_hash(&hash))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, rec.id);
        assert!(found.synced_to_blockchain());
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let store = MemoryActionStore::new();
        let rec = store.create(&action("tx1", "deposit", None)).await.unwrap();
        let claim = RecordFilter::record(rec.id).in_states(&SyncState::CLAIMABLE);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let claim = claim.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_one(&claim, pending())
                    .await
                    .unwrap()
                    .is_some()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

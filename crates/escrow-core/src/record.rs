//! # Stored Action Records and the Ledger Sync State Machine
//!
//! An [`ActionRecord`] is one entry of a transaction's append-only action
//! log. Records are never deleted; the only field that changes after
//! creation is [`ActionRecord::sync`].
//!
//! ## Sync state machine
//!
//! ```text
//! Unsynced ──claim──▶ LedgerPending ──commit──▶ Synced
//!     ▲                    │
//!     │                    └──ledger failure──▶ SyncFailed
//!     └────────────(SyncFailed may be re-claimed)────┘
//! ```
//!
//! Every transition is applied by the store as a compare-and-swap on the
//! expected prior [`SyncState`], so two concurrent mirrors of the same record
//! cannot both win. A `LedgerPending` claim records when it was taken; once
//! older than the mirroring lease it may be claimed again by another caller.
//!
//! ## Wire format
//!
//! Records serialize flat, with `syncedToBlockchain`, `blockchainHash` and
//! `syncState` derived from [`LedgerSync`]. Deserialization rejects any
//! combination that breaks the invariant "synced ⇔ hash present".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::Metadata;
use crate::error::ValidationError;
use crate::identity::{ActionType, TransactionId, TxHash, UserId};

/// Persisted sync state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    /// Stored, never submitted to the ledger.
    Unsynced,
    /// A caller holds the mirroring claim and is talking to the ledger.
    LedgerPending,
    /// Mirrored; the record carries a ledger hash.
    Synced,
    /// The last ledger submission failed. Eligible for another attempt.
    SyncFailed,
}

impl SyncState {
    /// States from which a mirroring claim may be taken.
    pub const CLAIMABLE: [SyncState; 2] = [SyncState::Unsynced, SyncState::SyncFailed];

    /// The canonical string name, as stored in the `sync_state` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsynced => "UNSYNCED",
            Self::LedgerPending => "LEDGER_PENDING",
            Self::Synced => "SYNCED",
            Self::SyncFailed => "SYNC_FAILED",
        }
    }

    /// Parse the stored string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNSYNCED" => Some(Self::Unsynced),
            "LEDGER_PENDING" => Some(Self::LedgerPending),
            "SYNCED" => Some(Self::Synced),
            "SYNC_FAILED" => Some(Self::SyncFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger mirroring status of a record, with per-state data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerSync {
    Unsynced,
    LedgerPending {
        claimed_at: DateTime<Utc>,
    },
    Synced {
        tx_hash: TxHash,
        synced_at: DateTime<Utc>,
    },
    SyncFailed {
        error: String,
    },
}

impl LedgerSync {
    /// The state tag of this status.
    pub fn state(&self) -> SyncState {
        match self {
            Self::Unsynced => SyncState::Unsynced,
            Self::LedgerPending { .. } => SyncState::LedgerPending,
            Self::Synced { .. } => SyncState::Synced,
            Self::SyncFailed { .. } => SyncState::SyncFailed,
        }
    }

    /// Whether the record has been mirrored.
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }

    /// The ledger hash, present only once synced.
    pub fn tx_hash(&self) -> Option<&TxHash> {
        match self {
            Self::Synced { tx_hash, .. } => Some(tx_hash),
            _ => None,
        }
    }

    /// When the mirror was confirmed.
    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Synced { synced_at, .. } => Some(*synced_at),
            _ => None,
        }
    }

    /// When the current mirroring claim was taken.
    pub fn claimed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::LedgerPending { claimed_at } => Some(*claimed_at),
            _ => None,
        }
    }

    /// The last submission error, if the most recent attempt failed.
    pub fn last_error(&self) -> Option<&str> {
        match self {
            Self::SyncFailed { error } => Some(error),
            _ => None,
        }
    }

    /// Rebuild a status from its flattened columns.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InconsistentSyncState`] when the columns
    /// disagree, e.g. `SYNCED` without a hash, a hash on an unsynced record,
    /// or a `LEDGER_PENDING` record without a claim time.
    pub fn from_parts(
        state: SyncState,
        tx_hash: Option<TxHash>,
        synced_at: Option<DateTime<Utc>>,
        claimed_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
    ) -> Result<Self, ValidationError> {
        match (state, tx_hash) {
            (SyncState::Synced, Some(tx_hash)) => {
                let synced_at = synced_at.ok_or_else(|| {
                    ValidationError::InconsistentSyncState("synced record has no syncedAt".into())
                })?;
                Ok(Self::Synced { tx_hash, synced_at })
            }
            (SyncState::Synced, None) => Err(ValidationError::InconsistentSyncState(
                "synced record has no blockchainHash".into(),
            )),
            (other, Some(_)) => Err(ValidationError::InconsistentSyncState(format!(
                "{other} record carries a blockchainHash"
            ))),
            (SyncState::Unsynced, None) => Ok(Self::Unsynced),
            (SyncState::LedgerPending, None) => {
                let claimed_at = claimed_at.ok_or_else(|| {
                    ValidationError::InconsistentSyncState("pending record has no claimedAt".into())
                })?;
                Ok(Self::LedgerPending { claimed_at })
            }
            (SyncState::SyncFailed, None) => Ok(Self::SyncFailed {
                error: last_error.unwrap_or_default(),
            }),
        }
    }
}

/// One stored escrow action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ActionRecordWire", try_from = "ActionRecordWire")]
pub struct ActionRecord {
    /// Durable identity assigned by the store.
    pub id: Uuid,
    /// Store-assigned ordering key; strictly increasing in insertion order.
    pub sequence: i64,
    pub transaction_id: TransactionId,
    pub action_type: ActionType,
    pub user_id: UserId,
    pub metadata: Metadata,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sync: LedgerSync,
}

impl ActionRecord {
    /// Whether the record has been mirrored to the ledger.
    pub fn synced_to_blockchain(&self) -> bool {
        self.sync.is_synced()
    }

    /// The ledger confirmation handle, once mirrored.
    pub fn blockchain_hash(&self) -> Option<&TxHash> {
        self.sync.tx_hash()
    }

    /// Current sync state tag.
    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionRecordWire {
    id: Uuid,
    sequence: i64,
    transaction_id: TransactionId,
    action_type: ActionType,
    user_id: UserId,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    status: Option<String>,
    created_at: DateTime<Utc>,
    synced_to_blockchain: bool,
    blockchain_hash: Option<TxHash>,
    sync_state: SyncState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_sync_error: Option<String>,
}

impl From<ActionRecord> for ActionRecordWire {
    fn from(r: ActionRecord) -> Self {
        Self {
            synced_to_blockchain: r.sync.is_synced(),
            blockchain_hash: r.sync.tx_hash().cloned(),
            sync_state: r.sync.state(),
            synced_at: r.sync.synced_at(),
            claimed_at: r.sync.claimed_at(),
            last_sync_error: r.sync.last_error().map(String::from),
            id: r.id,
            sequence: r.sequence,
            transaction_id: r.transaction_id,
            action_type: r.action_type,
            user_id: r.user_id,
            metadata: r.metadata,
            status: r.status,
            created_at: r.created_at,
        }
    }
}

impl TryFrom<ActionRecordWire> for ActionRecord {
    type Error = ValidationError;

    fn try_from(w: ActionRecordWire) -> Result<Self, Self::Error> {
        let sync = LedgerSync::from_parts(
            w.sync_state,
            w.blockchain_hash,
            w.synced_at,
            w.claimed_at,
            w.last_sync_error,
        )?;
        if sync.is_synced() != w.synced_to_blockchain {
            return Err(ValidationError::InconsistentSyncState(format!(
                "syncedToBlockchain={} disagrees with syncState={}",
                w.synced_to_blockchain, w.sync_state
            )));
        }
        Ok(Self {
            id: w.id,
            sequence: w.sequence,
            transaction_id: w.transaction_id,
            action_type: w.action_type,
            user_id: w.user_id,
            metadata: w.metadata,
            status: w.status,
            created_at: w.created_at,
            sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sync: LedgerSync) -> ActionRecord {
        ActionRecord {
            id: Uuid::new_v4(),
            sequence: 1,
            transaction_id: TransactionId::new("tx1").unwrap(),
            action_type: ActionType::new("deposit").unwrap(),
            user_id: UserId::new("u1").unwrap(),
            metadata: Metadata::new(),
            status: Some("locked".into()),
            created_at: Utc::now(),
            sync,
        }
    }

    #[test]
    fn unsynced_record_serializes_flat() {
        let json = serde_json::to_value(record(LedgerSync::Unsynced)).unwrap();
        assert_eq!(json["transactionId"], "tx1");
        assert_eq!(json["syncedToBlockchain"], false);
        assert!(json["blockchainHash"].is_null());
        assert_eq!(json["syncState"], "UNSYNCED");
        assert!(json.get("syncedAt").is_none());
    }

    #[test]
    fn synced_record_round_trips() {
        let r = record(LedgerSync::Synced {
            tx_hash: TxHash::new("0xABC").unwrap(),
            synced_at: Utc::now(),
        });
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["syncedToBlockchain"], true);
        assert_eq!(json["blockchainHash"], "0xABC");
        let back: ActionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn synced_without_hash_is_rejected() {
        let mut json = serde_json::to_value(record(LedgerSync::Unsynced)).unwrap();
        json["syncedToBlockchain"] = serde_json::json!(true);
        json["syncState"] = serde_json::json!("SYNCED");
        assert!(serde_json::from_value::<ActionRecord>(json).is_err());
    }

    #[test]
    fn hash_on_unsynced_record_is_rejected() {
        let err = LedgerSync::from_parts(
            SyncState::Unsynced,
            Some(TxHash::new("0x1").unwrap()),
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InconsistentSyncState(_)));
    }

    #[test]
    fn failed_state_keeps_error_and_no_hash() {
        let sync = LedgerSync::from_parts(
            SyncState::SyncFailed,
            None,
            None,
            None,
            Some("ledger down".into()),
        )
        .unwrap();
        assert!(!sync.is_synced());
        assert!(sync.tx_hash().is_none());
        assert_eq!(sync.last_error(), Some("ledger down"));
    }

    #[test]
    fn pending_record_carries_claim_time() {
        let claimed_at: DateTime<Utc> = "2026-03-01T09:30:00Z".parse().unwrap();
        let r = record(LedgerSync::LedgerPending { claimed_at });
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["syncState"], "LEDGER_PENDING");
        assert_eq!(json["claimedAt"], "2026-03-01T09:30:00Z");
        let back: ActionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.sync.claimed_at(), Some(claimed_at));

        let err =
            LedgerSync::from_parts(SyncState::LedgerPending, None, None, None, None).unwrap_err();
        assert!(matches!(err, ValidationError::InconsistentSyncState(_)));
    }

    #[test]
    fn sync_state_string_round_trip() {
        for s in [
            SyncState::Unsynced,
            SyncState::LedgerPending,
            SyncState::Synced,
            SyncState::SyncFailed,
        ] {
            assert_eq!(SyncState::parse(s.as_str()), Some(s));
        }
        assert_eq!(SyncState::parse("bogus"), None);
    }
}

//! Postgres action store.
//!
//! All queries run against the `escrow_actions` table created by
//! [`MIGRATOR`]. The sync fields are flattened into columns; table CHECK
//! constraints mirror the in-process invariant that a synced row carries a
//! hash and an unsynced one does not.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow_core::{
    ActionRecord, ActionType, LedgerSync, SyncState, TransactionId, TxHash, UserId,
    ValidatedAction, ValidationError,
};
use sqlx::migrate::Migrator;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{ActionRecordStore, RecordFilter, StoreError};

/// Embedded schema migrations for the `escrow_actions` table.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const COLUMNS: &str = "id, sequence, transaction_id, action_type, user_id, metadata, status, \
     created_at, sync_state, blockchain_hash, synced_at, claimed_at, last_sync_error";

/// [`ActionRecordStore`] backed by a SQLx Postgres pool.
#[derive(Debug, Clone)]
pub struct PgActionStore {
    pool: PgPool,
}

impl PgActionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Append `WHERE ...` for `filter` to a query under construction.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &RecordFilter) {
    qb.push(" WHERE TRUE");
    if let Some(tx) = &filter.transaction_id {
        qb.push(" AND transaction_id = ")
            .push_bind(tx.as_str().to_owned());
    }
    if let Some(hash) = &filter.blockchain_hash {
        qb.push(" AND blockchain_hash = ")
            .push_bind(hash.as_str().to_owned());
    }
    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id);
    }
    if !filter.sync_states.is_empty() {
        let states: Vec<String> = filter
            .sync_states
            .iter()
            .map(|s| s.as_str().to_owned())
            .collect();
        match filter.stale_claims_before {
            Some(cutoff) => {
                qb.push(" AND (sync_state = ANY(")
                    .push_bind(states)
                    .push(") OR (sync_state = 'LEDGER_PENDING' AND claimed_at < ")
                    .push_bind(cutoff)
                    .push("))");
            }
            None => {
                qb.push(" AND sync_state = ANY(").push_bind(states).push(")");
            }
        }
    }
    if let Some(claimed_at) = filter.claimed_at {
        qb.push(" AND claimed_at = ").push_bind(claimed_at);
    }
    if filter.status_bearing {
        qb.push(" AND status IS NOT NULL");
    }
}

#[async_trait]
impl ActionRecordStore for PgActionStore {
    async fn create(&self, action: &ValidatedAction) -> Result<ActionRecord, StoreError> {
        let row = sqlx::query_as::<_, ActionRow>(&format!(
            "INSERT INTO escrow_actions (id, transaction_id, action_type, user_id, metadata,
             status, created_at, sync_state, synced_to_blockchain)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'UNSYNCED', FALSE)
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(action.transaction_id.as_str())
        .bind(action.action_type.as_str())
        .bind(action.user_id.as_str())
        .bind(serde_json::Value::Object(action.metadata.clone()))
        .bind(action.status.as_deref())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        row.into_record()
    }

    async fn find_one(&self, filter: &RecordFilter) -> Result<Option<ActionRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM escrow_actions"));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY sequence DESC LIMIT 1");

        let row = qb
            .build_query_as::<ActionRow>()
            .fetch_optional(&self.pool)
            .await?;
        row.map(ActionRow::into_record).transpose()
    }

    async fn find_all(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<ActionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ActionRow>(&format!(
            "SELECT {COLUMNS} FROM escrow_actions
             WHERE transaction_id = $1 ORDER BY sequence ASC"
        ))
        .bind(transaction_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActionRow::into_record).collect()
    }

    async fn update_one(
        &self,
        filter: &RecordFilter,
        sync: LedgerSync,
    ) -> Result<Option<ActionRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE escrow_actions SET sync_state = ");
        qb.push_bind(sync.state().as_str());
        qb.push(", synced_to_blockchain = ")
            .push_bind(sync.is_synced());
        qb.push(", blockchain_hash = ")
            .push_bind(sync.tx_hash().map(|h| h.as_str().to_owned()));
        qb.push(", synced_at = ").push_bind(sync.synced_at());
        qb.push(", claimed_at = ").push_bind(sync.claimed_at());
        qb.push(", last_sync_error = ")
            .push_bind(sync.last_error().map(String::from));

        // The row lock taken by FOR UPDATE makes a concurrent writer re-check
        // the filter after we commit, so only one expected-state update wins.
        qb.push(" WHERE id = (SELECT id FROM escrow_actions");
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY sequence DESC LIMIT 1 FOR UPDATE)");
        qb.push(format!(" RETURNING {COLUMNS}"));

        let row = qb
            .build_query_as::<ActionRow>()
            .fetch_optional(&self.pool)
            .await?;
        row.map(ActionRow::into_record).transpose()
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct ActionRow {
    id: Uuid,
    sequence: i64,
    transaction_id: String,
    action_type: String,
    user_id: String,
    metadata: serde_json::Value,
    status: Option<String>,
    created_at: DateTime<Utc>,
    sync_state: String,
    blockchain_hash: Option<String>,
    synced_at: Option<DateTime<Utc>>,
    claimed_at: Option<DateTime<Utc>>,
    last_sync_error: Option<String>,
}

impl ActionRow {
    fn into_record(self) -> Result<ActionRecord, StoreError> {
        let id = self.id;
        self.try_into_record().map_err(|source| {
            tracing::error!(record_id = %id, error = %source, "stored escrow record is inconsistent");
            StoreError::Corrupt { id, source }
        })
    }

    fn try_into_record(self) -> Result<ActionRecord, ValidationError> {
        let state = SyncState::parse(&self.sync_state).ok_or_else(|| {
            ValidationError::InconsistentSyncState(format!(
                "unknown sync_state {:?}",
                self.sync_state
            ))
        })?;
        let tx_hash = self.blockchain_hash.map(TxHash::new).transpose()?;
        let metadata = match self.metadata {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(ValidationError::InconsistentSyncState(format!(
                    "metadata is not an object: {other}"
                )))
            }
        };

        Ok(ActionRecord {
            id: self.id,
            sequence: self.sequence,
            transaction_id: TransactionId::new(self.transaction_id)?,
            action_type: ActionType::new(self.action_type)?,
            user_id: UserId::new(self.user_id)?,
            metadata,
            status: self.status,
            created_at: self.created_at,
            sync: LedgerSync::from_parts(
                state,
                tx_hash,
                self.synced_at,
                self.claimed_at,
                self.last_sync_error,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_for(filter: &RecordFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM escrow_actions");
        push_filter(&mut qb, filter);
        qb.into_sql()
    }

    #[test]
    fn empty_filter_has_no_predicates() {
        assert_eq!(
            sql_for(&RecordFilter::default()),
            "SELECT 1 FROM escrow_actions WHERE TRUE"
        );
    }

    #[test]
    fn claim_filter_binds_id_and_states() {
        let sql = sql_for(&RecordFilter::record(Uuid::nil()).in_states(&SyncState::CLAIMABLE));
        assert!(sql.contains("AND id = $1"));
        assert!(sql.contains("AND sync_state = ANY($2)"));
    }

    #[test]
    fn takeover_filter_accepts_stale_pending_claims() {
        let cutoff = Utc::now();
        let sql = sql_for(
            &RecordFilter::record(Uuid::nil())
                .in_states(&SyncState::CLAIMABLE)
                .or_claimed_before(cutoff),
        );
        assert!(sql.ends_with(
            "AND (sync_state = ANY($2) OR (sync_state = 'LEDGER_PENDING' AND claimed_at < $3))"
        ));

        let sql = sql_for(
            &RecordFilter::record(Uuid::nil())
                .in_states(&[SyncState::LedgerPending])
                .claimed_at(cutoff),
        );
        assert!(sql.ends_with("AND sync_state = ANY($2) AND claimed_at = $3"));
    }

    #[test]
    fn status_and_hash_predicates() {
        let hash = TxHash::new("0x1").unwrap();
        let sql = sql_for(&RecordFilter::blockchain_hash(&hash).status_bearing());
        assert!(sql.contains("blockchain_hash = $1"));
        assert!(sql.ends_with("AND status IS NOT NULL"));
    }

    fn row(state: &str, hash: Option<&str>) -> ActionRow {
        ActionRow {
            id: Uuid::new_v4(),
            sequence: 1,
            transaction_id: "tx1".into(),
            action_type: "deposit".into(),
            user_id: "u1".into(),
            metadata: serde_json::json!({"amount": 10}),
            status: None,
            created_at: Utc::now(),
            sync_state: state.into(),
            blockchain_hash: hash.map(String::from),
            synced_at: hash.map(|_| Utc::now()),
            claimed_at: (state == "LEDGER_PENDING").then(Utc::now),
            last_sync_error: None,
        }
    }

    #[test]
    fn pending_row_keeps_claim_time() {
        let rec = row("LEDGER_PENDING", None).into_record().unwrap();
        assert_eq!(rec.sync_state(), SyncState::LedgerPending);
        assert!(rec.sync.claimed_at().is_some());
    }

    #[test]
    fn row_maps_to_record() {
        let rec = row("SYNCED", Some("0xabc")).into_record().unwrap();
        assert!(rec.synced_to_blockchain());
        assert_eq!(rec.blockchain_hash().unwrap().as_str(), "0xabc");
        assert_eq!(rec.metadata["amount"], 10);
    }

    #[test]
    fn inconsistent_row_is_corrupt() {
        assert!(matches!(
            row("SYNCED", None).into_record(),
            Err(StoreError::Corrupt { .. })
        ));
        assert!(matches!(
            row("WHATEVER", None).into_record(),
            Err(StoreError::Corrupt { .. })
        ));
        let mut unclaimed = row("LEDGER_PENDING", None);
        unclaimed.claimed_at = None;
        assert!(matches!(
            unclaimed.into_record(),
            Err(StoreError::Corrupt { .. })
        ));
    }
}

//! # Sync Metrics
//!
//! Counters recorded through the `metrics` facade. Nothing is exported unless
//! the binary installs a recorder.
//!
//! - `escrow_actions_logged_total`: actions persisted to the store
//! - `escrow_ledger_sync_total{outcome}`: mirroring attempts by outcome
//!   (`synced`, `failed`, `conflict`)
//! - `escrow_ledger_query_total{outcome}`: audit detail lookups (`ok`, `failed`)

pub fn record_action_logged() {
    ::metrics::counter!("escrow_actions_logged_total").increment(1);
}

pub fn record_ledger_sync(outcome: &'static str) {
    ::metrics::counter!("escrow_ledger_sync_total", "outcome" => outcome).increment(1);
}

pub fn record_ledger_query(outcome: &'static str) {
    ::metrics::counter!("escrow_ledger_query_total", "outcome" => outcome).increment(1);
}

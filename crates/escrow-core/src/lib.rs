//! # escrow-core: Foundational Types for Escrow Chain Sync
//!
//! Every other crate in the workspace depends on `escrow-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `TransactionId`, `UserId`,
//!    `ActionType`, `TxHash` are validated on construction and on
//!    deserialization. No bare strings past the API boundary.
//!
//! 2. **Validation before I/O.** An incoming [`EscrowAction`] is raw wire
//!    input; [`EscrowAction::validate`] produces a [`ValidatedAction`], which
//!    is the only type the store and ledger accept.
//!
//! 3. **Unrepresentable inconsistency.** [`LedgerSync::Synced`] is the only
//!    variant that reports `syncedToBlockchain = true`, and it cannot be built
//!    without a [`TxHash`].
//!
//! 4. **`CanonicalBytes` for digests.** Ledger payload digests are computed
//!    only from canonical (sorted-key, compact) JSON bytes.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `escrow-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod action;
pub mod backoff;
pub mod canonical;
pub mod error;
pub mod identity;
pub mod record;

pub use action::{action_types, EscrowAction, Metadata, ValidatedAction};
pub use backoff::Backoff;
pub use canonical::{sha256_hex, CanonicalBytes};
pub use error::{CanonicalizationError, ValidationError};
pub use identity::{ActionType, TransactionId, TxHash, UserId};
pub use record::{ActionRecord, LedgerSync, SyncState};

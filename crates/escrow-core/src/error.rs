//! # Error Types
//!
//! Validation and canonicalization errors shared across the workspace.
//! Store, ledger, and sync errors live in their own crates.

use thiserror::Error;

/// Input validation failure.
///
/// Raised before any store or ledger I/O so that malformed requests never
/// reach a collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was absent or blank.
    #[error("{field} is required")]
    MissingField {
        /// Wire name of the field.
        field: &'static str,
    },

    /// A field exceeded its maximum length.
    #[error("{field} must not exceed {max} characters")]
    TooLong {
        /// Wire name of the field.
        field: &'static str,
        /// Maximum permitted length.
        max: usize,
    },

    /// A stored record violates the ledger sync invariants.
    #[error("inconsistent sync state: {0}")]
    InconsistentSyncState(String),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

//! # Escrow Actions
//!
//! [`EscrowAction`] is the raw description of a triggering event (deposit,
//! release, refund, ...) as received from a caller. Its fields are optional
//! so that a missing field is reported as a validation error rather than a
//! deserialization failure.
//!
//! [`EscrowAction::validate`] produces a [`ValidatedAction`]; the store and
//! the ledger only ever see validated actions.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{ActionType, TransactionId, UserId};

/// Open key-value payload carried by an action (amount, method, notes).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Well-known action tags used by the marketplace escrow flows.
pub mod action_types {
    pub const DEPOSIT: &str = "deposit";
    pub const PAYMENT_INITIATED: &str = "payment-initiated";
    pub const PAYMENT_CONFIRMED: &str = "payment-confirmed";
    pub const RELEASE: &str = "release";
    pub const REFUND: &str = "refund";
}

/// An escrow action as submitted by a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowAction {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Absent and `null` both read as an empty map.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: Metadata,
    /// Escrow status set by higher-level escrow logic (`locked`, `released`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl EscrowAction {
    /// Create an action with the three required fields and empty metadata.
    pub fn new(
        transaction_id: impl Into<String>,
        action_type: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: Some(transaction_id.into()),
            action_type: Some(action_type.into()),
            user_id: Some(user_id.into()),
            metadata: Metadata::new(),
            status: None,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach an escrow status.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Validate the required fields.
    ///
    /// Fields are checked in the order `transactionId`, `actionType`,
    /// `userId`; the first failure is returned. A blank `status` is treated
    /// as absent.
    pub fn validate(&self) -> Result<ValidatedAction, ValidationError> {
        let transaction_id = required(&self.transaction_id, "transactionId")
            .and_then(TransactionId::new)?;
        let action_type = required(&self.action_type, "actionType").and_then(ActionType::new)?;
        let user_id = required(&self.user_id, "userId").and_then(UserId::new)?;

        let status = self
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        Ok(ValidatedAction {
            transaction_id,
            action_type,
            user_id,
            metadata: self.metadata.clone(),
            status,
        })
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Metadata, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Metadata>::deserialize(deserializer)?.unwrap_or_default())
}

fn required<'a>(
    value: &'a Option<String>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .ok_or(ValidationError::MissingField { field })
}

/// An escrow action whose required fields have been validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedAction {
    pub transaction_id: TransactionId,
    pub action_type: ActionType,
    pub user_id: UserId,
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// A raw required-field value paired with whether validation must accept it.
    fn field(max: usize) -> impl Strategy<Value = (Option<String>, bool)> {
        prop_oneof![
            "[A-Za-z0-9_-]{1,24}".prop_map(|s| (Some(s), true)),
            " {0,3}[a-z0-9]{1,8} {0,3}".prop_map(|s| (Some(s), true)),
            Just((None, false)),
            "[ \t\n]{0,6}".prop_map(|s| (Some(s), false)),
            (1..16usize).prop_map(move |extra| (Some("z".repeat(max + extra)), false)),
        ]
    }

    fn names_field(err: &ValidationError, expected: &str) -> bool {
        match err {
            ValidationError::MissingField { field } | ValidationError::TooLong { field, .. } => {
                *field == expected
            }
            ValidationError::InconsistentSyncState(_) => false,
        }
    }

    proptest! {
        /// An action validates exactly when every required field is present,
        /// non-blank and within its length limit.
        #[test]
        fn validate_accepts_only_complete_actions(
            (tx, tx_ok) in field(TransactionId::MAX_LEN),
            (kind, kind_ok) in field(ActionType::MAX_LEN),
            (user, user_ok) in field(UserId::MAX_LEN),
        ) {
            let action = EscrowAction {
                transaction_id: tx.clone(),
                action_type: kind,
                user_id: user,
                ..EscrowAction::default()
            };
            match action.validate() {
                Ok(v) => {
                    prop_assert!(tx_ok && kind_ok && user_ok);
                    prop_assert_eq!(
                        v.transaction_id.as_str(),
                        tx.as_deref().map(str::trim).unwrap_or_default()
                    );
                }
                Err(err) => {
                    prop_assert!(!(tx_ok && kind_ok && user_ok));
                    let expected = if !tx_ok {
                        "transactionId"
                    } else if !kind_ok {
                        "actionType"
                    } else {
                        "userId"
                    };
                    prop_assert!(names_field(&err, expected), "{err:?} should name {expected}");
                }
            }
        }
    }
}

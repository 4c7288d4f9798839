//! # Identifier Newtypes
//!
//! Newtype wrappers for the string identifiers that flow through escrow
//! synchronization. You cannot pass a `UserId` where a `TransactionId` is
//! expected, and none of them can be blank.
//!
//! Each type validates in `new()` and again on deserialization, so a value
//! read back from the store or a request body upholds the same rules as one
//! built in code.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Implements `Deserialize` by routing through the validating constructor.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Trims `value` and checks it is non-empty and at most `max` characters.
fn validated(value: String, field: &'static str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}

macro_rules! string_newtype {
    ($(#[$meta:meta])* $ty:ident, $field:literal, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $ty(String);

        impl_validating_deserialize!($ty);

        impl $ty {
            /// Maximum length in characters.
            pub const MAX_LEN: usize = $max;

            /// Create a validated identifier.
            ///
            /// # Errors
            ///
            /// Returns [`ValidationError::MissingField`] if the trimmed value is
            /// empty, or [`ValidationError::TooLong`] if it exceeds `MAX_LEN`.
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                validated(value.into(), $field, $max).map(Self)
            }

            /// Access the string value.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype!(
    /// Identifier of the parent escrow transaction.
    ///
    /// Not unique per action: one transaction accumulates many actions
    /// (deposit, payment, release, ...).
    TransactionId,
    "transactionId",
    128
);

string_newtype!(
    /// The actor who triggered an escrow action. Used for audit attribution.
    UserId,
    "userId",
    128
);

string_newtype!(
    /// Escrow action tag (`deposit`, `release`, ...).
    ///
    /// The vocabulary is open: any non-empty tag is accepted. Well-known tags
    /// are listed in [`crate::action_types`].
    ActionType,
    "actionType",
    64
);

string_newtype!(
    /// Ledger confirmation handle returned when a record is mirrored.
    TxHash,
    "txHash",
    256
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_trims_whitespace() {
        let id = TransactionId::new("  tx1 ").unwrap();
        assert_eq!(id.as_str(), "tx1");
        assert_eq!(id.to_string(), "tx1");
    }

    #[test]
    fn blank_values_are_rejected() {
        assert_eq!(
            TransactionId::new("   ").unwrap_err(),
            ValidationError::MissingField {
                field: "transactionId"
            }
        );
        assert_eq!(
            UserId::new("").unwrap_err(),
            ValidationError::MissingField { field: "userId" }
        );
        assert_eq!(
            ActionType::new("\t").unwrap_err(),
            ValidationError::MissingField {
                field: "actionType"
            }
        );
    }

    #[test]
    fn overlong_values_are_rejected() {
        let long = "a".repeat(ActionType::MAX_LEN + 1);
        assert!(matches!(
            ActionType::new(long),
            Err(ValidationError::TooLong { field: "actionType", .. })
        ));
    }

    #[test]
    fn deserialize_validates() {
        let ok: TxHash = serde_json::from_str("\"0xABC\"").unwrap();
        assert_eq!(ok.as_str(), "0xABC");
        assert!(serde_json::from_str::<TxHash>("\"\"").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = UserId::new("u1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"u1\"");
    }
}

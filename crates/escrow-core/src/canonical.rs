//! # Canonical Serialization
//!
//! `CanonicalBytes` is the sole construction path for bytes used in digest
//! computation. Ledger submissions carry a SHA-256 digest of their canonical
//! payload so that the mirrored record can be checked against the store copy.
//!
//! ## Rules
//!
//! - Object keys are sorted (serde_json's default `Map` is ordered).
//! - Compact separators, no trailing whitespace.
//! - The inner buffer is private; the only constructor is [`CanonicalBytes::new`].

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::CanonicalizationError;

/// Bytes produced by sorted-key, compact JSON serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// The value is first lowered to a `serde_json::Value` so struct field
    /// order does not leak into the output.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Ok(Self(serde_json::to_vec(&value)?))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Compute the lowercase hex SHA-256 digest of canonical bytes.
pub fn sha256_hex(data: &CanonicalBytes) -> String {
    let hash = Sha256::digest(data.as_bytes());
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Unordered {
        zeta: u8,
        alpha: u8,
    }

    #[test]
    fn keys_are_sorted() {
        let cb = CanonicalBytes::new(&Unordered { zeta: 1, alpha: 2 }).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"alpha":2,"zeta":1}"#);
    }

    #[test]
    fn known_sha256_vector() {
        let cb = CanonicalBytes::new(&serde_json::json!({})).unwrap();
        assert_eq!(cb.as_bytes(), b"{}");
        assert_eq!(
            sha256_hex(&cb),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn different_inputs_different_digests() {
        let a = CanonicalBytes::new(&serde_json::json!({"amount": 1})).unwrap();
        let b = CanonicalBytes::new(&serde_json::json!({"amount": 2})).unwrap();
        assert_ne!(sha256_hex(&a), sha256_hex(&b));
    }
}

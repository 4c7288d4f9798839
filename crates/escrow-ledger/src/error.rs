//! Ledger adapter error types.

/// Errors from ledger calls.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The gateway returned a non-2xx status.
    #[error("ledger {endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The ledger has no entry for the hash.
    #[error("ledger has no transaction {0}")]
    UnknownTransaction(String),
    /// The ledger refused or could not process the request.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_names_endpoint_and_status() {
        let err = LedgerError::Api {
            endpoint: "POST /transactions".into(),
            status: 503,
            body: "maintenance".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("POST /transactions"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn config_error_converts() {
        let err: LedgerError = super::super::config::ConfigError::MissingToken.into();
        assert!(matches!(err, LedgerError::Config(_)));
    }
}

//! Typed HTTP client for a ledger gateway.

use std::time::Duration;

use async_trait::async_trait;
use escrow_core::TxHash;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;

use crate::config::{ConfigError, LedgerConfig};
use crate::error::LedgerError;
use crate::retry::{retry_send, READ_BACKOFF};
use crate::{LedgerAdapter, LedgerReceipt, LedgerSubmission, LedgerTransactionDetails};

const TRANSACTIONS_PATH: &str = "api/v1/transactions";

/// [`LedgerAdapter`] talking to a ledger gateway over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    http: reqwest::Client,
    config: LedgerConfig,
}

impl HttpLedgerClient {
    /// Create a client from configuration.
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_token))
            .map_err(|_| LedgerError::Config(ConfigError::MissingToken))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| LedgerError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

/// Turn a gateway response into `T`, or a typed error for non-2xx statuses.
async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<T, LedgerError> {
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
        return Err(LedgerError::Api {
            endpoint: endpoint.into(),
            status,
            body,
        });
    }

    resp.json().await.map_err(|e| LedgerError::Deserialization {
        endpoint: endpoint.into(),
        source: e,
    })
}

#[async_trait]
impl LedgerAdapter for HttpLedgerClient {
    /// Calls `POST {api_url}/api/v1/transactions`. Not retried.
    async fn record_action(
        &self,
        submission: &LedgerSubmission,
    ) -> Result<LedgerReceipt, LedgerError> {
        let endpoint = "POST /transactions";
        let url = self.config.endpoint(TRANSACTIONS_PATH);

        let resp = self
            .http
            .post(&url)
            .json(submission)
            .send()
            .await
            .map_err(|e| LedgerError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;

        let receipt: LedgerReceipt = decode(endpoint, resp).await?;
        tracing::debug!(
            transaction_id = %submission.payload.transaction_id,
            tx_hash = %receipt.tx_hash,
            "ledger accepted submission"
        );
        Ok(receipt)
    }

    /// Calls `GET {api_url}/api/v1/transactions/{txHash}`.
    async fn transaction_details(
        &self,
        tx_hash: &TxHash,
    ) -> Result<LedgerTransactionDetails, LedgerError> {
        let endpoint = "GET /transactions/{txHash}";
        let encoded: String =
            url::form_urlencoded::byte_serialize(tx_hash.as_str().as_bytes()).collect();
        let url = self
            .config
            .endpoint(&format!("{TRANSACTIONS_PATH}/{encoded}"));

        let resp = retry_send(&READ_BACKOFF, endpoint, || self.http.get(&url).send())
            .await
            .map_err(|e| LedgerError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LedgerError::UnknownTransaction(tx_hash.to_string()));
        }
        decode(endpoint, resp).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

//! Transport-level retry for idempotent ledger reads.
//!
//! Connection failures and timeouts are retried on [`READ_BACKOFF`]. Any
//! response that arrives, whatever its status, is returned to the caller
//! as-is.

use std::future::Future;
use std::time::Duration;

use escrow_core::Backoff;

/// Four attempts, waiting 200ms, 400ms and 800ms in between.
pub(crate) const READ_BACKOFF: Backoff = Backoff::new(4, Duration::from_millis(200));

/// Send a request built by `send`, retrying transport failures on `backoff`.
pub(crate) async fn retry_send<F, Fut>(
    backoff: &Backoff,
    endpoint: &str,
    send: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match send().await {
            Err(e) if backoff.has_next(attempt) => {
                let delay = backoff.delay_after(attempt);
                tracing::warn!(
                    endpoint,
                    attempt,
                    max_attempts = backoff.attempts(),
                    error = %e,
                    "ledger read failed, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn refused_connections_use_every_attempt() {
        let calls = AtomicU32::new(0);
        let http = client();
        let backoff = Backoff::new(3, Duration::ZERO);

        // Nothing listens on port 1.
        let result = retry_send(&backoff, "GET /", || {
            calls.fetch_add(1, Ordering::SeqCst);
            http.get("http://127.0.0.1:1/").send()
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn error_statuses_are_returned_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let calls = AtomicU32::new(0);
        let http = client();
        let url = server.uri();
        let resp = retry_send(&READ_BACKOFF, "GET /", || {
            calls.fetch_add(1, Ordering::SeqCst);
            http.get(&url).send()
        })
        .await
        .unwrap();

        assert_eq!(resp.status().as_u16(), 503);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_once_the_gateway_answers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let calls = AtomicU32::new(0);
        let http = client();
        let good = server.uri();
        let resp = retry_send(&Backoff::new(4, Duration::ZERO), "GET /", || {
            let url = if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                "http://127.0.0.1:1/".to_string()
            } else {
                good.clone()
            };
            http.get(url).send()
        })
        .await
        .unwrap();

        assert!(resp.status().is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

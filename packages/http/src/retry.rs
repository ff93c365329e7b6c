//! HTTP retry helper for transient errors.
//!
//! Fetchers call [`send_with_retry`] instead of
//! `reqwest::RequestBuilder::send()` directly, so transient failures
//! (timeouts, connection resets, rate limiting, server errors) get
//! exponential backoff while every other outcome reaches the caller
//! unchanged. Callers keep their own error taxonomy: a 4xx response is
//! returned as a normal [`reqwest::Response`], not an error.
//!
//! ```ignore
//! let response = retry::send_with_retry(|| client.get(&url).query(&params), 2).await?;
//! ```

use std::time::Duration;

use reqwest::StatusCode;

/// Delay before the first retry. Doubles on each subsequent attempt.
const BASE_DELAY: Duration = Duration::from_millis(250);

/// Upper bound on a single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(8);

/// Sends the request built by `build_request`, retrying transient failures
/// up to `max_retries` times.
///
/// The closure is called once per attempt since builders are consumed by
/// `.send()`.
///
/// Once retries are exhausted the last transport error is returned, or the
/// last 429/5xx response if the server kept answering.
///
/// # Errors
///
/// Returns the [`reqwest::Error`] of the final attempt if the request never
/// produced a response.
#[allow(clippy::future_not_send)]
pub async fn send_with_retry<F>(
    build_request: F,
    max_retries: u32,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    send(build_request, max_retries, true).await
}

/// Like [`send_with_retry`], but only re-sends when no response arrived.
///
/// For requests whose server answers every failure, including bad input,
/// with a 5xx: re-sending those only repeats the rejection.
///
/// # Errors
///
/// Returns the [`reqwest::Error`] of the final attempt if the request never
/// produced a response.
#[allow(clippy::future_not_send)]
pub async fn send_with_transport_retry<F>(
    build_request: F,
    max_retries: u32,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    send(build_request, max_retries, false).await
}

#[allow(clippy::future_not_send)]
async fn send<F>(
    build_request: F,
    max_retries: u32,
    retry_status: bool,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        let retries_left = attempt < max_retries;

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && retries_left {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(e);
            }
            Ok(response) => {
                let status = response.status();
                if retry_status && is_retryable_status(status) && retries_left {
                    log::warn!("  HTTP {status} from {}", response.url());
                    attempt += 1;
                    continue;
                }
                return Ok(response);
            }
        }
    }
}

/// Backoff before retry number `attempt` (1-based): 250ms, 500ms, 1s, ...
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    BASE_DELAY.saturating_mul(factor).min(MAX_DELAY)
}

/// Returns `true` for statuses worth retrying: 429 and any 5xx.
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedServer;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(250));
        assert_eq!(backoff_delay(2), Duration::from_millis(500));
        assert_eq!(backoff_delay(3), Duration::from_secs(1));
        assert_eq!(backoff_delay(20), MAX_DELAY);
        assert_eq!(backoff_delay(64), MAX_DELAY);
    }

    #[test]
    fn retries_rate_limit_and_server_errors_only() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::OK));
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let server = ScriptedServer::start(vec![(503, "down"), (429, "slow"), (200, "ok")]).await;
        let client = reqwest::Client::new();
        let url = format!("{}/x", server.base_url());

        let response = send_with_retry(|| client.get(&url), 2).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
        assert_eq!(server.requests().len(), 3);
    }

    #[tokio::test]
    async fn last_server_error_is_returned_when_retries_run_out() {
        let server = ScriptedServer::start(vec![(503, "down")]).await;
        let client = reqwest::Client::new();
        let url = format!("{}/x", server.base_url());

        let response = send_with_retry(|| client.get(&url), 1).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.text().await.unwrap(), "down");
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn client_errors_are_returned_unchanged() {
        let server = ScriptedServer::start(vec![(404, "missing"), (200, "ok")]).await;
        let client = reqwest::Client::new();
        let url = format!("{}/x", server.base_url());

        let response = send_with_retry(|| client.get(&url), 3).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.text().await.unwrap(), "missing");
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn transport_retry_returns_server_errors_immediately() {
        let server = ScriptedServer::start(vec![(500, "bad input"), (200, "ok")]).await;
        let client = reqwest::Client::new();
        let url = format!("{}/predict/v1", server.base_url());

        let response = send_with_transport_retry(|| client.post(&url).body("{}"), 2)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].line, "POST /predict/v1 HTTP/1.1");
        assert_eq!(requests[0].body, "{}");
    }
}

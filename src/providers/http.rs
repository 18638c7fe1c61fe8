/*!
 * Shared JSON transport for the hosted and local providers.
 *
 * Connection failures, 429 and 5xx responses are retried with exponential
 * backoff. Other 4xx responses are returned immediately.
 */

use std::time::Duration;

use anyhow::Context;
use log::{error, warn};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::ProviderError;

/// Retry policy for transport failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first request
    pub max_retries: u32,
    /// Base backoff in milliseconds, doubled after each failure
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << shift))
    }
}

/// Build a client with the configured request timeout
pub fn build_client(timeout_secs: u64) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .with_context(|| format!("Failed to build HTTP client with a {}s timeout", timeout_secs))
}

/// Map a non-success status and body to a provider error
pub fn status_error(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimitExceeded(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationError(body),
        _ => ProviderError::ApiError {
            status_code: status.as_u16(),
            message: body,
        },
    }
}

/// POST `body` as JSON and decode the response.
///
/// `decorate` adds provider headers to each attempt. `classify` may turn a
/// non-success body into a more specific error (e.g. a content-policy block);
/// returning `None` falls back to [`status_error`].
pub async fn post_json<B, R, D, C>(
    client: &Client,
    url: &str,
    body: &B,
    policy: RetryPolicy,
    provider_name: &str,
    decorate: D,
    classify: C,
) -> Result<R, ProviderError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
    D: Fn(RequestBuilder) -> RequestBuilder,
    C: Fn(StatusCode, &str) -> Option<ProviderError>,
{
    let mut attempt = 0;

    loop {
        let request = decorate(client.post(url).header("Content-Type", "application/json")).json(body);

        let last_error = match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let text = response
                        .text()
                        .await
                        .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;
                    return serde_json::from_str::<R>(&text).map_err(|e| {
                        error!("Failed to parse {} response: {}", provider_name, e);
                        ProviderError::ParseError(e.to_string())
                    });
                }

                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Failed to get error response text".to_string());

                if let Some(specific) = classify(status, &error_text) {
                    return Err(specific);
                }

                let err = status_error(status, error_text);
                if !err.is_transient() {
                    error!("{} API error ({}): {}", provider_name, status, err);
                    return Err(err);
                }
                err
            }
            Err(e) if e.is_timeout() || e.is_connect() => ProviderError::ConnectionError(e.to_string()),
            Err(e) => ProviderError::RequestFailed(e.to_string()),
        };

        attempt += 1;
        if attempt > policy.max_retries {
            error!(
                "{} request failed after {} attempt(s): {}",
                provider_name, attempt, last_error
            );
            return Err(last_error);
        }

        let delay = policy.backoff(attempt);
        warn!(
            "{} request failed ({}), retrying in {} ms - attempt {}/{}",
            provider_name,
            last_error,
            delay.as_millis(),
            attempt + 1,
            policy.max_retries + 1
        );
        tokio::time::sleep(delay).await;
    }
}

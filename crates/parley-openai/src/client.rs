// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the chat completions endpoint.
//!
//! Provides [`CompletionClient`] which handles request construction,
//! authentication, and transport-level retries. Capacity refusals (429) are
//! never retried here; they are returned as [`ParleyError::RateLimited`] so
//! the caller can fall back to another model.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use parley_config::model::ProviderConfig;
use parley_core::ParleyError;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use tracing::{debug, error, warn};

use crate::types::{ApiErrorResponse, CompletionRequest, CompletionResponse};

static RETRY_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Please wait (\d+) seconds before retrying").expect("retry hint pattern is valid")
});

/// Parses the wait hint embedded in a rate-limit message.
pub fn retry_after_from_message(message: &str) -> Option<Duration> {
    RETRY_HINT
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .map(Duration::from_secs)
}

/// Bounded retry with exponential backoff and a shrinking wall-clock budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Seconds; the n-th retry sleeps `backoff_factor * 2^(n-1)`.
    pub backoff_factor: f64,
    pub backoff_max: Duration,
    /// Budget for all attempts of one request.
    pub total_timeout: Duration,
    /// Upper bound on a single attempt.
    pub request_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            backoff_max: Duration::from_secs(config.backoff_max_secs),
            total_timeout: Duration::from_secs(config.retry_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Sleep before retry number `retry` (1-based). The first retry is immediate.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let secs = self.backoff_factor * 2f64.powi(retry as i32 - 1);
        Duration::from_secs_f64(secs.max(0.0)).min(self.backoff_max)
    }
}

/// Returns true for HTTP status codes worth retrying.
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 500 | 502 | 503 | 504)
}

/// HTTP client for chat completions.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    url: String,
    policy: RetryPolicy,
}

impl CompletionClient {
    /// Creates a client for `config.endpoint`.
    ///
    /// The key is sent both as `api-key` and as a bearer token, which covers
    /// Azure AI inference and plain OpenAI-compatible servers.
    pub fn new(api_key: &str, config: &ProviderConfig) -> Result<Self, ParleyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| ParleyError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| ParleyError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ParleyError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })?;

        let url = format!(
            "{}/chat/completions?api-version={}",
            config.endpoint.trim_end_matches('/'),
            config.api_version
        );

        Ok(Self {
            client,
            url,
            policy: RetryPolicy::from_config(config),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends a request, retrying transient failures.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ParleyError> {
        let started = Instant::now();
        let mut retry = 0;

        loop {
            let remaining = self.policy.total_timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(ParleyError::Timeout {
                    duration: self.policy.total_timeout,
                });
            }

            let outcome = self
                .client
                .post(&self.url)
                .timeout(self.policy.request_timeout.min(remaining))
                .json(request)
                .send()
                .await;

            let response = match outcome {
                Ok(response) => response,
                Err(e) => {
                    let transient = e.is_connect() || e.is_timeout() || e.is_request();
                    if transient && retry < self.policy.max_retries {
                        retry += 1;
                        warn!(retry, error = %e, "completion request failed, retrying");
                        tokio::time::sleep(self.policy.backoff(retry)).await;
                        continue;
                    }
                    error!(model = request.model, error = %e, "completion request failed");
                    return Err(ParleyError::Provider {
                        message: format!("HTTP request failed: {e}"),
                        transient,
                        source: Some(Box::new(e)),
                    });
                }
            };

            let status = response.status();
            debug!(status = %status, retry, model = request.model, "completion response received");

            if status.is_success() {
                let body = response.text().await.map_err(|e| ParleyError::Provider {
                    message: format!("failed to read response body: {e}"),
                    transient: true,
                    source: Some(Box::new(e)),
                })?;
                return serde_json::from_str(&body).map_err(|e| ParleyError::Provider {
                    message: format!("failed to parse API response: {e}"),
                    transient: false,
                    source: Some(Box::new(e)),
                });
            }

            if is_retryable_status(status) && retry < self.policy.max_retries {
                retry += 1;
                let delay = retry_after_header(response.headers())
                    .unwrap_or_else(|| self.policy.backoff(retry))
                    .min(self.policy.backoff_max);
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, retry, body = %body, "transient error, will retry");
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body, &request.model));
        }
    }
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Maps a non-success response to the error taxonomy.
fn classify_failure(status: StatusCode, body: &str, model: &str) -> ParleyError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.display())
        .unwrap_or_else(|_| format!("API returned {status}: {body}"));

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            warn!(model, message = %message, "model is rate limited");
            ParleyError::RateLimited {
                model: model.to_string(),
                retry_after: retry_after_from_message(&message),
                message,
            }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            error!(status = %status, "completion endpoint rejected credentials");
            ParleyError::Unauthorized { message }
        }
        _ => {
            error!(status = %status, model, message = %message, "completion request failed");
            ParleyError::Provider {
                message,
                transient: is_retryable_status(status),
                source: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiMessage;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: &str) -> ProviderConfig {
        ProviderConfig {
            api_key: Some("test-api-key".into()),
            endpoint: endpoint.to_string(),
            max_retries: 2,
            backoff_factor: 0.01,
            ..ProviderConfig::default()
        }
    }

    fn test_client(endpoint: &str) -> CompletionClient {
        CompletionClient::new("test-api-key", &test_config(endpoint)).unwrap()
    }

    fn test_request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4.1".into(),
            messages: vec![ApiMessage::System {
                content: "Hello".into(),
            }],
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    fn success_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4.1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
        })
    }

    #[test]
    fn parses_retry_hint() {
        let msg = "Rate limit of 10 per 60s exceeded. Please wait 42 seconds before retrying.";
        assert_eq!(retry_after_from_message(msg), Some(Duration::from_secs(42)));
        assert_eq!(retry_after_from_message("slow down"), None);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_factor: 0.8,
            backoff_max: Duration::from_secs(2),
            total_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        };
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::from_secs_f64(1.6));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
    }

    #[test]
    fn url_includes_api_version() {
        let client = test_client("https://example.test/");
        assert_eq!(
            client.url(),
            "https://example.test/chat/completions?api-version=2025-03-01-preview"
        );
    }

    #[tokio::test]
    async fn complete_success_sends_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(query_param("api-version", "2025-03-01-preview"))
            .and(header("api-key", "test-api-key"))
            .and(header("authorization", "Bearer test-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Hi!")))
            .mount(&server)
            .await;

        let response = test_client(&server.uri())
            .complete(&test_request())
            .await
            .unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hi!"));
    }

    #[tokio::test]
    async fn retries_on_503_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("After retry")))
            .mount(&server)
            .await;

        let response = test_client(&server.uri())
            .complete(&test_request())
            .await
            .unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("After retry")
        );
    }

    #[tokio::test]
    async fn exhausts_retries_on_502() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .complete(&test_request())
            .await
            .unwrap_err();
        assert!(err.is_transient(), "got: {err:?}");
    }

    #[tokio::test]
    async fn rate_limit_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {
                    "code": "RateLimitReached",
                    "message": "Rate limit exceeded. Please wait 30 seconds before retrying."
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .complete(&test_request())
            .await
            .unwrap_err();
        match err {
            ParleyError::RateLimited {
                model,
                retry_after,
                message,
            } => {
                assert_eq!(model, "gpt-4.1");
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
                assert!(message.starts_with("(RateLimitReached)"));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"code": "unauthorized", "message": "Bad credentials"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .complete(&test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Unauthorized { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn bad_request_propagates_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": "content_filter", "message": "Filtered."}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .complete(&test_request())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("(content_filter) Filtered."), "got: {err}");
    }
}

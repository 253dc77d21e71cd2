// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.
//!
//! Failures are sorted by what retrying would achieve: throttling and server
//! errors are retried here a bounded number of times and then surface as
//! retryable [`ParlaError::Provider`]; rejected requests and bad credentials
//! surface immediately as terminal errors.

use std::time::Duration;

use parla_core::ParlaError;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, MessageRequest, MessageResponse};

const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound on a server-requested `retry-after` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

/// How a non-success status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    /// Throttled or overloaded: try again after a pause.
    Transient,
    /// Credentials rejected: configuration problem.
    Credentials,
    /// The request itself was rejected: same input, same answer.
    Rejected,
}

fn classify(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        401 | 403 => StatusClass::Credentials,
        408 | 409 | 429 | 500..=599 => StatusClass::Transient,
        _ => StatusClass::Rejected,
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    default_model: String,
    max_retries: u32,
    retry_delay: Duration,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, api_version: String, model: String) -> Result<Self, ParlaError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key)
                .map_err(|e| ParlaError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&api_version).map_err(|e| {
                ParlaError::Config(format!("invalid API version header value: {e}"))
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ParlaError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            default_model: model,
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
            base_url: API_BASE_URL.to_string(),
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Point at a local mock server with short retry pauses.
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self.retry_delay = Duration::from_millis(5);
        self
    }

    /// Send one request, retrying transient failures with linear backoff.
    pub async fn complete_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ParlaError> {
        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&self.base_url)
                .json(request)
                .send()
                .await
                .map_err(map_send_error)?;

            let status = response.status();
            debug!(status = %status, attempt, "completion response received");
            if status.is_success() {
                let body = response.text().await.map_err(map_send_error)?;
                return serde_json::from_str::<MessageResponse>(&body).map_err(|e| {
                    ParlaError::MalformedResponse {
                        message: format!("failed to parse API response: {e}"),
                    }
                });
            }

            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let class = classify(status);
            if class == StatusClass::Transient && attempt < self.max_retries {
                attempt += 1;
                let pause = retry_after.unwrap_or(self.retry_delay * attempt);
                warn!(status = %status, attempt, pause_ms = pause.as_millis() as u64, "transient API error, retrying");
                tokio::time::sleep(pause).await;
                continue;
            }
            return Err(status_error(status, class, &body));
        }
    }
}

/// Server-requested pause, in whole seconds, capped.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

fn status_error(status: StatusCode, class: StatusClass, body: &str) -> ParlaError {
    let detail = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_err) => format!("{}: {}", api_err.error.kind, api_err.error.message),
        Err(_) => body.to_string(),
    };
    let message = format!("Anthropic API returned {status} ({detail})");
    match class {
        StatusClass::Transient => ParlaError::provider(message),
        StatusClass::Credentials => ParlaError::Config(message),
        StatusClass::Rejected => ParlaError::Validation(message),
    }
}

fn map_send_error(e: reqwest::Error) -> ParlaError {
    if e.is_timeout() {
        ParlaError::Timeout {
            duration: REQUEST_TIMEOUT,
        }
    } else {
        ParlaError::Provider {
            message: format!("HTTP request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

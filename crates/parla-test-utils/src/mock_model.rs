// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat model adapter for deterministic testing.
//!
//! `MockModel` implements `ChatModelAdapter` with pre-configured responses,
//! enabling fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use parla_core::ParlaError;
use parla_core::traits::adapter::PluginAdapter;
use parla_core::traits::provider::ChatModelAdapter;
use parla_core::types::{AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage};

/// One scripted reply: text, or a provider failure with the given message.
type Scripted = Result<String, String>;

/// A mock chat model that returns pre-configured responses.
///
/// Responses are popped from a FIFO queue. When the queue is empty,
/// a default "mock response" text is returned.
pub struct MockModel {
    responses: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
    calls: AtomicUsize,
}

impl MockModel {
    /// Create a new mock model with an empty response queue.
    pub fn new() -> Self {
        Self::from_script(VecDeque::new())
    }

    /// Create a mock model pre-loaded with the given responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self::from_script(responses.into_iter().map(Ok).collect())
    }

    fn from_script(script: VecDeque<Scripted>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(script)),
            requests: Arc::new(Mutex::new(Vec::new())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Add a response to the end of the queue.
    pub async fn add_response(&self, text: impl Into<String>) {
        self.responses.lock().await.push_back(Ok(text.into()));
    }

    /// Queue a provider failure. It is returned in FIFO order with responses.
    pub async fn add_failure(&self, message: impl Into<String>) {
        self.responses.lock().await.push_back(Err(message.into()));
    }

    /// Number of `complete` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request, if any.
    pub async fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().await.last().cloned()
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockModel {
    fn name(&self) -> &str {
        "mock-model"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ChatModel
    }

    async fn health_check(&self) -> Result<HealthStatus, ParlaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParlaError> {
        Ok(())
    }
}

#[async_trait]
impl ChatModelAdapter for MockModel {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParlaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = request.model.clone().unwrap_or_else(|| "mock-model".to_string());
        self.requests.lock().await.push(request);

        let next = self
            .responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok("mock response".to_string()));

        match next {
            Ok(content) => Ok(ProviderResponse {
                content,
                model,
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 20,
                },
            }),
            Err(message) => Err(ParlaError::provider(message)),
        }
    }
}

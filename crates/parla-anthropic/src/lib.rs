// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Claude chat model adapter for Parla.
//!
//! This crate implements [`ChatModelAdapter`] for the Anthropic Messages API.
//! Chat turns and sentence generation both use single-shot completion.

pub mod client;
pub mod types;

use async_trait::async_trait;
use parla_config::model::AnthropicConfig;
use parla_core::error::ParlaError;
use parla_core::traits::{ChatModelAdapter, PluginAdapter};
use parla_core::types::{AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage};
use tracing::{debug, info};

use crate::client::AnthropicClient;
use crate::types::{ApiMessage, MessageRequest};

/// Substituted for blank message content, which the API rejects.
const BLANK_CONTENT: &str = "...";

/// Anthropic Claude model implementing [`ChatModelAdapter`].
///
/// API key resolution order: config -> `ANTHROPIC_API_KEY` env var -> error.
pub struct AnthropicModel {
    client: AnthropicClient,
    max_tokens: u32,
}

impl AnthropicModel {
    /// Creates a new Anthropic model adapter from the given configuration.
    ///
    /// # API Key Resolution
    /// 1. `config.api_key` if set and non-empty
    /// 2. `ANTHROPIC_API_KEY` environment variable
    /// 3. Returns error if neither is available
    pub fn new(config: &AnthropicConfig) -> Result<Self, ParlaError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = AnthropicClient::new(
            api_key,
            config.api_version.clone(),
            config.default_model.clone(),
        )?;

        info!(model = config.default_model, "Anthropic model initialized");

        Ok(Self {
            client,
            max_tokens: config.max_tokens,
        })
    }

    /// Creates a model with an existing client (for testing).
    #[cfg(test)]
    fn with_client(client: AnthropicClient, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    /// Converts a [`ProviderRequest`] to an Anthropic [`MessageRequest`].
    fn to_message_request(&self, request: &ProviderRequest) -> MessageRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.to_string(),
                content: if m.content.trim().is_empty() {
                    BLANK_CONTENT.to_string()
                } else {
                    m.content.clone()
                },
            })
            .collect();

        let system = Some(request.system_prompt.clone()).filter(|s| !s.trim().is_empty());

        MessageRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.client.default_model().to_string()),
            messages,
            system,
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
        }
    }
}

#[async_trait]
impl PluginAdapter for AnthropicModel {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ChatModel
    }

    async fn health_check(&self) -> Result<HealthStatus, ParlaError> {
        // No API call: health checks must not consume tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParlaError> {
        debug!("Anthropic model shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChatModelAdapter for AnthropicModel {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParlaError> {
        if request.messages.is_empty() {
            return Err(ParlaError::Validation(
                "completion request has no messages".into(),
            ));
        }

        let api_request = self.to_message_request(&request);
        let response = self.client.complete_message(&api_request).await?;
        let content = response.text();

        debug!(
            model = response.model,
            stop_reason = ?response.stop_reason,
            output_tokens = response.usage.output_tokens,
            "completion finished"
        );

        Ok(ProviderResponse {
            content,
            model: response.model,
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        })
    }
}

/// Resolves the API key: config value first, then `ANTHROPIC_API_KEY`.
fn resolve_api_key(config_key: &Option<String>) -> Result<String, ParlaError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
        ParlaError::Config(
            "Anthropic API key not found. Set anthropic.api_key in config or ANTHROPIC_API_KEY environment variable.".into(),
        )
    })
}

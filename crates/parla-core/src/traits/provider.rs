// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Language model adapter trait (Anthropic, mocks).

use async_trait::async_trait;

use crate::error::ParlaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse};

/// Adapter for chat-completion language models.
///
/// Takes a system prompt and ordered message history and returns text.
#[async_trait]
pub trait ChatModelAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParlaError>;
}

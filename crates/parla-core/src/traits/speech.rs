// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Speech synthesis adapter trait.

use async_trait::async_trait;

use crate::error::ParlaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{SpeechRequest, SynthesizedAudio};

/// Adapter for text-to-speech providers.
#[async_trait]
pub trait SpeechAdapter: PluginAdapter {
    /// Synthesizes the request text with the requested voice.
    ///
    /// Failures should be [`ParlaError::Synthesis`] with a stable code.
    async fn synthesize(&self, request: SpeechRequest) -> Result<SynthesizedAudio, ParlaError>;
}

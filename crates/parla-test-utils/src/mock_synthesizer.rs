// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock speech synthesizer with deterministic output and failure injection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use parla_core::ParlaError;
use parla_core::traits::adapter::PluginAdapter;
use parla_core::traits::speech::SpeechAdapter;
use parla_core::types::{AdapterType, HealthStatus, SpeechRequest, SynthesizedAudio};

/// Milliseconds of reported audio per character of input.
const MS_PER_CHAR: u64 = 60;

/// A mock synthesizer producing `audio:{voice}:{text}` bytes.
///
/// Texts registered with [`fail_on`](Self::fail_on) fail with the given code.
pub struct MockSynthesizer {
    failures: Arc<Mutex<HashMap<String, String>>>,
    calls: AtomicUsize,
    report_duration: bool,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: AtomicUsize::new(0),
            report_duration: true,
        }
    }

    /// Do not report a duration with synthesized audio.
    pub fn without_duration(mut self) -> Self {
        self.report_duration = false;
        self
    }

    /// Make synthesis of `text` fail with `code`.
    pub async fn fail_on(&self, text: impl Into<String>, code: impl Into<String>) {
        self.failures.lock().await.insert(text.into(), code.into());
    }

    /// Number of `synthesize` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockSynthesizer {
    fn name(&self) -> &str {
        "mock-synthesizer"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Speech
    }

    async fn health_check(&self) -> Result<HealthStatus, ParlaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParlaError> {
        Ok(())
    }
}

#[async_trait]
impl SpeechAdapter for MockSynthesizer {
    async fn synthesize(&self, request: SpeechRequest) -> Result<SynthesizedAudio, ParlaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(code) = self.failures.lock().await.get(&request.text) {
            return Err(ParlaError::synthesis(
                code.clone(),
                format!("mock synthesis failure for {:?}", request.text),
            ));
        }

        let data = Bytes::from(format!("audio:{}:{}", request.voice_id, request.text));
        let duration_ms = self
            .report_duration
            .then(|| request.text.chars().count() as u64 * MS_PER_CHAR);
        Ok(SynthesizedAudio {
            data,
            content_type: "audio/mpeg".to_string(),
            duration_ms,
        })
    }
}

// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the chat and audio stacks with mock model and
//! synthesizer, a temp SQLite database and an in-memory blob store.

use std::sync::Arc;
use std::time::Duration;

use parla_audio::{
    AudioJobOrchestrator, ObjectBlobStore, SessionAudioAggregator, TtsWorker, UrlSigner,
};
use parla_chat::{ChatService, ChatWorker};
use parla_config::model::{ParlaConfig, StorageConfig};
use parla_core::{ParlaError, StorageAdapter};
use parla_storage::SqliteStorage;

use crate::counting_queue::CountingQueue;
use crate::mock_model::MockModel;
use crate::mock_synthesizer::MockSynthesizer;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
    config: ParlaConfig,
    synthesizer: MockSynthesizer,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = ParlaConfig::default();
        config.worker.poll_interval_ms = 10;
        Self {
            responses: Vec::new(),
            config,
            synthesizer: MockSynthesizer::new(),
        }
    }

    /// Set mock model replies, served in order.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Process chat turns inline instead of through the job queue.
    pub fn sync_chat(mut self) -> Self {
        self.config.chat.async_mode = false;
        self
    }

    /// Use a custom synthesizer (e.g. one without durations).
    pub fn with_synthesizer(mut self, synthesizer: MockSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Adjust any part of the configuration.
    pub fn configure(mut self, f: impl FnOnce(&mut ParlaConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, ParlaError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ParlaError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };

        let storage =
            SqliteStorage::new(config.storage.clone()).with_worker_config(&config.worker);
        storage.initialize().await?;
        let storage = Arc::new(storage);

        let queue = Arc::new(CountingQueue::new(storage.clone()));
        let blob = Arc::new(ObjectBlobStore::in_memory(
            config.audio.public_base_url.clone(),
            UrlSigner::new(b"test-signing-secret")?,
        ));
        let model = Arc::new(MockModel::with_responses(self.responses));
        let synthesizer = Arc::new(self.synthesizer);

        let chat = ChatService::new(
            storage.clone(),
            storage.clone(),
            queue.clone(),
            model.clone(),
            &config,
        );
        let chat_worker = ChatWorker::new(
            storage.clone(),
            storage.clone(),
            queue.clone(),
            model.clone(),
            config.chat.clone(),
            &config.worker,
        );
        let orchestrator = AudioJobOrchestrator::new(
            storage.clone(),
            queue.clone(),
            config.audio.clone(),
            &config.speech.output_format,
        );
        let tts_worker = TtsWorker::new(
            storage.clone(),
            queue.clone(),
            blob.clone(),
            synthesizer.clone(),
            &config.audio,
            &config.worker,
        );
        let aggregator = SessionAudioAggregator::new(
            storage.clone(),
            blob.clone(),
            Duration::from_secs(config.audio.url_ttl_secs),
        );

        Ok(TestHarness {
            model,
            synthesizer,
            storage,
            queue,
            blob,
            chat,
            chat_worker,
            orchestrator,
            tts_worker,
            aggregator,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    pub model: Arc<MockModel>,
    pub synthesizer: Arc<MockSynthesizer>,
    /// SQLite storage (temp DB, cleaned up on drop). Also the queue behind `queue`.
    pub storage: Arc<SqliteStorage>,
    pub queue: Arc<CountingQueue>,
    pub blob: Arc<ObjectBlobStore>,
    pub chat: ChatService,
    pub chat_worker: ChatWorker,
    pub orchestrator: AudioJobOrchestrator,
    pub tts_worker: TtsWorker,
    pub aggregator: SessionAudioAggregator,
    pub config: ParlaConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Add a reply to the mock model's queue.
    pub async fn add_model_response(&self, text: impl Into<String>) {
        self.model.add_response(text).await;
    }

    /// Run the chat worker until its queue is empty. Returns jobs handled.
    pub async fn drain_chat(&self) -> Result<usize, ParlaError> {
        let mut handled = 0;
        while self.chat_worker.run_once().await? {
            handled += 1;
        }
        Ok(handled)
    }

    /// Run the TTS worker until its queue is empty. Returns jobs handled.
    pub async fn drain_tts(&self) -> Result<usize, ParlaError> {
        let mut handled = 0;
        while self.tts_worker.run_once().await? {
            handled += 1;
        }
        Ok(handled)
    }

    /// Recommend sentences for a conversation and stage their audio under
    /// `session_id`. Returns the sentences staged.
    pub async fn stage_recommended(
        &self,
        requester: &str,
        conversation_id: &str,
        session_id: &str,
        count: usize,
    ) -> Result<Vec<parla_core::types::PracticeSentence>, ParlaError> {
        let sentences = self
            .chat
            .recommend_sentences(requester, conversation_id, count)
            .await?;
        self.orchestrator.stage(session_id, &sentences, None).await?;
        tracing::debug!(session_id, count = sentences.len(), "recommended sentences staged");
        Ok(sentences)
    }
}

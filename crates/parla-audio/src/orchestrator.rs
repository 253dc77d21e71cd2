// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stages sentence audio: PENDING records first, then batched synthesis jobs.

use std::sync::Arc;
use std::time::Duration;

use parla_config::model::AudioConfig;
use parla_core::ParlaError;
use parla_core::traits::{QueueAdapter, SentenceAudioStore};
use parla_core::types::{
    AudioStatus, MAX_BATCH_ENTRIES, PracticeSentence, QueueMessage, SentenceAudioRecord,
    now_timestamp, timestamp_after,
};
use tracing::{info, warn};

use crate::cache_key::{audio_extension, storage_key};
use crate::job::TtsJob;

const ENQUEUE_FAILED: &str = "ENQUEUE_FAILED";

pub struct AudioJobOrchestrator {
    records: Arc<dyn SentenceAudioStore>,
    queue: Arc<dyn QueueAdapter>,
    config: AudioConfig,
    extension: &'static str,
}

impl AudioJobOrchestrator {
    /// `output_format` is the synthesizer's format; it picks the object
    /// extension.
    pub fn new(
        records: Arc<dyn SentenceAudioStore>,
        queue: Arc<dyn QueueAdapter>,
        config: AudioConfig,
        output_format: &str,
    ) -> Self {
        Self {
            records,
            queue,
            config,
            extension: audio_extension(output_format),
        }
    }

    /// Entries per enqueue call, never above the transport limit.
    fn batch_size(&self) -> usize {
        self.config.batch_size.clamp(1, MAX_BATCH_ENTRIES)
    }

    /// Stage one synthesis job per sentence. The sentence index is the input
    /// position. Returns the number of jobs enqueued.
    ///
    /// Records exist before any job is sent, so the session can be polled
    /// right away. A session index that already holds a live record is
    /// rejected with [`ParlaError::Validation`] and nothing is written. Chunks already sent are not rolled back when a later one
    /// fails; the affected records are marked FAILED and the call returns
    /// [`ParlaError::PartialEnqueue`].
    pub async fn stage(
        &self,
        session_id: &str,
        sentences: &[PracticeSentence],
        voice: Option<&str>,
    ) -> Result<usize, ParlaError> {
        if session_id.trim().is_empty() {
            return Err(ParlaError::Validation("session ID is required".into()));
        }
        if sentences.is_empty() {
            return Err(ParlaError::Validation("no sentences to stage".into()));
        }
        if let Some(index) = sentences.iter().position(|s| s.english.trim().is_empty()) {
            return Err(ParlaError::Validation(format!("sentence {index} is blank")));
        }
        let voice = voice.unwrap_or(&self.config.default_voice);
        if voice.is_empty() || voice.contains('/') {
            return Err(ParlaError::Validation(format!("invalid voice ID '{voice}'")));
        }

        let now = now_timestamp();
        let expires_at = timestamp_after(Duration::from_secs(self.config.record_ttl_secs));
        let mut records = Vec::with_capacity(sentences.len());
        let mut messages = Vec::with_capacity(sentences.len());
        for (index, sentence) in sentences.iter().enumerate() {
            let index = u32::try_from(index)
                .map_err(|_| ParlaError::Validation("too many sentences".into()))?;
            let key = storage_key(
                &self.config.key_prefix,
                &sentence.english,
                voice,
                self.extension,
            );
            let job = TtsJob {
                job_id: uuid::Uuid::new_v4().to_string(),
                text: sentence.english.clone(),
                voice_id: voice.to_string(),
                storage_key: key.clone(),
                session_id: Some(session_id.to_string()),
                sentence_index: Some(index),
                track_duration: self.config.track_duration,
            };
            messages.push(QueueMessage::new(job.to_payload()?));
            records.push(SentenceAudioRecord {
                session_id: session_id.to_string(),
                sentence_index: index,
                english: sentence.english.clone(),
                korean: sentence.korean.clone(),
                voice_id: voice.to_string(),
                status: AudioStatus::Pending,
                storage_key: key,
                duration_ms: None,
                error_code: None,
                error_message: None,
                created_at: now.clone(),
                updated_at: now.clone(),
                expires_at: expires_at.clone(),
            });
        }
        self.records.create_records(&records).await?;

        let total = messages.len();
        let batch_size = self.batch_size();
        let mut enqueued = 0;
        let mut failed: Vec<(u32, String)> = Vec::new();
        let mut pending = messages.into_iter().enumerate().peekable();
        while pending.peek().is_some() {
            let (offsets, chunk): (Vec<usize>, Vec<QueueMessage>) =
                pending.by_ref().take(batch_size).unzip();
            match self.queue.enqueue_batch(&self.config.queue_name, chunk).await {
                Ok(outcome) => {
                    enqueued += outcome.enqueued.len();
                    for failure in outcome.failed {
                        if let Some(&offset) = offsets.get(failure.position) {
                            failed.push((offset as u32, failure.message));
                        }
                    }
                }
                Err(e) => {
                    warn!(session_id, error = %e, "enqueue batch call failed");
                    let message = e.to_string();
                    failed.extend(offsets.iter().map(|&o| (o as u32, message.clone())));
                }
            }
        }

        #[cfg(feature = "prometheus")]
        parla_prometheus::record_enqueue_batch(failed.len());

        if failed.is_empty() {
            info!(session_id, jobs = total, voice, "sentence audio staged");
            return Ok(enqueued);
        }

        for (index, message) in &failed {
            let Some(record) = records.get(*index as usize) else {
                continue;
            };
            self.records
                .fail_record(session_id, *index, &record.storage_key, ENQUEUE_FAILED, message)
                .await?;
        }
        warn!(
            session_id,
            failed = failed.len(),
            total,
            "some sentence audio jobs could not be enqueued"
        );
        Err(ParlaError::PartialEnqueue {
            failed: failed.len(),
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parla_config::model::{StorageConfig, WorkerConfig};
    use parla_core::StorageAdapter;
    use parla_storage::SqliteStorage;
    use parla_test_utils::CountingQueue;
    use tempfile::TempDir;

    struct Fixture {
        storage: Arc<SqliteStorage>,
        queue: Arc<CountingQueue>,
        orchestrator: AudioJobOrchestrator,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("stage.db").to_string_lossy().into_owned(),
            wal_mode: true,
        })
        .with_worker_config(&WorkerConfig::default());
        storage.initialize().await.unwrap();
        let storage = Arc::new(storage);
        let queue = Arc::new(CountingQueue::new(storage.clone()));
        let orchestrator = AudioJobOrchestrator::new(
            storage.clone(),
            queue.clone(),
            AudioConfig::default(),
            "mp3_44100_128",
        );
        Fixture {
            storage,
            queue,
            orchestrator,
            _dir: dir,
        }
    }

    fn sentences(n: usize) -> Vec<PracticeSentence> {
        (0..n)
            .map(|i| PracticeSentence::new(format!("Practice sentence {i}.")))
            .collect()
    }

    #[tokio::test]
    async fn chunks_into_batches_of_ten() {
        let f = fixture().await;
        let staged = f.orchestrator.stage("S1", &sentences(25), None).await.unwrap();
        assert_eq!(staged, 25);
        assert_eq!(f.queue.batch_sizes().await, vec![10, 10, 5]);

        let records = f.storage.list_records("S1").await.unwrap();
        assert_eq!(records.len(), 25);
        assert!(records.iter().all(|r| r.status == AudioStatus::Pending));
        assert_eq!(records[7].english, "Practice sentence 7.");
        assert!(records[0].storage_key.starts_with("tts/"));
        assert!(records[0].storage_key.ends_with(".mp3"));
    }

    #[tokio::test]
    async fn object_extension_follows_output_format() {
        let f = fixture().await;
        let orchestrator = AudioJobOrchestrator::new(
            f.storage.clone(),
            f.queue.clone(),
            AudioConfig::default(),
            "pcm_16000",
        );
        orchestrator.stage("S2", &sentences(1), None).await.unwrap();
        let record = f.storage.get_record("S2", 0).await.unwrap().unwrap();
        assert!(record.storage_key.ends_with(".pcm"));
    }

    #[tokio::test]
    async fn staging_a_session_twice_is_rejected_without_side_effects() {
        let f = fixture().await;
        f.orchestrator.stage("S1", &sentences(2), None).await.unwrap();
        let before = f.storage.list_records("S1").await.unwrap();

        let replacement = vec![PracticeSentence::new("Something else entirely.")];
        let err = f
            .orchestrator
            .stage("S1", &replacement, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ParlaError::Validation(_)));
        assert_eq!(f.queue.batch_sizes().await, vec![2]);
        assert_eq!(f.storage.list_records("S1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn records_exist_in_input_order_with_job_keys() {
        let f = fixture().await;
        f.orchestrator
            .stage("S1", &sentences(3), Some("rachel"))
            .await
            .unwrap();

        let records = f.storage.list_records("S1").await.unwrap();
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.sentence_index, i as u32);
            assert_eq!(record.voice_id, "rachel");
        }
        let entry = f.storage.dequeue("tts-jobs").await.unwrap().unwrap();
        let job = TtsJob::from_payload(&entry.payload).unwrap();
        let record = &records[job.sentence_index.unwrap() as usize];
        assert_eq!(job.storage_key, record.storage_key);
        assert_eq!(job.session_id.as_deref(), Some("S1"));
    }

    #[tokio::test]
    async fn failed_chunk_is_surfaced_and_marks_records() {
        let f = fixture().await;
        f.queue.fail_batch_call(1).await;

        let err = f.orchestrator.stage("S1", &sentences(15), None).await.unwrap_err();
        assert!(matches!(err, ParlaError::PartialEnqueue { failed: 5, total: 15 }));

        let records = f.storage.list_records("S1").await.unwrap();
        let failed: Vec<u32> = records
            .iter()
            .filter(|r| r.status == AudioStatus::Failed)
            .map(|r| r.sentence_index)
            .collect();
        assert_eq!(failed, (10..15).collect::<Vec<u32>>());
        assert_eq!(records[12].error_code.as_deref(), Some(ENQUEUE_FAILED));
        // The first chunk stays sent.
        assert_eq!(records[0].status, AudioStatus::Pending);
    }

    #[tokio::test]
    async fn refused_entry_maps_back_to_its_sentence() {
        let f = fixture().await;
        f.queue.refuse_payloads_containing("sentence 3.").await;

        let err = f.orchestrator.stage("S1", &sentences(4), None).await.unwrap_err();
        assert!(matches!(err, ParlaError::PartialEnqueue { failed: 1, total: 4 }));
        let record = f.storage.get_record("S1", 3).await.unwrap().unwrap();
        assert_eq!(record.status, AudioStatus::Failed);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_write() {
        let f = fixture().await;
        for (session, batch, voice) in [
            ("", sentences(1), None),
            ("S1", Vec::new(), None),
            ("S1", vec![PracticeSentence::new("  ")], None),
            ("S1", sentences(1), Some("a/b")),
        ] {
            let err = f.orchestrator.stage(session, &batch, voice).await.unwrap_err();
            assert!(matches!(err, ParlaError::Validation(_)));
        }
        assert!(f.queue.batch_sizes().await.is_empty());
        assert!(f.storage.list_records("S1").await.unwrap().is_empty());
    }
}

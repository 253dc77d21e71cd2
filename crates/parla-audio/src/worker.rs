// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TTS worker: cache lookup, synthesis on miss, record finalization.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parla_config::model::{AudioConfig, WorkerConfig};
use parla_core::ParlaError;
use parla_core::traits::{BlobAdapter, QueueAdapter, SentenceAudioStore, SpeechAdapter};
use parla_core::types::{QueueEntry, SpeechRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::duration::wav_duration_ms;
use crate::job::TtsJob;

/// Result of one synthesis job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsJobOutcome {
    pub storage_key: String,
    /// The object already existed and no synthesis call was made.
    pub cache_hit: bool,
    pub duration_ms: Option<u64>,
}

pub struct TtsWorker {
    records: Arc<dyn SentenceAudioStore>,
    queue: Arc<dyn QueueAdapter>,
    blob: Arc<dyn BlobAdapter>,
    speech: Arc<dyn SpeechAdapter>,
    queue_name: String,
    poll_interval: Duration,
}

impl TtsWorker {
    pub fn new(
        records: Arc<dyn SentenceAudioStore>,
        queue: Arc<dyn QueueAdapter>,
        blob: Arc<dyn BlobAdapter>,
        speech: Arc<dyn SpeechAdapter>,
        audio: &AudioConfig,
        worker: &WorkerConfig,
    ) -> Self {
        Self {
            records,
            queue,
            blob,
            speech,
            queue_name: audio.queue_name.clone(),
            poll_interval: Duration::from_millis(worker.poll_interval_ms),
        }
    }

    /// Make sure audio exists at the job's storage key, then mark the record
    /// COMPLETED.
    ///
    /// Identical text and voice always share a key, so an existing object is
    /// reused as is. Concurrent misses on one key both upload the same bytes.
    pub async fn process(&self, job: &TtsJob) -> Result<TtsJobOutcome, ParlaError> {
        let key = job.storage_key.as_str();
        let cache_hit = self.blob.exists(key).await?;
        #[cfg(feature = "prometheus")]
        parla_prometheus::record_cache_lookup(cache_hit);

        let duration_ms = if cache_hit {
            debug!(storage_key = key, "audio cache hit");
            if job.track_duration {
                self.stored_duration(key).await?
            } else {
                None
            }
        } else {
            let started = Instant::now();
            let audio = self
                .speech
                .synthesize(SpeechRequest {
                    text: job.text.clone(),
                    voice_id: job.voice_id.clone(),
                })
                .await?;
            #[cfg(feature = "prometheus")]
            parla_prometheus::record_synthesis_latency(started.elapsed().as_secs_f64());
            debug!(
                storage_key = key,
                bytes = audio.data.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "audio synthesized"
            );
            let duration_ms = if job.track_duration {
                audio.duration_ms.or_else(|| wav_duration_ms(&audio.data))
            } else {
                None
            };
            self.blob.put(key, audio.data, &audio.content_type).await?;
            duration_ms
        };

        if let Some((session_id, index)) = job.record_key()
            && !self
                .records
                .complete_record(session_id, index, key, duration_ms)
                .await?
        {
            warn!(session_id, index, "no pending sentence record under this key");
        }

        Ok(TtsJobOutcome {
            storage_key: key.to_string(),
            cache_hit,
            duration_ms,
        })
    }

    async fn stored_duration(&self, key: &str) -> Result<Option<u64>, ParlaError> {
        Ok(self
            .blob
            .get(key)
            .await?
            .and_then(|data| wav_duration_ms(&data)))
    }

    /// Handle one queue delivery.
    ///
    /// Same settlement rules as chat jobs: transient failures with attempts
    /// left are redelivered with the record still PENDING, anything else
    /// records FAILED with the error code.
    pub async fn handle(&self, entry: &QueueEntry) -> Result<(), ParlaError> {
        let job = match TtsJob::from_payload(&entry.payload) {
            Ok(job) => job,
            Err(e) => {
                error!(entry_id = entry.id, error = %e, "dropping undecodable tts job");
                return self.queue.ack(entry.id).await;
            }
        };

        match self.process(&job).await {
            Ok(outcome) => {
                #[cfg(feature = "prometheus")]
                parla_prometheus::record_tts_job(if outcome.cache_hit {
                    "cache_hit"
                } else {
                    "synthesized"
                });
                info!(
                    job_id = job.job_id.as_str(),
                    storage_key = outcome.storage_key.as_str(),
                    cache_hit = outcome.cache_hit,
                    "tts job completed"
                );
                self.queue.ack(entry.id).await
            }
            Err(e) if e.is_retryable() && entry.attempts < entry.max_attempts => {
                warn!(
                    job_id = job.job_id.as_str(),
                    attempt = entry.attempts,
                    max_attempts = entry.max_attempts,
                    error = %e,
                    "tts job failed, will be redelivered"
                );
                self.queue.fail(entry.id).await
            }
            Err(e) => {
                let code = e.code();
                error!(
                    job_id = job.job_id.as_str(),
                    code = code.as_str(),
                    error = %e,
                    "tts job failed"
                );
                if let Some((session_id, index)) = job.record_key() {
                    let message = e.to_string();
                    self.records
                        .fail_record(session_id, index, &job.storage_key, &code, &message)
                        .await?;
                }
                #[cfg(feature = "prometheus")]
                parla_prometheus::record_tts_job("failed");
                if e.is_retryable() {
                    self.queue.fail(entry.id).await
                } else {
                    self.queue.ack(entry.id).await
                }
            }
        }
    }

    /// Dequeue and handle at most one job. Returns whether a job was found.
    pub async fn run_once(&self) -> Result<bool, ParlaError> {
        match self.queue.dequeue(&self.queue_name).await? {
            Some(entry) => {
                self.handle(&entry).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Poll the TTS queue until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ParlaError> {
        info!(queue = self.queue_name.as_str(), "tts worker running");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let idle = match self.run_once().await {
                Ok(found) => !found,
                Err(e) => {
                    error!(error = %e, "tts worker iteration failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }
        info!("tts worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{ObjectBlobStore, UrlSigner};
    use crate::duration::silent_wav;
    use crate::orchestrator::AudioJobOrchestrator;
    use bytes::Bytes;
    use parla_config::model::StorageConfig;
    use parla_core::StorageAdapter;
    use parla_core::types::{AudioStatus, PracticeSentence};
    use parla_storage::SqliteStorage;
    use parla_test_utils::MockSynthesizer;
    use tempfile::TempDir;

    struct Fixture {
        storage: Arc<SqliteStorage>,
        blob: Arc<ObjectBlobStore>,
        synth: Arc<MockSynthesizer>,
        orchestrator: AudioJobOrchestrator,
        worker: TtsWorker,
        _dir: TempDir,
    }

    async fn fixture_with(synth: MockSynthesizer, max_attempts: u32) -> Fixture {
        let dir = TempDir::new().unwrap();
        let worker_config = WorkerConfig {
            max_attempts,
            poll_interval_ms: 10,
            ..WorkerConfig::default()
        };
        let storage = SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("tts.db").to_string_lossy().into_owned(),
            wal_mode: true,
        })
        .with_worker_config(&worker_config);
        storage.initialize().await.unwrap();
        let storage = Arc::new(storage);
        let blob = Arc::new(ObjectBlobStore::in_memory(
            "http://localhost/audio",
            UrlSigner::new(b"k").unwrap(),
        ));
        let synth = Arc::new(synth);
        let audio = AudioConfig::default();
        let orchestrator = AudioJobOrchestrator::new(
            storage.clone(),
            storage.clone(),
            audio.clone(),
            "mp3_44100_128",
        );
        let worker = TtsWorker::new(
            storage.clone(),
            storage.clone(),
            blob.clone(),
            synth.clone(),
            &audio,
            &worker_config,
        );
        Fixture {
            storage,
            blob,
            synth,
            orchestrator,
            worker,
            _dir: dir,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(MockSynthesizer::new(), 3).await
    }

    async fn drain(f: &Fixture) {
        while f.worker.run_once().await.unwrap() {}
    }

    #[tokio::test]
    async fn miss_synthesizes_and_completes_record() {
        let f = fixture().await;
        f.orchestrator
            .stage("S1", &[PracticeSentence::new("Hello.")], None)
            .await
            .unwrap();
        drain(&f).await;

        let record = f.storage.get_record("S1", 0).await.unwrap().unwrap();
        assert_eq!(record.status, AudioStatus::Completed);
        assert_eq!(record.duration_ms, Some(360));
        assert!(f.blob.exists(&record.storage_key).await.unwrap());
        assert_eq!(f.synth.calls(), 1);
    }

    #[tokio::test]
    async fn shared_key_across_sessions_synthesizes_once() {
        let f = fixture().await;
        let sentence = [PracticeSentence::new("Could I get a latte?")];
        f.orchestrator.stage("S1", &sentence, Some("rachel")).await.unwrap();
        f.orchestrator.stage("S2", &sentence, Some("rachel")).await.unwrap();
        drain(&f).await;

        let a = f.storage.get_record("S1", 0).await.unwrap().unwrap();
        let b = f.storage.get_record("S2", 0).await.unwrap().unwrap();
        assert_eq!(a.status, AudioStatus::Completed);
        assert_eq!(b.status, AudioStatus::Completed);
        assert_eq!(a.storage_key, b.storage_key);
        assert_eq!(f.synth.calls(), 1);
    }

    #[tokio::test]
    async fn cache_hit_reads_wav_duration_from_stored_object() {
        let f = fixture().await;
        let job = TtsJob {
            job_id: "j1".into(),
            text: "Hi.".into(),
            voice_id: "v".into(),
            storage_key: "tts/v/cached.mp3".into(),
            session_id: None,
            sentence_index: None,
            track_duration: true,
        };
        f.blob
            .put(&job.storage_key, Bytes::from(silent_wav(800, 8_000, 1)), "audio/wav")
            .await
            .unwrap();

        let outcome = f.worker.process(&job).await.unwrap();
        assert!(outcome.cache_hit);
        assert_eq!(outcome.duration_ms, Some(800));
        assert_eq!(f.synth.calls(), 0);
    }

    #[tokio::test]
    async fn one_failed_sentence_leaves_siblings_alone() {
        let f = fixture().await;
        f.synth.fail_on("Bad one.", "VOICE_NOT_FOUND").await;
        let batch = [
            PracticeSentence::new("Good one."),
            PracticeSentence::new("Bad one."),
            PracticeSentence::new("Another good one."),
        ];
        f.orchestrator.stage("S1", &batch, None).await.unwrap();
        drain(&f).await;

        let records = f.storage.list_records("S1").await.unwrap();
        assert_eq!(records[0].status, AudioStatus::Completed);
        assert_eq!(records[1].status, AudioStatus::Failed);
        assert_eq!(records[1].error_code.as_deref(), Some("VOICE_NOT_FOUND"));
        assert!(records[1].error_message.is_some());
        assert_eq!(records[2].status, AudioStatus::Completed);
        // Rejected requests are not retried.
        assert_eq!(f.synth.calls(), 3);
    }

    #[tokio::test]
    async fn transient_failure_retries_until_dead_letter() {
        let f = fixture_with(MockSynthesizer::new(), 2).await;
        f.synth.fail_on("Flaky.", "PROVIDER_UNAVAILABLE").await;
        f.orchestrator
            .stage("S1", &[PracticeSentence::new("Flaky.")], None)
            .await
            .unwrap();

        assert!(f.worker.run_once().await.unwrap());
        let record = f.storage.get_record("S1", 0).await.unwrap().unwrap();
        assert_eq!(record.status, AudioStatus::Pending);

        assert!(f.worker.run_once().await.unwrap());
        let record = f.storage.get_record("S1", 0).await.unwrap().unwrap();
        assert_eq!(record.status, AudioStatus::Failed);
        assert_eq!(record.error_code.as_deref(), Some("PROVIDER_UNAVAILABLE"));
        assert_eq!(f.storage.dead_letters("tts-jobs").await.unwrap().len(), 1);
        assert_eq!(f.synth.calls(), 2);
    }

    #[tokio::test]
    async fn untracked_duration_is_left_empty() {
        let f = fixture_with(MockSynthesizer::new().without_duration(), 3).await;
        f.orchestrator
            .stage("S1", &[PracticeSentence::new("No clock.")], None)
            .await
            .unwrap();
        drain(&f).await;
        let record = f.storage.get_record("S1", 0).await.unwrap().unwrap();
        assert_eq!(record.status, AudioStatus::Completed);
        assert!(record.duration_ms.is_none());
    }

    #[tokio::test]
    async fn undecodable_payload_is_dropped() {
        let f = fixture().await;
        f.storage
            .enqueue("tts-jobs", parla_core::types::QueueMessage::new("not json"))
            .await
            .unwrap();
        assert!(f.worker.run_once().await.unwrap());
        assert!(!f.worker.run_once().await.unwrap());
        assert_eq!(f.synth.calls(), 0);
    }
}

// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the store and queue traits.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use parla_config::model::{StorageConfig, WorkerConfig};
use parla_core::types::{
    BatchOutcome, ChatJobRecord, Conversation, Message, QueueEntry, QueueMessage, Role,
    SentenceAudioRecord, TaggedAppend, TaggedMessage,
};
use parla_core::{
    AdapterType, ConversationStore, HealthStatus, JobStatusStore, ParlaError, PluginAdapter,
    QueueAdapter, SentenceAudioStore, StorageAdapter,
};

use crate::database::Database;
use crate::models::PurgeReport;
use crate::queries;
use crate::queries::queue::QueueSettings;

/// SQLite-backed storage adapter.
///
/// One instance serves conversations, job status, sentence audio records and
/// the durable queue, all through a single [`Database`] writer. The database
/// is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    queue_settings: QueueSettings,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            queue_settings: QueueSettings::default(),
            db: OnceCell::new(),
        }
    }

    /// Apply the worker's lock timeout and attempt limit to queue operations.
    pub fn with_worker_config(mut self, worker: &WorkerConfig) -> Self {
        self.queue_settings = QueueSettings {
            lock_timeout_secs: worker.lock_timeout_secs,
            max_attempts: worker.max_attempts,
        };
        self
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, ParlaError> {
        self.db.get().ok_or_else(|| ParlaError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    /// Delete expired rows and completed queue entries older than `queue_retention_secs`.
    pub async fn purge_expired(&self, queue_retention_secs: u64) -> Result<PurgeReport, ParlaError> {
        let report = queries::maintenance::purge_expired(self.db()?, queue_retention_secs).await?;
        if report.total() > 0 {
            debug!(
                conversations = report.conversations,
                jobs = report.jobs,
                sentence_records = report.sentence_records,
                queue_entries = report.queue_entries,
                "expired rows purged"
            );
        }
        Ok(report)
    }

    /// Entries of `queue_name` that exhausted their delivery attempts.
    pub async fn dead_letters(&self, queue_name: &str) -> Result<Vec<QueueEntry>, ParlaError> {
        queries::queue::dead_letters(self.db()?, queue_name).await
    }

    /// Move a live conversation's expiry. Returns `false` if it is absent or expired.
    pub async fn set_conversation_expiry(
        &self,
        id: &str,
        expires_at: &str,
    ) -> Result<bool, ParlaError> {
        queries::conversations::set_expiry(self.db()?, id, expires_at).await
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParlaError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| conn.execute_batch("SELECT 1;"))
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParlaError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ParlaError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ParlaError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ParlaError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStorage {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), ParlaError> {
        queries::conversations::create_conversation(self.db()?, conversation).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ParlaError> {
        queries::conversations::get_conversation(self.db()?, id).await
    }

    async fn append_message(
        &self,
        id: &str,
        message: &Message,
        expires_at: &str,
    ) -> Result<usize, ParlaError> {
        queries::conversations::append_message(self.db()?, id, message, expires_at).await
    }

    async fn append_message_at(
        &self,
        id: &str,
        message: &Message,
        expected_count: usize,
        expires_at: &str,
    ) -> Result<Option<usize>, ParlaError> {
        queries::conversations::append_message_at(
            self.db()?,
            id,
            message,
            expected_count,
            expires_at,
        )
        .await
    }

    async fn append_tagged(
        &self,
        id: &str,
        message: &Message,
        request_id: &str,
        limit: usize,
        expires_at: &str,
    ) -> Result<TaggedAppend, ParlaError> {
        queries::conversations::append_tagged(self.db()?, id, message, request_id, limit, expires_at)
            .await
    }

    async fn find_tagged(
        &self,
        id: &str,
        role: Role,
        request_id: &str,
    ) -> Result<Option<TaggedMessage>, ParlaError> {
        queries::conversations::find_tagged(self.db()?, id, role, request_id).await
    }
}

#[async_trait]
impl JobStatusStore for SqliteStorage {
    async fn create_job(&self, job: &ChatJobRecord) -> Result<bool, ParlaError> {
        queries::jobs::create_job(self.db()?, job).await
    }

    async fn get_job(&self, request_id: &str) -> Result<Option<ChatJobRecord>, ParlaError> {
        queries::jobs::get_job(self.db()?, request_id).await
    }

    async fn complete_job(
        &self,
        request_id: &str,
        ai_response: &str,
        turn_count: u32,
    ) -> Result<bool, ParlaError> {
        queries::jobs::complete_job(self.db()?, request_id, ai_response, turn_count).await
    }

    async fn fail_job(&self, request_id: &str, error: &str) -> Result<bool, ParlaError> {
        queries::jobs::fail_job(self.db()?, request_id, error).await
    }
}

#[async_trait]
impl SentenceAudioStore for SqliteStorage {
    async fn create_records(&self, records: &[SentenceAudioRecord]) -> Result<(), ParlaError> {
        queries::sentence_audio::create_records(self.db()?, records).await
    }

    async fn list_records(
        &self,
        session_id: &str,
    ) -> Result<Vec<SentenceAudioRecord>, ParlaError> {
        queries::sentence_audio::list_records(self.db()?, session_id).await
    }

    async fn get_record(
        &self,
        session_id: &str,
        sentence_index: u32,
    ) -> Result<Option<SentenceAudioRecord>, ParlaError> {
        queries::sentence_audio::get_record(self.db()?, session_id, sentence_index).await
    }

    async fn complete_record(
        &self,
        session_id: &str,
        sentence_index: u32,
        storage_key: &str,
        duration_ms: Option<u64>,
    ) -> Result<bool, ParlaError> {
        queries::sentence_audio::complete_record(
            self.db()?,
            session_id,
            sentence_index,
            storage_key,
            duration_ms,
        )
        .await
    }

    async fn fail_record(
        &self,
        session_id: &str,
        sentence_index: u32,
        storage_key: &str,
        error_code: &str,
        error_message: &str,
    ) -> Result<bool, ParlaError> {
        queries::sentence_audio::fail_record(
            self.db()?,
            session_id,
            sentence_index,
            storage_key,
            error_code,
            error_message,
        )
        .await
    }
}

#[async_trait]
impl QueueAdapter for SqliteStorage {
    async fn enqueue(&self, queue_name: &str, message: QueueMessage) -> Result<i64, ParlaError> {
        queries::queue::enqueue(self.db()?, self.queue_settings, queue_name, message).await
    }

    async fn enqueue_batch(
        &self,
        queue_name: &str,
        messages: Vec<QueueMessage>,
    ) -> Result<BatchOutcome, ParlaError> {
        queries::queue::enqueue_batch(self.db()?, self.queue_settings, queue_name, messages).await
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, ParlaError> {
        queries::queue::dequeue(self.db()?, self.queue_settings, queue_name).await
    }

    async fn ack(&self, id: i64) -> Result<(), ParlaError> {
        queries::queue::ack(self.db()?, id).await
    }

    async fn fail(&self, id: i64) -> Result<(), ParlaError> {
        queries::queue::fail(self.db()?, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parla_core::types::{now_timestamp, timestamp_after};
    use std::time::Duration;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    async fn initialized(dir: &tempfile::TempDir, name: &str) -> SqliteStorage {
        let db_path = dir.path().join(name);
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let storage = initialized(&dir, "double_init.db").await;
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn health_check_tracks_initialization() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        assert!(storage.health_check().await.is_err());

        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn conversation_and_job_through_adapter() {
        let dir = tempdir().unwrap();
        let storage = initialized(&dir, "lifecycle.db").await;
        let expires = timestamp_after(Duration::from_secs(600));

        storage
            .create_conversation(&Conversation {
                id: "c1".into(),
                owner: "s@example.com".into(),
                topic: "cafe".into(),
                difficulty: "beginner".into(),
                scenario: "Ordering coffee".into(),
                persona: "a barista".into(),
                messages: vec![],
                created_at: now_timestamp(),
                expires_at: expires.clone(),
            })
            .await
            .unwrap();
        let count = storage
            .append_message("c1", &Message::user("One latte, please."), &expires)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let now = now_timestamp();
        let created = storage
            .create_job(&ChatJobRecord {
                request_id: "R1".into(),
                conversation_id: "c1".into(),
                student_email: "s@example.com".into(),
                status: parla_core::JobStatus::Processing,
                ai_response: None,
                turn_count: None,
                error: None,
                created_at: now.clone(),
                updated_at: now,
                expires_at: expires,
            })
            .await
            .unwrap();
        assert!(created);
        assert!(storage.complete_job("R1", "Coming right up!", 2).await.unwrap());
        let job = storage.get_job("R1").await.unwrap().unwrap();
        assert_eq!(job.turn_count, Some(2));

        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn queue_operations_use_worker_settings() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("queue_adapter.db");
        let worker = WorkerConfig {
            poll_interval_ms: 10,
            lock_timeout_secs: 60,
            max_attempts: 1,
        };
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()))
            .with_worker_config(&worker);
        storage.initialize().await.unwrap();

        let id = storage
            .enqueue("tts-jobs", QueueMessage::new(r#"{"text":"hi"}"#))
            .await
            .unwrap();
        let entry = storage.dequeue("tts-jobs").await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.max_attempts, 1);

        storage.fail(entry.id).await.unwrap();
        let dead = storage.dead_letters("tts-jobs").await.unwrap();
        assert_eq!(dead.len(), 1);

        storage.shutdown().await.unwrap();
    }
}

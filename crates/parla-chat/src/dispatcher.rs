// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat job dispatch: status row first, then the queue message.

use std::sync::Arc;
use std::time::Duration;

use parla_config::model::ChatConfig;
use parla_core::ParlaError;
use parla_core::traits::{JobStatusStore, QueueAdapter};
use parla_core::types::{
    ChatJobRecord, JobStatus, Message, QueueMessage, now_timestamp, timestamp_after,
};
use tracing::{debug, error, info};

use crate::job::ChatJobMessage;

/// Creates PROCESSING job rows and enqueues chat jobs.
///
/// Jobs are grouped by conversation ID, so a conversation's jobs are delivered
/// in submission order, and deduplicated by request ID.
pub struct ChatJobDispatcher {
    jobs: Arc<dyn JobStatusStore>,
    queue: Arc<dyn QueueAdapter>,
    queue_name: String,
    job_ttl: Duration,
}

impl ChatJobDispatcher {
    pub fn new(
        jobs: Arc<dyn JobStatusStore>,
        queue: Arc<dyn QueueAdapter>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            jobs,
            queue,
            queue_name: config.queue_name.clone(),
            job_ttl: Duration::from_secs(config.job_ttl_secs),
        }
    }

    /// Submit under a freshly generated request ID.
    pub async fn submit(
        &self,
        conversation_id: &str,
        student_email: &str,
        messages: Vec<Message>,
        system_prompt: String,
    ) -> Result<String, ParlaError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.submit_with_id(&request_id, conversation_id, student_email, messages, system_prompt)
            .await
    }

    /// Submit under a caller-supplied request ID.
    ///
    /// Resubmitting an ID is a no-op: the existing status row is kept and the
    /// queue drops the duplicate message.
    pub async fn submit_with_id(
        &self,
        request_id: &str,
        conversation_id: &str,
        student_email: &str,
        messages: Vec<Message>,
        system_prompt: String,
    ) -> Result<String, ParlaError> {
        if request_id.trim().is_empty() {
            return Err(ParlaError::Validation("request ID must not be empty".into()));
        }
        if conversation_id.trim().is_empty() {
            return Err(ParlaError::Validation("conversation ID must not be empty".into()));
        }
        if messages.is_empty() {
            return Err(ParlaError::Validation("chat job carries no messages".into()));
        }

        let now = now_timestamp();
        let created = self
            .jobs
            .create_job(&ChatJobRecord {
                request_id: request_id.to_string(),
                conversation_id: conversation_id.to_string(),
                student_email: student_email.to_string(),
                status: JobStatus::Processing,
                ai_response: None,
                turn_count: None,
                error: None,
                created_at: now.clone(),
                updated_at: now,
                expires_at: timestamp_after(self.job_ttl),
            })
            .await?;
        if !created {
            debug!(request_id, "job already exists, resubmission is a no-op");
        }

        let payload = ChatJobMessage {
            request_id: request_id.to_string(),
            conversation_id: conversation_id.to_string(),
            student_email: student_email.to_string(),
            system_prompt,
            messages,
        }
        .to_payload()?;
        let message = QueueMessage::new(payload)
            .with_group(conversation_id)
            .with_dedup_id(request_id);

        match self.queue.enqueue(&self.queue_name, message).await {
            Ok(entry_id) => {
                info!(request_id, conversation_id, entry_id, "chat job submitted");
                Ok(request_id.to_string())
            }
            Err(e) => {
                error!(request_id, error = %e, "chat job enqueue failed");
                // Without a queued message the row would stay PROCESSING forever.
                if created {
                    self.jobs
                        .fail_job(request_id, &format!("could not enqueue job: {e}"))
                        .await?;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parla_config::model::{StorageConfig, WorkerConfig};
    use parla_core::StorageAdapter;
    use parla_storage::SqliteStorage;
    use tempfile::TempDir;

    async fn storage() -> (Arc<SqliteStorage>, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("dispatch.db").to_string_lossy().into_owned(),
            wal_mode: true,
        })
        .with_worker_config(&WorkerConfig::default());
        storage.initialize().await.unwrap();
        (Arc::new(storage), dir)
    }

    fn dispatcher(storage: &Arc<SqliteStorage>) -> ChatJobDispatcher {
        ChatJobDispatcher::new(storage.clone(), storage.clone(), &ChatConfig::default())
    }

    #[tokio::test]
    async fn submit_creates_processing_job_and_queue_entry() {
        let (storage, _dir) = storage().await;
        let request_id = dispatcher(&storage)
            .submit("c1", "s@example.com", vec![Message::user("Hi")], "prompt".into())
            .await
            .unwrap();

        let job = storage.get_job(&request_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.conversation_id, "c1");

        let entry = storage.dequeue("chat-jobs").await.unwrap().unwrap();
        assert_eq!(entry.group_key.as_deref(), Some("c1"));
        assert_eq!(entry.dedup_id.as_deref(), Some(request_id.as_str()));
        let decoded = ChatJobMessage::from_payload(&entry.payload).unwrap();
        assert_eq!(decoded.request_id, request_id);
    }

    #[tokio::test]
    async fn resubmission_with_same_id_is_a_no_op() {
        let (storage, _dir) = storage().await;
        let d = dispatcher(&storage);
        for _ in 0..2 {
            d.submit_with_id("R1", "c1", "s@example.com", vec![Message::user("Hi")], "p".into())
                .await
                .unwrap();
        }
        assert!(storage.dequeue("chat-jobs").await.unwrap().is_some());
        assert!(storage.dequeue("chat-jobs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_submissions_create_nothing() {
        let (storage, _dir) = storage().await;
        let d = dispatcher(&storage);
        let err = d
            .submit_with_id(" ", "c1", "s@example.com", vec![Message::user("Hi")], "p".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ParlaError::Validation(_)));
        let err = d
            .submit_with_id("R2", "c1", "s@example.com", vec![], "p".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ParlaError::Validation(_)));
        assert!(storage.get_job("R2").await.unwrap().is_none());
        assert!(storage.dequeue("chat-jobs").await.unwrap().is_none());
    }
}

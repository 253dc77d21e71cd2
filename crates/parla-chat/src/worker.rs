// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat worker: drains the chat queue, calls the model and finalizes jobs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parla_config::model::{ChatConfig, WorkerConfig};
use parla_core::ParlaError;
use parla_core::traits::{ChatModelAdapter, ConversationStore, JobStatusStore, QueueAdapter};
use parla_core::types::{Message, ProviderRequest, QueueEntry, Role, TaggedAppend};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::job::ChatJobMessage;
use crate::ttl::conversation_expiry;

/// What processing one chat job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatJobOutcome {
    /// Reply appended and job marked COMPLETED.
    Completed { ai_response: String, turn_count: u32 },
    /// The job was already terminal. Nothing was written.
    Duplicate,
    /// The conversation filled up before the reply could be stored. The job
    /// is marked FAILED and the transcript is untouched.
    LimitReached { turn_count: usize },
}

impl ChatJobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatJobOutcome::Completed { .. } => "completed",
            ChatJobOutcome::Duplicate => "duplicate",
            ChatJobOutcome::LimitReached { .. } => "limit_reached",
        }
    }
}

/// Consumes chat jobs one at a time.
pub struct ChatWorker {
    conversations: Arc<dyn ConversationStore>,
    jobs: Arc<dyn JobStatusStore>,
    queue: Arc<dyn QueueAdapter>,
    model: Arc<dyn ChatModelAdapter>,
    config: ChatConfig,
    max_messages: usize,
    poll_interval: Duration,
}

impl ChatWorker {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        jobs: Arc<dyn JobStatusStore>,
        queue: Arc<dyn QueueAdapter>,
        model: Arc<dyn ChatModelAdapter>,
        config: ChatConfig,
        worker: &WorkerConfig,
    ) -> Self {
        Self {
            conversations,
            jobs,
            queue,
            model,
            max_messages: config.max_messages,
            config,
            poll_interval: Duration::from_millis(worker.poll_interval_ms),
        }
    }

    /// Run one job to completion.
    ///
    /// The reply is stored tagged with the request ID, so a redelivery after
    /// the append finalizes from the stored reply instead of appending a
    /// second one. The reply is only stored while the conversation has room
    /// below the turn limit; otherwise the job fails and the transcript is
    /// left alone. The job row only moves out of PROCESSING once; a later
    /// write reports [`ChatJobOutcome::Duplicate`].
    pub async fn process(&self, job: &ChatJobMessage) -> Result<ChatJobOutcome, ParlaError> {
        let request_id = job.request_id.as_str();
        if let Some(existing) = self.jobs.get_job(request_id).await?
            && existing.status.is_terminal()
        {
            debug!(request_id, status = %existing.status, "job already terminal, skipping");
            return Ok(ChatJobOutcome::Duplicate);
        }

        if let Some(stored) = self
            .conversations
            .find_tagged(&job.conversation_id, Role::Assistant, request_id)
            .await?
        {
            debug!(request_id, "reply already stored, finalizing");
            return self.finalize(request_id, stored.content, stored.turn_count).await;
        }

        let conversation = self
            .conversations
            .get_conversation(&job.conversation_id)
            .await?
            .ok_or_else(|| ParlaError::not_found("conversation", &job.conversation_id))?;
        if conversation.turn_count() + 1 >= self.max_messages {
            return self.limit_reached(request_id, conversation.turn_count()).await;
        }

        let started = Instant::now();
        let response = self
            .model
            .complete(ProviderRequest {
                model: self.config.model.clone(),
                system_prompt: job.system_prompt.clone(),
                messages: job.messages.clone(),
                max_tokens: None,
            })
            .await?;
        #[cfg(feature = "prometheus")]
        {
            parla_prometheus::record_model_latency(started.elapsed().as_secs_f64());
            parla_prometheus::record_tokens(
                &response.model,
                response.usage.input_tokens,
                response.usage.output_tokens,
            );
        }
        debug!(
            request_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model replied"
        );

        let reply = response.content.trim().to_string();
        if reply.is_empty() {
            return Err(ParlaError::MalformedResponse {
                message: "model returned an empty reply".into(),
            });
        }

        // Re-read: the transcript may have moved while the model was working.
        let conversation = self
            .conversations
            .get_conversation(&job.conversation_id)
            .await?
            .ok_or_else(|| ParlaError::not_found("conversation", &job.conversation_id))?;
        let expires_at = conversation_expiry(&conversation, &self.config);
        let appended = self
            .conversations
            .append_tagged(
                &conversation.id,
                &Message::assistant(reply.clone()),
                request_id,
                self.max_messages,
                &expires_at,
            )
            .await?;
        match appended {
            TaggedAppend::Appended { turn_count } => {
                self.finalize(request_id, reply, turn_count).await
            }
            TaggedAppend::Existing {
                content,
                turn_count,
            } => self.finalize(request_id, content, turn_count).await,
            TaggedAppend::LimitReached { turn_count } => {
                self.limit_reached(request_id, turn_count).await
            }
        }
    }

    async fn finalize(
        &self,
        request_id: &str,
        ai_response: String,
        turn_count: usize,
    ) -> Result<ChatJobOutcome, ParlaError> {
        let turn_count = u32::try_from(turn_count)
            .map_err(|_| ParlaError::Internal(format!("turn count {turn_count} out of range")))?;
        if self.jobs.complete_job(request_id, &ai_response, turn_count).await? {
            info!(request_id, turn_count, "chat job completed");
            Ok(ChatJobOutcome::Completed {
                ai_response,
                turn_count,
            })
        } else {
            warn!(request_id, "job was finalized concurrently");
            Ok(ChatJobOutcome::Duplicate)
        }
    }

    async fn limit_reached(
        &self,
        request_id: &str,
        turn_count: usize,
    ) -> Result<ChatJobOutcome, ParlaError> {
        warn!(request_id, turn_count, "conversation is full, reply discarded");
        let message = format!(
            "conversation reached its {}-message limit before the reply was stored",
            self.max_messages
        );
        if self.jobs.fail_job(request_id, &message).await? {
            Ok(ChatJobOutcome::LimitReached { turn_count })
        } else {
            Ok(ChatJobOutcome::Duplicate)
        }
    }

    /// Handle one queue delivery: process, then settle the queue entry.
    ///
    /// Transient failures with attempts left go back on the queue with the
    /// job still PROCESSING. Anything else writes FAILED first.
    pub async fn handle(&self, entry: &QueueEntry) -> Result<(), ParlaError> {
        let job = match ChatJobMessage::from_payload(&entry.payload) {
            Ok(job) => job,
            Err(e) => {
                error!(entry_id = entry.id, error = %e, "dropping undecodable chat job");
                return self.queue.ack(entry.id).await;
            }
        };

        match self.process(&job).await {
            Ok(outcome) => {
                #[cfg(feature = "prometheus")]
                parla_prometheus::record_chat_job(outcome.as_str());
                debug!(entry_id = entry.id, outcome = outcome.as_str(), "chat job settled");
                self.queue.ack(entry.id).await
            }
            Err(e) if e.is_retryable() && entry.attempts < entry.max_attempts => {
                warn!(
                    request_id = job.request_id.as_str(),
                    attempt = entry.attempts,
                    max_attempts = entry.max_attempts,
                    error = %e,
                    "chat job failed, will be redelivered"
                );
                self.queue.fail(entry.id).await
            }
            Err(e) => {
                error!(request_id = job.request_id.as_str(), error = %e, "chat job failed");
                self.jobs.fail_job(&job.request_id, &e.to_string()).await?;
                #[cfg(feature = "prometheus")]
                parla_prometheus::record_chat_job("failed");
                if e.is_retryable() {
                    // Out of attempts: let the queue dead-letter the entry.
                    self.queue.fail(entry.id).await
                } else {
                    self.queue.ack(entry.id).await
                }
            }
        }
    }

    /// Dequeue and handle at most one job. Returns whether a job was found.
    pub async fn run_once(&self) -> Result<bool, ParlaError> {
        match self.queue.dequeue(&self.config.queue_name).await? {
            Some(entry) => {
                self.handle(&entry).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Poll the chat queue until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ParlaError> {
        info!(queue = self.config.queue_name.as_str(), "chat worker running");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let idle = match self.run_once().await {
                Ok(found) => !found,
                Err(e) => {
                    error!(error = %e, "chat worker iteration failed");
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
        info!("chat worker stopped");
        Ok(())
    }
}

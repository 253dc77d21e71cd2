// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-facing chat orchestration.
//!
//! Every request runs validation, then authorization, then the turn policy,
//! before anything is written.

use std::sync::Arc;
use std::time::Duration;

use parla_config::ParlaConfig;
use parla_config::model::ChatConfig;
use parla_core::ParlaError;
use parla_core::traits::{ChatModelAdapter, ConversationStore, JobStatusStore, QueueAdapter};
use parla_core::types::{
    Conversation, JobStatusView, Message, PracticeSentence, ProviderRequest, Role, TaggedAppend,
    now_timestamp, timestamp_after,
};
use tracing::{debug, info};

use crate::dispatcher::ChatJobDispatcher;
use crate::prompt::{DIFFICULTIES, PromptBuilder, ScenarioCatalog};
use crate::sentences::SentenceGenerator;
use crate::ttl::conversation_expiry;
use crate::turn_policy::{TurnLimitPolicy, TurnOutcome};

/// Longest accepted user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2_000;

/// Result of [`ChatService::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    /// Async mode: the turn was dispatched. Poll `request_id` for the reply.
    Queued { request_id: String, turn_count: usize },
    /// Sync mode: the model replied inline.
    Replied { ai_response: String, turn_count: usize },
    /// The turn limit was reached.
    Ended { wrap_up: String, turn_count: usize },
}

/// Chat entry points: start, send, poll, read.
pub struct ChatService {
    conversations: Arc<dyn ConversationStore>,
    jobs: Arc<dyn JobStatusStore>,
    model: Arc<dyn ChatModelAdapter>,
    dispatcher: ChatJobDispatcher,
    policy: TurnLimitPolicy,
    catalog: ScenarioCatalog,
    sentences: SentenceGenerator,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        jobs: Arc<dyn JobStatusStore>,
        queue: Arc<dyn QueueAdapter>,
        model: Arc<dyn ChatModelAdapter>,
        config: &ParlaConfig,
    ) -> Self {
        Self {
            dispatcher: ChatJobDispatcher::new(jobs.clone(), queue, &config.chat),
            policy: TurnLimitPolicy::from_config(&config.chat),
            catalog: ScenarioCatalog::new(config.scenarios.clone()),
            sentences: SentenceGenerator::new(model.clone(), config.chat.model.clone()),
            conversations,
            jobs,
            model,
            config: config.chat.clone(),
        }
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    /// Create an empty conversation for `owner` on a catalog topic.
    pub async fn start_chat(
        &self,
        owner: &str,
        topic: &str,
        difficulty: &str,
    ) -> Result<Conversation, ParlaError> {
        if owner.trim().is_empty() {
            return Err(ParlaError::Validation("owner must not be empty".into()));
        }
        let difficulty = difficulty.trim().to_lowercase();
        if !DIFFICULTIES.contains(&difficulty.as_str()) {
            return Err(ParlaError::Validation(format!(
                "unknown difficulty '{difficulty}' (expected one of {})",
                DIFFICULTIES.join(", ")
            )));
        }
        let scenario = self.catalog.resolve(topic)?;

        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            topic: scenario.topic.clone(),
            difficulty,
            scenario: format!("{} {}", scenario.description, scenario.situation),
            persona: scenario.persona.clone(),
            messages: Vec::new(),
            created_at: now_timestamp(),
            expires_at: timestamp_after(Duration::from_secs(
                self.config.empty_conversation_ttl_secs,
            )),
        };
        self.conversations.create_conversation(&conversation).await?;
        info!(
            conversation_id = conversation.id.as_str(),
            topic = conversation.topic.as_str(),
            "conversation started"
        );
        Ok(conversation)
    }

    /// Submit one user turn.
    ///
    /// The user message is stored tagged with the request ID (generated when
    /// the client sends none). A retry with the same `request_id` never
    /// appends again: it reports the existing job, returns the stored reply,
    /// or resumes delivery of the stored user turn. This holds in both async
    /// and sync mode.
    pub async fn send_message(
        &self,
        requester: &str,
        conversation_id: &str,
        text: &str,
        request_id: Option<&str>,
    ) -> Result<ChatReply, ParlaError> {
        let text = text.trim();
        if conversation_id.trim().is_empty() {
            return Err(ParlaError::Validation("conversation ID must not be empty".into()));
        }
        if text.is_empty() {
            return Err(ParlaError::Validation("message must not be empty".into()));
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ParlaError::Validation(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }
        if let Some(id) = request_id
            && id.trim().is_empty()
        {
            return Err(ParlaError::Validation("request ID must not be empty".into()));
        }

        let conversation = self.owned_conversation(requester, conversation_id).await?;

        if let Some(id) = request_id
            && let Some(reply) = self.replay(requester, &conversation, id).await?
        {
            return Ok(reply);
        }
        let request_id = request_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let outcome = self
            .policy
            .apply(self.conversations.as_ref(), &conversation, &self.config)
            .await?;
        #[cfg(feature = "prometheus")]
        parla_prometheus::record_turn(
            self.policy
                .classify(conversation.turn_count())
                .as_str(),
        );
        if let TurnOutcome::Ended { wrap_up, turn_count } = outcome {
            return Ok(ChatReply::Ended { wrap_up, turn_count });
        }

        // The user turn is durable before any downstream work. The store
        // re-checks the limit against the live count.
        let mut transcript = conversation;
        transcript.messages.push(Message::user(text));
        let expires_at = conversation_expiry(&transcript, &self.config);
        let appended = self
            .conversations
            .append_tagged(
                &transcript.id,
                &Message::user(text),
                &request_id,
                self.policy.max_messages(),
                &expires_at,
            )
            .await?;
        let turn_count = match appended {
            TaggedAppend::Appended { turn_count } | TaggedAppend::Existing { turn_count, .. } => {
                turn_count
            }
            TaggedAppend::LimitReached { turn_count } => {
                debug!(
                    conversation_id = transcript.id.as_str(),
                    turn_count, "conversation filled concurrently"
                );
                return self.end_turn(&transcript.id).await;
            }
        };

        self.deliver(requester, &transcript, &request_id, turn_count)
            .await
    }

    /// Answer a repeated `request_id`, or `None` if nothing was stored for it.
    async fn replay(
        &self,
        requester: &str,
        conversation: &Conversation,
        request_id: &str,
    ) -> Result<Option<ChatReply>, ParlaError> {
        let user_turn = self
            .conversations
            .find_tagged(&conversation.id, Role::User, request_id)
            .await?;

        if let Some(existing) = self.jobs.get_job(request_id).await? {
            if existing.conversation_id != conversation.id {
                return Err(ParlaError::Validation(format!(
                    "request ID {request_id} belongs to another conversation"
                )));
            }
            debug!(request_id, "request already submitted");
            return Ok(Some(ChatReply::Queued {
                request_id: request_id.to_string(),
                turn_count: user_turn
                    .map(|m| m.turn_count)
                    .unwrap_or_else(|| conversation.turn_count()),
            }));
        }

        let Some(user_turn) = user_turn else {
            return Ok(None);
        };
        if let Some(reply) = self
            .conversations
            .find_tagged(&conversation.id, Role::Assistant, request_id)
            .await?
        {
            debug!(request_id, "returning stored reply");
            return Ok(Some(ChatReply::Replied {
                ai_response: reply.content,
                turn_count: reply.turn_count,
            }));
        }

        // The user turn is stored but its delivery never finished.
        debug!(request_id, "resuming stored user turn");
        self.deliver(requester, conversation, request_id, user_turn.turn_count)
            .await
            .map(Some)
    }

    /// Dispatch a stored user turn, or answer it inline in sync mode.
    async fn deliver(
        &self,
        requester: &str,
        transcript: &Conversation,
        request_id: &str,
        turn_count: usize,
    ) -> Result<ChatReply, ParlaError> {
        let history = PromptBuilder::history(transcript, self.config.history_window);
        let system_prompt = PromptBuilder::system_prompt(transcript, self.policy.max_messages());

        if self.config.async_mode {
            let request_id = self
                .dispatcher
                .submit_with_id(request_id, &transcript.id, requester, history, system_prompt)
                .await?;
            return Ok(ChatReply::Queued {
                request_id,
                turn_count,
            });
        }

        let response = self
            .model
            .complete(ProviderRequest {
                model: self.config.model.clone(),
                system_prompt,
                messages: history,
                max_tokens: None,
            })
            .await?;
        let ai_response = response.content.trim().to_string();
        if ai_response.is_empty() {
            return Err(ParlaError::MalformedResponse {
                message: "model returned an empty reply".into(),
            });
        }

        // Re-read: a concurrent writer may have advanced the transcript.
        let latest = self
            .conversations
            .get_conversation(&transcript.id)
            .await?
            .ok_or_else(|| ParlaError::not_found("conversation", &transcript.id))?;
        let appended = self
            .conversations
            .append_tagged(
                &latest.id,
                &Message::assistant(ai_response.clone()),
                request_id,
                self.policy.max_messages(),
                &conversation_expiry(&latest, &self.config),
            )
            .await?;
        match appended {
            TaggedAppend::Appended { turn_count } => Ok(ChatReply::Replied {
                ai_response,
                turn_count,
            }),
            TaggedAppend::Existing {
                content,
                turn_count,
            } => Ok(ChatReply::Replied {
                ai_response: content,
                turn_count,
            }),
            TaggedAppend::LimitReached { .. } => self.end_turn(&latest.id).await,
        }
    }

    /// Re-read a conversation that turned out to be full and wrap it up.
    async fn end_turn(&self, conversation_id: &str) -> Result<ChatReply, ParlaError> {
        let latest = self
            .conversations
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| ParlaError::not_found("conversation", conversation_id))?;
        match self
            .policy
            .apply(self.conversations.as_ref(), &latest, &self.config)
            .await?
        {
            TurnOutcome::Ended { wrap_up, turn_count } => {
                Ok(ChatReply::Ended { wrap_up, turn_count })
            }
            TurnOutcome::Proceed => Err(ParlaError::Internal(format!(
                "conversation {conversation_id} has room again after filling up"
            ))),
        }
    }

    /// Poll a chat job. An absent or expired job is `NotFound`.
    pub async fn job_status(&self, request_id: &str) -> Result<JobStatusView, ParlaError> {
        if request_id.trim().is_empty() {
            return Err(ParlaError::Validation("request ID must not be empty".into()));
        }
        self.jobs
            .get_job(request_id)
            .await?
            .map(JobStatusView::from)
            .ok_or_else(|| ParlaError::not_found("job", request_id))
    }

    /// Read a conversation owned by `requester`.
    pub async fn conversation(
        &self,
        requester: &str,
        conversation_id: &str,
    ) -> Result<Conversation, ParlaError> {
        self.owned_conversation(requester, conversation_id).await
    }

    /// Recommend practice sentences for a conversation owned by `requester`.
    pub async fn recommend_sentences(
        &self,
        requester: &str,
        conversation_id: &str,
        count: usize,
    ) -> Result<Vec<PracticeSentence>, ParlaError> {
        let conversation = self.owned_conversation(requester, conversation_id).await?;
        self.sentences.recommend(&conversation, count).await
    }

    async fn owned_conversation(
        &self,
        requester: &str,
        conversation_id: &str,
    ) -> Result<Conversation, ParlaError> {
        let conversation = self
            .conversations
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| ParlaError::not_found("conversation", conversation_id))?;
        if conversation.owner != requester {
            return Err(ParlaError::Unauthorized {
                message: format!("{requester} does not own conversation {conversation_id}"),
            });
        }
        Ok(conversation)
    }
}

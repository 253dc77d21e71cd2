// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn limit policy.
//!
//! Classifies an incoming chat message by the stored message count and, at the
//! limit, ends the conversation with a fixed wrap-up message. The wrap-up is
//! appended at most once, so a retried request re-enters in the same state.

use parla_config::model::ChatConfig;
use parla_core::ParlaError;
use parla_core::traits::ConversationStore;
use parla_core::types::{Conversation, Message, Role};
use tracing::{debug, info};

use crate::ttl::conversation_expiry;

/// Attempts at the conditional wrap-up append before giving up.
const WRAP_UP_ATTEMPTS: usize = 3;

/// Outcome of classifying a message count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDecision {
    /// Append the user message and continue.
    Proceed,
    /// The user message would fill the last slot. Wrap up instead.
    LastTurn,
    /// The limit is already reached.
    Ended,
}

impl TurnDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnDecision::Proceed => "proceed",
            TurnDecision::LastTurn => "last_turn",
            TurnDecision::Ended => "ended",
        }
    }
}

/// Result of [`TurnLimitPolicy::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing was written; the caller appends the user message.
    Proceed,
    /// The conversation is over. `turn_count` is the count after wrap-up.
    Ended { wrap_up: String, turn_count: usize },
}

/// Decides whether a new turn proceeds, triggers wrap-up, or is rejected.
#[derive(Debug, Clone)]
pub struct TurnLimitPolicy {
    max_messages: usize,
    wrap_up_message: String,
}

impl TurnLimitPolicy {
    pub fn new(max_messages: usize, wrap_up_message: impl Into<String>) -> Self {
        Self {
            max_messages,
            wrap_up_message: wrap_up_message.into(),
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.max_messages, config.wrap_up_message.clone())
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn wrap_up_message(&self) -> &str {
        &self.wrap_up_message
    }

    /// Classify a request against `count` stored messages.
    pub fn classify(&self, count: usize) -> TurnDecision {
        if count >= self.max_messages {
            TurnDecision::Ended
        } else if count + 1 == self.max_messages {
            TurnDecision::LastTurn
        } else {
            TurnDecision::Proceed
        }
    }

    /// Whether `conversation` already holds this policy's wrap-up anywhere.
    fn is_wrapped_up(&self, conversation: &Conversation) -> bool {
        conversation
            .messages
            .iter()
            .any(|m| m.role == Role::Assistant && m.content == self.wrap_up_message)
    }

    /// Apply the policy to a freshly read conversation.
    ///
    /// For [`TurnDecision::LastTurn`] and [`TurnDecision::Ended`], appends the
    /// wrap-up unless the transcript already holds one. The append is
    /// conditional on the count observed here, so concurrent duplicates of the
    /// same request append it once. The model is never called.
    pub async fn apply(
        &self,
        store: &dyn ConversationStore,
        conversation: &Conversation,
        config: &ChatConfig,
    ) -> Result<TurnOutcome, ParlaError> {
        let decision = self.classify(conversation.turn_count());
        debug!(
            conversation_id = conversation.id.as_str(),
            turn_count = conversation.turn_count(),
            decision = decision.as_str(),
            "turn classified"
        );
        if decision == TurnDecision::Proceed {
            return Ok(TurnOutcome::Proceed);
        }

        let wrap_up = Message::assistant(self.wrap_up_message.clone());
        let mut current = conversation.clone();
        for _ in 0..WRAP_UP_ATTEMPTS {
            if self.is_wrapped_up(&current) {
                return Ok(self.ended(current.turn_count()));
            }

            let expected = current.turn_count();
            let expires_at = conversation_expiry(&current, config);
            match store
                .append_message_at(&current.id, &wrap_up, expected, &expires_at)
                .await?
            {
                Some(count) => {
                    info!(
                        conversation_id = current.id.as_str(),
                        turn_count = count,
                        "conversation wrapped up"
                    );
                    return Ok(self.ended(count));
                }
                None => {
                    // Another writer moved the transcript; re-read and re-check.
                    current = store
                        .get_conversation(&current.id)
                        .await?
                        .ok_or_else(|| ParlaError::not_found("conversation", &conversation.id))?;
                    if self.classify(current.turn_count()) == TurnDecision::Proceed {
                        return Err(ParlaError::Internal(format!(
                            "conversation {} shrank during wrap-up",
                            current.id
                        )));
                    }
                }
            }
        }

        Err(ParlaError::Storage {
            source: format!(
                "wrap-up for conversation {} kept racing concurrent appends",
                conversation.id
            )
            .into(),
        })
    }

    fn ended(&self, turn_count: usize) -> TurnOutcome {
        TurnOutcome::Ended {
            wrap_up: self.wrap_up_message.clone(),
            turn_count,
        }
    }
}

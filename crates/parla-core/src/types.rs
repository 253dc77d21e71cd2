// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and services.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Maximum number of entries a single batched enqueue call may carry.
pub const MAX_BATCH_ENTRIES: usize = 10;

/// Formats a timestamp the way every table stores it (`2026-01-01T00:00:00.000Z`).
///
/// The fixed width keeps lexical and chronological order identical, which the
/// expiry filters in SQL rely on.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The current instant as a stored timestamp.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// A stored timestamp `ttl` from now.
pub fn timestamp_after(ttl: Duration) -> String {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    format_timestamp(Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC))
}

/// Identifies the type of adapter in the registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Queue,
    ChatModel,
    Speech,
    Blob,
    Observability,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

// --- Conversations ---

/// Speaker of a conversation message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One stored turn. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Possibly empty for corrective placeholders.
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A role-play practice conversation.
///
/// `messages.len()` is the turn count. It is never cached separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub owner: String,
    pub topic: String,
    pub difficulty: String,
    pub scenario: String,
    pub persona: String,
    pub messages: Vec<Message>,
    pub created_at: String,
    pub expires_at: String,
}

impl Conversation {
    /// Number of stored turns (user and assistant).
    pub fn turn_count(&self) -> usize {
        self.messages.len()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether any user turn carries non-blank text.
    pub fn has_user_content(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.role == Role::User && !m.content.trim().is_empty())
    }

    /// The trailing `window` messages, in conversational order.
    pub fn recent_messages(&self, window: usize) -> Vec<Message> {
        let start = self.messages.len().saturating_sub(window);
        self.messages[start..].to_vec()
    }
}

/// Result of [`ConversationStore::append_tagged`](crate::traits::ConversationStore::append_tagged).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedAppend {
    /// Stored. `turn_count` is the new message count.
    Appended { turn_count: usize },
    /// A message with the same role and request ID is already stored.
    /// `turn_count` is the count right after it was appended.
    Existing { content: String, turn_count: usize },
    /// The message would have filled or passed the limit. Nothing was written.
    LimitReached { turn_count: usize },
}

/// A stored message found by role and request ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedMessage {
    pub content: String,
    /// Message count right after this message was appended.
    pub turn_count: usize,
}

// --- Chat jobs ---

/// Lifecycle state of a chat job. `Processing` moves to exactly one terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

/// Durable status row for one chat job, keyed by request ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatJobRecord {
    pub request_id: String,
    pub conversation_id: String,
    pub student_email: String,
    pub status: JobStatus,
    pub ai_response: Option<String>,
    pub turn_count: Option<u32>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub expires_at: String,
}

/// Read model served to polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ChatJobRecord> for JobStatusView {
    fn from(record: ChatJobRecord) -> Self {
        Self {
            status: record.status,
            conversation_id: Some(record.conversation_id),
            ai_response: record.ai_response,
            turn_count: record.turn_count,
            error: record.error,
        }
    }
}

// --- Sentence audio ---

/// Synthesis state of one staged sentence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioStatus {
    Pending,
    Completed,
    Failed,
}

/// Per-(session, sentence index) synthesis record.
///
/// `storage_key` is derived from (text, voice) before any synthesis happens,
/// so the record caches an association, not content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceAudioRecord {
    pub session_id: String,
    pub sentence_index: u32,
    pub english: String,
    pub korean: Option<String>,
    pub voice_id: String,
    pub status: AudioStatus,
    pub storage_key: String,
    pub duration_ms: Option<u64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub expires_at: String,
}

/// A generated practice sentence with an optional translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeSentence {
    pub english: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub korean: Option<String>,
}

impl PracticeSentence {
    pub fn new(english: impl Into<String>) -> Self {
        Self {
            english: english.into(),
            korean: None,
        }
    }

    pub fn with_translation(mut self, korean: impl Into<String>) -> Self {
        self.korean = Some(korean.into());
        self
    }
}

// --- Queue ---

/// A message to be enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub payload: String,
    /// Messages sharing a group key are delivered one at a time, in order.
    pub group_key: Option<String>,
    /// A second enqueue with the same dedup ID is a no-op.
    pub dedup_id: Option<String>,
}

impl QueueMessage {
    /// An unordered, non-deduplicated message.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            group_key: None,
            dedup_id: None,
        }
    }

    pub fn with_group(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    pub fn with_dedup_id(mut self, dedup_id: impl Into<String>) -> Self {
        self.dedup_id = Some(dedup_id.into());
        self
    }
}

/// A queue row as seen by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    pub group_key: Option<String>,
    pub dedup_id: Option<String>,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
}

/// A batch entry the queue refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Position of the entry within the submitted batch.
    pub position: usize,
    pub message: String,
}

/// Per-entry outcome of a batched enqueue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Positions that were accepted.
    pub enqueued: Vec<usize>,
    pub failed: Vec<BatchFailure>,
}

// --- Language model ---

/// Token usage reported by a model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A completion request: system prompt plus ordered history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    /// `None` selects the adapter's default model.
    pub model: Option<String>,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
}

/// A completion response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

// --- Speech ---

/// A synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
}

/// Synthesized audio bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub data: Bytes,
    pub content_type: String,
    /// Duration reported by the provider, if any.
    pub duration_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn conversation(messages: Vec<Message>) -> Conversation {
        Conversation {
            id: "c1".into(),
            owner: "student@example.com".into(),
            topic: "cafe".into(),
            difficulty: "beginner".into(),
            scenario: "Ordering coffee".into(),
            persona: "barista".into(),
            messages,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            expires_at: "2026-01-02T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn job_status_round_trips_through_strum_and_serde() {
        assert_eq!(JobStatus::Processing.to_string(), "PROCESSING");
        assert_eq!(JobStatus::from_str("COMPLETED").unwrap(), JobStatus::Completed);
        let json = serde_json::to_string(&JobStatus::Failed).unwrap();
        assert_eq!(json, "\"FAILED\"");
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn role_uses_lowercase() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(Role::from_str("user").unwrap(), Role::User);
    }

    #[test]
    fn blank_user_turns_are_not_content() {
        let c = conversation(vec![Message::assistant("Hi!"), Message::user("   ")]);
        assert!(!c.has_user_content());
        let c = conversation(vec![Message::assistant("Hi!"), Message::user("Hello")]);
        assert!(c.has_user_content());
    }

    #[test]
    fn recent_messages_keeps_tail_in_order() {
        let c = conversation(vec![
            Message::user("1"),
            Message::assistant("2"),
            Message::user("3"),
        ]);
        let recent = c.recent_messages(2);
        assert_eq!(recent, vec![Message::assistant("2"), Message::user("3")]);
        assert_eq!(c.recent_messages(10).len(), 3);
    }

    #[test]
    fn job_status_view_omits_absent_fields() {
        let view = JobStatusView {
            status: JobStatus::Processing,
            conversation_id: Some("c1".into()),
            ai_response: None,
            turn_count: None,
            error: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json, serde_json::json!({"status": "PROCESSING", "conversationId": "c1"}));
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let now = now_timestamp();
        let later = timestamp_after(Duration::from_secs(60));
        assert_eq!(now.len(), later.len());
        assert!(later > now);
        assert!(now.ends_with('Z'));
    }

    proptest::proptest! {
        #[test]
        fn stored_timestamps_sort_chronologically(
            a in 946_684_800_000i64..4_102_444_800_000,
            b in 946_684_800_000i64..4_102_444_800_000,
        ) {
            let ta = DateTime::<Utc>::from_timestamp_millis(a).unwrap();
            let tb = DateTime::<Utc>::from_timestamp_millis(b).unwrap();
            let (sa, sb) = (format_timestamp(ta), format_timestamp(tb));
            proptest::prop_assert_eq!(sa.len(), sb.len());
            proptest::prop_assert_eq!(sa.cmp(&sb), ta.cmp(&tb));
        }
    }
}

// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter traits for conversations, job status, and sentence audio.

use async_trait::async_trait;

use crate::error::ParlaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChatJobRecord, Conversation, Message, Role, SentenceAudioRecord, TaggedAppend, TaggedMessage,
};

/// Lifecycle of a storage backend.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), ParlaError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), ParlaError>;
}

/// Keyed storage for conversation transcripts.
///
/// Expired conversations are treated as absent by every read.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates a conversation. Its messages, if any, are stored in order.
    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), ParlaError>;

    /// Reads the live conversation, or `None` if absent or expired.
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ParlaError>;

    /// Appends one message at the end of the transcript and sets the new expiry,
    /// atomically. Returns the resulting message count.
    async fn append_message(
        &self,
        id: &str,
        message: &Message,
        expires_at: &str,
    ) -> Result<usize, ParlaError>;

    /// Appends only if the transcript still holds exactly `expected_count`
    /// messages. Returns `None` when another writer got there first.
    async fn append_message_at(
        &self,
        id: &str,
        message: &Message,
        expected_count: usize,
        expires_at: &str,
    ) -> Result<Option<usize>, ParlaError>;

    /// Appends `message` tagged with `request_id`, at most once per role.
    ///
    /// In one atomic step: if a message with this role and request ID exists,
    /// reports it; otherwise appends only while the resulting count stays
    /// below `limit`.
    async fn append_tagged(
        &self,
        id: &str,
        message: &Message,
        request_id: &str,
        limit: usize,
        expires_at: &str,
    ) -> Result<TaggedAppend, ParlaError>;

    /// Finds the message with this role appended for `request_id`.
    async fn find_tagged(
        &self,
        id: &str,
        role: Role,
        request_id: &str,
    ) -> Result<Option<TaggedMessage>, ParlaError>;
}

/// Keyed storage for chat job lifecycle state.
///
/// Terminal writes are conditional: the first one wins and later ones report `false`.
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Creates a `PROCESSING` row. Returns `false` if the request ID already exists.
    async fn create_job(&self, job: &ChatJobRecord) -> Result<bool, ParlaError>;

    /// Reads a job, or `None` if absent or expired.
    async fn get_job(&self, request_id: &str) -> Result<Option<ChatJobRecord>, ParlaError>;

    /// Moves a `PROCESSING` job to `COMPLETED`. Returns whether the write applied.
    async fn complete_job(
        &self,
        request_id: &str,
        ai_response: &str,
        turn_count: u32,
    ) -> Result<bool, ParlaError>;

    /// Moves a `PROCESSING` job to `FAILED`. Returns whether the write applied.
    async fn fail_job(&self, request_id: &str, error: &str) -> Result<bool, ParlaError>;
}

/// Keyed storage for per-sentence synthesis records.
#[async_trait]
pub trait SentenceAudioStore: Send + Sync {
    /// Creates the given records in one write.
    ///
    /// All or nothing: if any (session, index) already exists, nothing is
    /// written and the error is a validation error naming the taken indexes.
    async fn create_records(&self, records: &[SentenceAudioRecord]) -> Result<(), ParlaError>;

    /// All live records for a session, ordered by sentence index.
    async fn list_records(&self, session_id: &str)
    -> Result<Vec<SentenceAudioRecord>, ParlaError>;

    /// Reads one record, or `None` if absent or expired.
    async fn get_record(
        &self,
        session_id: &str,
        sentence_index: u32,
    ) -> Result<Option<SentenceAudioRecord>, ParlaError>;

    /// Moves a `PENDING` record whose storage key is `storage_key` to
    /// `COMPLETED`. Returns whether the write applied.
    async fn complete_record(
        &self,
        session_id: &str,
        sentence_index: u32,
        storage_key: &str,
        duration_ms: Option<u64>,
    ) -> Result<bool, ParlaError>;

    /// Moves a `PENDING` record whose storage key is `storage_key` to
    /// `FAILED`. Returns whether the write applied.
    async fn fail_record(
        &self,
        session_id: &str,
        sentence_index: u32,
        storage_key: &str,
        error_code: &str,
        error_message: &str,
    ) -> Result<bool, ParlaError>;
}

// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parla practice backend.
//!
//! This crate provides the error taxonomy, domain types, and the adapter
//! traits for every collaborator the chat and audio pipelines consume:
//! keyed stores, the job queue, the language model, speech synthesis, and
//! the blob store.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ErrorKind, ParlaError};
pub use types::{
    AdapterType, AudioStatus, ChatJobRecord, Conversation, HealthStatus, JobStatus,
    JobStatusView, MAX_BATCH_ENTRIES, Message, PracticeSentence, Role, SentenceAudioRecord,
    TaggedAppend, TaggedMessage,
};

pub use traits::{
    BlobAdapter, ChatModelAdapter, ConversationStore, JobStatusStore, PluginAdapter,
    QueueAdapter, SentenceAudioStore, SpeechAdapter, StorageAdapter,
};

// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the collaborators the core consumes.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod blob;
pub mod provider;
pub mod queue;
pub mod speech;
pub mod storage;

pub use adapter::PluginAdapter;
pub use blob::BlobAdapter;
pub use provider::ChatModelAdapter;
pub use queue::QueueAdapter;
pub use speech::SpeechAdapter;
pub use storage::{ConversationStore, JobStatusStore, SentenceAudioStore, StorageAdapter};

// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue adapter trait.

use async_trait::async_trait;

use crate::error::ParlaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{BatchOutcome, QueueEntry, QueueMessage};

/// Adapter for at-least-once job queues.
///
/// Supports per-key ordering groups and producer-side deduplication for
/// ordered queues, and batched sends of up to
/// [`MAX_BATCH_ENTRIES`](crate::types::MAX_BATCH_ENTRIES) entries.
#[async_trait]
pub trait QueueAdapter: PluginAdapter {
    /// Enqueues one message. A duplicate dedup ID returns the existing entry's ID.
    async fn enqueue(&self, queue_name: &str, message: QueueMessage) -> Result<i64, ParlaError>;

    /// Enqueues up to `MAX_BATCH_ENTRIES` messages in one call, reporting per-entry outcome.
    async fn enqueue_batch(
        &self,
        queue_name: &str,
        messages: Vec<QueueMessage>,
    ) -> Result<BatchOutcome, ParlaError>;

    /// Claims the next deliverable entry, or `None` if nothing is ready.
    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, ParlaError>;

    /// Acknowledges successful processing.
    async fn ack(&self, id: i64) -> Result<(), ParlaError>;

    /// Releases the entry for redelivery, or dead-letters it after its last attempt.
    async fn fail(&self, id: i64) -> Result<(), ParlaError>;
}

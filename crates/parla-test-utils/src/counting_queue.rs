// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue wrapper that records batch calls and injects enqueue failures.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use parla_core::ParlaError;
use parla_core::traits::adapter::PluginAdapter;
use parla_core::traits::queue::QueueAdapter;
use parla_core::types::{
    AdapterType, BatchFailure, BatchOutcome, HealthStatus, QueueEntry, QueueMessage,
};

#[derive(Default)]
struct Recorded {
    batch_sizes: Vec<usize>,
    failing_calls: HashSet<usize>,
    refused_markers: Vec<String>,
}

/// Wraps a real queue, counting `enqueue_batch` calls and their sizes.
pub struct CountingQueue {
    inner: Arc<dyn QueueAdapter>,
    recorded: Mutex<Recorded>,
}

impl CountingQueue {
    pub fn new(inner: Arc<dyn QueueAdapter>) -> Self {
        Self {
            inner,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Sizes of every `enqueue_batch` call, in call order.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.recorded.lock().await.batch_sizes.clone()
    }

    /// Make the `call_index`-th (zero-based) `enqueue_batch` call fail outright.
    pub async fn fail_batch_call(&self, call_index: usize) {
        self.recorded.lock().await.failing_calls.insert(call_index);
    }

    /// Refuse individual batch entries whose payload contains `marker`.
    pub async fn refuse_payloads_containing(&self, marker: impl Into<String>) {
        self.recorded.lock().await.refused_markers.push(marker.into());
    }
}

#[async_trait]
impl PluginAdapter for CountingQueue {
    fn name(&self) -> &str {
        "counting-queue"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Queue
    }

    async fn health_check(&self) -> Result<HealthStatus, ParlaError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), ParlaError> {
        Ok(())
    }
}

#[async_trait]
impl QueueAdapter for CountingQueue {
    async fn enqueue(&self, queue_name: &str, message: QueueMessage) -> Result<i64, ParlaError> {
        self.inner.enqueue(queue_name, message).await
    }

    async fn enqueue_batch(
        &self,
        queue_name: &str,
        messages: Vec<QueueMessage>,
    ) -> Result<BatchOutcome, ParlaError> {
        let (call_index, markers) = {
            let mut recorded = self.recorded.lock().await;
            recorded.batch_sizes.push(messages.len());
            let call_index = recorded.batch_sizes.len() - 1;
            if recorded.failing_calls.contains(&call_index) {
                return Err(ParlaError::Queue {
                    message: format!("injected failure for batch call {call_index}"),
                });
            }
            (call_index, recorded.refused_markers.clone())
        };

        let mut forwarded = Vec::new();
        let mut positions = Vec::new();
        let mut refused = Vec::new();
        for (position, message) in messages.into_iter().enumerate() {
            if markers.iter().any(|m| message.payload.contains(m.as_str())) {
                refused.push(BatchFailure {
                    position,
                    message: format!("injected refusal in batch call {call_index}"),
                });
            } else {
                positions.push(position);
                forwarded.push(message);
            }
        }

        let inner = if forwarded.is_empty() {
            BatchOutcome::default()
        } else {
            self.inner.enqueue_batch(queue_name, forwarded).await?
        };

        // Map positions of the forwarded sub-batch back onto the original batch.
        let mut outcome = BatchOutcome {
            enqueued: inner.enqueued.iter().map(|&i| positions[i]).collect(),
            failed: inner
                .failed
                .into_iter()
                .map(|f| BatchFailure {
                    position: positions[f.position],
                    message: f.message,
                })
                .collect(),
        };
        outcome.failed.extend(refused);
        outcome.failed.sort_by_key(|f| f.position);
        Ok(outcome)
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, ParlaError> {
        self.inner.dequeue(queue_name).await
    }

    async fn ack(&self, id: i64) -> Result<(), ParlaError> {
        self.inner.ack(id).await
    }

    async fn fail(&self, id: i64) -> Result<(), ParlaError> {
        self.inner.fail(id).await
    }
}

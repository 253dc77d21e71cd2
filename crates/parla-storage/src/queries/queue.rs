// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations for crash-safe job delivery.
//!
//! Delivery is at-least-once. Entries sharing a `group_key` are delivered one
//! at a time in insertion order; entries without one are unordered. A claimed
//! entry whose lock expires is redelivered, and an entry that has used up its
//! attempts is moved to the `failed` (dead-letter) status.

use parla_core::types::{BatchFailure, BatchOutcome, MAX_BATCH_ENTRIES, QueueMessage};
use parla_core::ParlaError;
use rusqlite::{OptionalExtension, Transaction, params};

use crate::database::{Database, map_tr_err};
use crate::models::{QueueEntry, SQL_NOW};

/// Delivery policy applied by the queue functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Seconds a claimed entry stays invisible to other consumers.
    pub lock_timeout_secs: u64,
    /// Deliveries before an entry is dead-lettered.
    pub max_attempts: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            lock_timeout_secs: 300,
            max_attempts: 3,
        }
    }
}

/// Enqueue one message. Returns the entry ID.
///
/// A message whose dedup ID is already present in the queue is not inserted
/// again; the existing entry's ID is returned.
pub async fn enqueue(
    db: &Database,
    settings: QueueSettings,
    queue_name: &str,
    message: QueueMessage,
) -> Result<i64, ParlaError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let id = insert_entry(&tx, settings, &queue_name, &message)?;
            tx.commit()?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)
}

/// Enqueue up to [`MAX_BATCH_ENTRIES`] messages in one call.
///
/// Each entry succeeds or fails on its own; the outcome lists both by position.
pub async fn enqueue_batch(
    db: &Database,
    settings: QueueSettings,
    queue_name: &str,
    messages: Vec<QueueMessage>,
) -> Result<BatchOutcome, ParlaError> {
    if messages.len() > MAX_BATCH_ENTRIES {
        return Err(ParlaError::Queue {
            message: format!(
                "batch of {} exceeds the limit of {MAX_BATCH_ENTRIES} entries",
                messages.len()
            ),
        });
    }

    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut outcome = BatchOutcome::default();
            for (position, message) in messages.iter().enumerate() {
                match insert_entry(&tx, settings, &queue_name, message) {
                    Ok(_) => outcome.enqueued.push(position),
                    Err(e) => outcome.failed.push(BatchFailure {
                        position,
                        message: e.to_string(),
                    }),
                }
            }
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

fn insert_entry(
    tx: &Transaction<'_>,
    settings: QueueSettings,
    queue_name: &str,
    message: &QueueMessage,
) -> rusqlite::Result<i64> {
    if let Some(dedup_id) = &message.dedup_id {
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM queue WHERE queue_name = ?1 AND dedup_id = ?2",
                params![queue_name, dedup_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
    }

    tx.execute(
        "INSERT INTO queue (queue_name, payload, group_key, dedup_id, max_attempts)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            queue_name,
            message.payload,
            message.group_key,
            message.dedup_id,
            settings.max_attempts,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Claim the next deliverable entry from the named queue.
///
/// Deliverable means pending, or processing with an expired lock. An entry in
/// a group is only deliverable when no other entry of that group is in flight
/// and no older entry of that group is still waiting. Claiming counts as an
/// attempt. Returns `None` if nothing is ready.
pub async fn dequeue(
    db: &Database,
    settings: QueueSettings,
    queue_name: &str,
) -> Result<Option<QueueEntry>, ParlaError> {
    let queue_name = queue_name.to_string();
    let lock_modifier = format!("+{} seconds", settings.lock_timeout_secs);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            // Expired claims that already used every attempt are dead.
            tx.execute(
                &format!(
                    "UPDATE queue SET status = 'failed', locked_until = NULL, updated_at = {SQL_NOW}
                     WHERE queue_name = ?1 AND status = 'processing'
                       AND locked_until <= {SQL_NOW} AND attempts >= max_attempts"
                ),
                params![queue_name],
            )?;

            let candidate = tx
                .query_row(
                    &format!(
                        "SELECT q.id, q.queue_name, q.payload, q.group_key, q.dedup_id, q.status,
                                q.attempts, q.max_attempts, q.created_at, q.updated_at, q.locked_until
                         FROM queue q
                         WHERE q.queue_name = ?1
                           AND (q.status = 'pending'
                                OR (q.status = 'processing' AND q.locked_until <= {SQL_NOW}))
                           AND (q.group_key IS NULL OR NOT EXISTS (
                                SELECT 1 FROM queue o
                                WHERE o.queue_name = q.queue_name
                                  AND o.group_key = q.group_key
                                  AND o.id <> q.id
                                  AND ((o.status = 'processing'
                                        AND (o.locked_until > {SQL_NOW} OR o.id < q.id))
                                       OR (o.status = 'pending' AND o.id < q.id))))
                         ORDER BY q.id ASC
                         LIMIT 1"
                    ),
                    params![queue_name],
                    |row| {
                        Ok(QueueEntry {
                            id: row.get(0)?,
                            queue_name: row.get(1)?,
                            payload: row.get(2)?,
                            group_key: row.get(3)?,
                            dedup_id: row.get(4)?,
                            status: row.get(5)?,
                            attempts: row.get(6)?,
                            max_attempts: row.get(7)?,
                            created_at: row.get(8)?,
                            updated_at: row.get(9)?,
                            locked_until: row.get(10)?,
                        })
                    },
                )
                .optional()?;

            let Some(entry) = candidate else {
                tx.commit()?;
                return Ok(None);
            };

            let (locked_until, updated_at): (String, String) = tx.query_row(
                &format!(
                    "UPDATE queue SET status = 'processing', attempts = attempts + 1,
                     locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2),
                     updated_at = {SQL_NOW}
                     WHERE id = ?1
                     RETURNING locked_until, updated_at"
                ),
                params![entry.id, lock_modifier],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            tx.commit()?;

            Ok(Some(QueueEntry {
                status: "processing".to_string(),
                attempts: entry.attempts + 1,
                locked_until: Some(locked_until),
                updated_at,
                ..entry
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Acknowledge successful processing. Marks the entry `completed`.
pub async fn ack(db: &Database, id: i64) -> Result<(), ParlaError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "UPDATE queue SET status = 'completed', locked_until = NULL,
                     updated_at = {SQL_NOW}
                     WHERE id = ?1"
                ),
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Release a claimed entry after a failed attempt.
///
/// Goes back to `pending` for redelivery, or to `failed` once the entry has
/// been delivered `max_attempts` times.
pub async fn fail(db: &Database, id: i64) -> Result<(), ParlaError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "UPDATE queue SET
                       status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'pending' END,
                       locked_until = NULL,
                       updated_at = {SQL_NOW}
                     WHERE id = ?1 AND status = 'processing'"
                ),
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Dead-lettered entries of a queue, oldest first.
pub async fn dead_letters(db: &Database, queue_name: &str) -> Result<Vec<QueueEntry>, ParlaError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, queue_name, payload, group_key, dedup_id, status, attempts,
                        max_attempts, created_at, updated_at, locked_until
                 FROM queue WHERE queue_name = ?1 AND status = 'failed'
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![queue_name], |row| {
                Ok(QueueEntry {
                    id: row.get(0)?,
                    queue_name: row.get(1)?,
                    payload: row.get(2)?,
                    group_key: row.get(3)?,
                    dedup_id: row.get(4)?,
                    status: row.get(5)?,
                    attempts: row.get(6)?,
                    max_attempts: row.get(7)?,
                    created_at: row.get(8)?,
                    updated_at: row.get(9)?,
                    locked_until: row.get(10)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

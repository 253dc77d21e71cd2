// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Physical removal of expired rows.
//!
//! Readers already treat expired rows as absent; this sweep only reclaims space.

use parla_core::ParlaError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::{PurgeReport, SQL_NOW};

/// Delete expired conversations, jobs and sentence records, plus finished
/// queue entries older than `queue_retention_secs`.
pub async fn purge_expired(
    db: &Database,
    queue_retention_secs: u64,
) -> Result<PurgeReport, ParlaError> {
    let retention = format!("-{queue_retention_secs} seconds");
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let report = PurgeReport {
                conversations: tx.execute(
                    &format!("DELETE FROM conversations WHERE expires_at <= {SQL_NOW}"),
                    [],
                )?,
                jobs: tx.execute(
                    &format!("DELETE FROM chat_jobs WHERE expires_at <= {SQL_NOW}"),
                    [],
                )?,
                sentence_records: tx.execute(
                    &format!("DELETE FROM sentence_audio WHERE expires_at <= {SQL_NOW}"),
                    [],
                )?,
                queue_entries: tx.execute(
                    "DELETE FROM queue WHERE status = 'completed'
                     AND updated_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1)",
                    params![retention],
                )?,
            };
            tx.commit()?;
            Ok(report)
        })
        .await
        .map_err(map_tr_err)
}

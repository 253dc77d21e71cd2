// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat job status rows.
//!
//! Terminal writes are conditional on `status = 'PROCESSING'`, so the first
//! terminal write for a request ID wins and later ones report `false`.

use parla_core::ParlaError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{ChatJobRecord, JobStatus, SQL_NOW, parse_column};

/// Insert a `PROCESSING` row. Returns `false` if the request ID already exists.
pub async fn create_job(db: &Database, job: &ChatJobRecord) -> Result<bool, ParlaError> {
    let job = job.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO chat_jobs
                 (request_id, conversation_id, student_email, status, created_at, updated_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    job.request_id,
                    job.conversation_id,
                    job.student_email,
                    JobStatus::Processing.to_string(),
                    job.created_at,
                    job.updated_at,
                    job.expires_at,
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Read a live job. Expired rows read as `None`.
pub async fn get_job(db: &Database, request_id: &str) -> Result<Option<ChatJobRecord>, ParlaError> {
    let request_id = request_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT request_id, conversation_id, student_email, status, ai_response,
                            turn_count, error, created_at, updated_at, expires_at
                     FROM chat_jobs WHERE request_id = ?1 AND expires_at > {SQL_NOW}"
                ),
                params![request_id],
                |row| {
                    Ok(ChatJobRecord {
                        request_id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        student_email: row.get(2)?,
                        status: parse_column(row, 3)?,
                        ai_response: row.get(4)?,
                        turn_count: row.get(5)?,
                        error: row.get(6)?,
                        created_at: row.get(7)?,
                        updated_at: row.get(8)?,
                        expires_at: row.get(9)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// `PROCESSING` -> `COMPLETED`. Returns whether the write applied.
pub async fn complete_job(
    db: &Database,
    request_id: &str,
    ai_response: &str,
    turn_count: u32,
) -> Result<bool, ParlaError> {
    let request_id = request_id.to_string();
    let ai_response = ai_response.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE chat_jobs SET status = 'COMPLETED', ai_response = ?1, turn_count = ?2,
                     updated_at = {SQL_NOW}
                     WHERE request_id = ?3 AND status = 'PROCESSING'"
                ),
                params![ai_response, turn_count, request_id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `PROCESSING` -> `FAILED`. Returns whether the write applied.
pub async fn fail_job(db: &Database, request_id: &str, error: &str) -> Result<bool, ParlaError> {
    let request_id = request_id.to_string();
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE chat_jobs SET status = 'FAILED', error = ?1, updated_at = {SQL_NOW}
                     WHERE request_id = ?2 AND status = 'PROCESSING'"
                ),
                params![error, request_id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

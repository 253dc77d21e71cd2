// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-sentence synthesis records, keyed by (session ID, sentence index).

use parla_core::ParlaError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{AudioStatus, SQL_NOW, SentenceAudioRecord, optional_u64, parse_column};

const SELECT_COLUMNS: &str = "SELECT session_id, sentence_index, english, korean, voice_id,
        status, storage_key, duration_ms, error_code, error_message,
        created_at, updated_at, expires_at
 FROM sentence_audio";

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SentenceAudioRecord> {
    Ok(SentenceAudioRecord {
        session_id: row.get(0)?,
        sentence_index: row.get(1)?,
        english: row.get(2)?,
        korean: row.get(3)?,
        voice_id: row.get(4)?,
        status: parse_column(row, 5)?,
        storage_key: row.get(6)?,
        duration_ms: optional_u64(row, 7)?,
        error_code: row.get(8)?,
        error_message: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        expires_at: row.get(12)?,
    })
}

/// Insert all records in one transaction.
///
/// A live record at any of the (session ID, index) pairs rejects the whole
/// call with a validation error, so a terminal record never goes back to
/// `PENDING`. Expired rows at those pairs are cleared first.
pub async fn create_records(
    db: &Database,
    records: &[SentenceAudioRecord],
) -> Result<(), ParlaError> {
    let records = records.to_vec();
    let taken = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut taken: Vec<(String, u32)> = Vec::new();
            {
                let mut clear = tx.prepare(&format!(
                    "DELETE FROM sentence_audio
                     WHERE session_id = ?1 AND sentence_index = ?2 AND expires_at <= {SQL_NOW}"
                ))?;
                let mut insert = tx.prepare(
                    "INSERT INTO sentence_audio
                     (session_id, sentence_index, english, korean, voice_id, status, storage_key,
                      duration_ms, error_code, error_message, created_at, updated_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                     ON CONFLICT (session_id, sentence_index) DO NOTHING",
                )?;
                for r in &records {
                    clear.execute(params![r.session_id, r.sentence_index])?;
                    let inserted = insert.execute(params![
                        r.session_id,
                        r.sentence_index,
                        r.english,
                        r.korean,
                        r.voice_id,
                        r.status.to_string(),
                        r.storage_key,
                        r.duration_ms.map(|d| d as i64),
                        r.error_code,
                        r.error_message,
                        r.created_at,
                        r.updated_at,
                        r.expires_at,
                    ])?;
                    if inserted == 0 {
                        taken.push((r.session_id.clone(), r.sentence_index));
                    }
                }
            }
            if taken.is_empty() {
                tx.commit()?;
            }
            Ok(taken)
        })
        .await
        .map_err(map_tr_err)?;

    match taken.first() {
        None => Ok(()),
        Some((session_id, _)) => {
            let indexes: Vec<String> = taken.iter().map(|(_, i)| i.to_string()).collect();
            Err(ParlaError::Validation(format!(
                "session {session_id} already has sentence records at index {}",
                indexes.join(", ")
            )))
        }
    }
}

/// All live records of a session, by sentence index.
pub async fn list_records(
    db: &Database,
    session_id: &str,
) -> Result<Vec<SentenceAudioRecord>, ParlaError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE session_id = ?1 AND expires_at > {SQL_NOW}
                 ORDER BY sentence_index ASC"
            ))?;
            let rows = stmt.query_map(params![session_id], map_record)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_record(
    db: &Database,
    session_id: &str,
    sentence_index: u32,
) -> Result<Option<SentenceAudioRecord>, ParlaError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "{SELECT_COLUMNS} WHERE session_id = ?1 AND sentence_index = ?2
                     AND expires_at > {SQL_NOW}"
                ),
                params![session_id, sentence_index],
                map_record,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// `PENDING` -> `COMPLETED` for the record staged with `storage_key`.
///
/// A job whose key no longer matches the record (the record was staged
/// again for different text) does not apply. Returns whether the write applied.
pub async fn complete_record(
    db: &Database,
    session_id: &str,
    sentence_index: u32,
    storage_key: &str,
    duration_ms: Option<u64>,
) -> Result<bool, ParlaError> {
    let session_id = session_id.to_string();
    let storage_key = storage_key.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE sentence_audio SET status = ?1, duration_ms = ?2, updated_at = {SQL_NOW}
                     WHERE session_id = ?3 AND sentence_index = ?4 AND storage_key = ?5
                       AND status = 'PENDING'"
                ),
                params![
                    AudioStatus::Completed.to_string(),
                    duration_ms.map(|d| d as i64),
                    session_id,
                    sentence_index,
                    storage_key,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `PENDING` -> `FAILED` for the record staged with `storage_key`.
/// Returns whether the write applied.
pub async fn fail_record(
    db: &Database,
    session_id: &str,
    sentence_index: u32,
    storage_key: &str,
    error_code: &str,
    error_message: &str,
) -> Result<bool, ParlaError> {
    let session_id = session_id.to_string();
    let storage_key = storage_key.to_string();
    let error_code = error_code.to_string();
    let error_message = error_message.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE sentence_audio SET status = ?1, error_code = ?2, error_message = ?3,
                     updated_at = {SQL_NOW}
                     WHERE session_id = ?4 AND sentence_index = ?5 AND storage_key = ?6
                       AND status = 'PENDING'"
                ),
                params![
                    AudioStatus::Failed.to_string(),
                    error_code,
                    error_message,
                    session_id,
                    sentence_index,
                    storage_key,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parla_core::types::{now_timestamp, timestamp_after};
    use std::time::Duration;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn pending(session: &str, index: u32) -> SentenceAudioRecord {
        let now = now_timestamp();
        SentenceAudioRecord {
            session_id: session.to_string(),
            sentence_index: index,
            english: format!("Sentence number {index}."),
            korean: Some(format!("문장 {index}")),
            voice_id: "voice-a".to_string(),
            status: AudioStatus::Pending,
            storage_key: format!("tts/voice-a/{index:064x}.mp3"),
            duration_ms: None,
            error_code: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
            expires_at: timestamp_after(Duration::from_secs(3600)),
        }
    }

    #[tokio::test]
    async fn list_returns_records_by_index() {
        let (db, _dir) = setup_db().await;
        let records: Vec<_> = [2, 0, 1].into_iter().map(|i| pending("S1", i)).collect();
        create_records(&db, &records).await.unwrap();
        create_records(&db, &[pending("S2", 0)]).await.unwrap();

        let listed = list_records(&db, "S1").await.unwrap();
        let indexes: Vec<u32> = listed.iter().map(|r| r.sentence_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(listed.iter().all(|r| r.status == AudioStatus::Pending));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn terminal_status_is_written_once() {
        let (db, _dir) = setup_db().await;
        create_records(&db, &[pending("S1", 0)]).await.unwrap();

        let key = pending("S1", 0).storage_key;
        assert!(complete_record(&db, "S1", 0, &key, Some(1250)).await.unwrap());
        assert!(!fail_record(&db, "S1", 0, &key, "TTS_FAILED", "late").await.unwrap());
        assert!(!complete_record(&db, "S1", 0, &key, Some(9)).await.unwrap());

        let record = get_record(&db, "S1", 0).await.unwrap().unwrap();
        assert_eq!(record.status, AudioStatus::Completed);
        assert_eq!(record.duration_ms, Some(1250));
        assert!(record.error_code.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failure_records_code_and_message() {
        let (db, _dir) = setup_db().await;
        create_records(&db, &[pending("S1", 4)]).await.unwrap();
        let key = pending("S1", 4).storage_key;
        assert!(
            fail_record(&db, "S1", 4, &key, "VOICE_NOT_FOUND", "unknown voice")
                .await
                .unwrap()
        );
        let record = get_record(&db, "S1", 4).await.unwrap().unwrap();
        assert_eq!(record.status, AudioStatus::Failed);
        assert_eq!(record.error_code.as_deref(), Some("VOICE_NOT_FOUND"));
        assert_eq!(record.error_message.as_deref(), Some("unknown voice"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_record_writes_do_not_apply() {
        let (db, _dir) = setup_db().await;
        assert!(!complete_record(&db, "none", 0, "k", None).await.unwrap());
        assert!(get_record(&db, "none", 0).await.unwrap().is_none());
        assert!(list_records(&db, "none").await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn restaging_a_taken_index_is_rejected_whole() {
        let (db, _dir) = setup_db().await;
        create_records(&db, &[pending("S1", 0)]).await.unwrap();
        let key = pending("S1", 0).storage_key;
        complete_record(&db, "S1", 0, &key, Some(700)).await.unwrap();

        let mut replacement = pending("S1", 0);
        replacement.english = "A different sentence.".into();
        let err = create_records(&db, &[pending("S1", 1), replacement])
            .await
            .unwrap_err();
        assert!(matches!(err, ParlaError::Validation(_)), "got {err:?}");
        assert!(err.to_string().contains("index 0"), "got {err}");

        let records = list_records(&db, "S1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AudioStatus::Completed);
        assert_eq!(records[0].english, "Sentence number 0.");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_record_can_be_staged_again() {
        let (db, _dir) = setup_db().await;
        let mut old = pending("S1", 0);
        old.expires_at = "2000-01-01T00:00:00.000Z".into();
        create_records(&db, &[old]).await.unwrap();

        let mut fresh = pending("S1", 0);
        fresh.english = "Fresh sentence.".into();
        create_records(&db, &[fresh]).await.unwrap();
        let record = get_record(&db, "S1", 0).await.unwrap().unwrap();
        assert_eq!(record.english, "Fresh sentence.");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn write_with_another_storage_key_does_not_apply() {
        let (db, _dir) = setup_db().await;
        create_records(&db, &[pending("S1", 0)]).await.unwrap();

        let stale = "tts/voice-a/not-this-sentence.mp3";
        assert!(!complete_record(&db, "S1", 0, stale, Some(5)).await.unwrap());
        assert!(!fail_record(&db, "S1", 0, stale, "TTS_FAILED", "x").await.unwrap());
        let record = get_record(&db, "S1", 0).await.unwrap().unwrap();
        assert_eq!(record.status, AudioStatus::Pending);
        db.close().await.unwrap();
    }
}

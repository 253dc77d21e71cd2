// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation and transcript operations.
//!
//! A conversation's turn count is `COUNT(*)` over its messages; positions are
//! dense from zero, so the next position is always the current count.

use parla_core::ParlaError;
use rusqlite::{OptionalExtension, Transaction, params};

use crate::database::{Database, map_tr_err};
use crate::models::{Conversation, Message, Role, SQL_NOW, TaggedAppend, TaggedMessage, parse_column};

/// Create a conversation together with any initial messages.
pub async fn create_conversation(
    db: &Database,
    conversation: &Conversation,
) -> Result<(), ParlaError> {
    let conversation = conversation.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversations
                 (id, owner, topic, difficulty, scenario, persona, created_at, updated_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8)",
                params![
                    conversation.id,
                    conversation.owner,
                    conversation.topic,
                    conversation.difficulty,
                    conversation.scenario,
                    conversation.persona,
                    conversation.created_at,
                    conversation.expires_at,
                ],
            )?;
            for (position, message) in conversation.messages.iter().enumerate() {
                insert_message(&tx, &conversation.id, position, message, None)?;
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// Read a live conversation and its transcript. Expired conversations read as `None`.
pub async fn get_conversation(
    db: &Database,
    id: &str,
) -> Result<Option<Conversation>, ParlaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let header = conn
                .query_row(
                    &format!(
                        "SELECT id, owner, topic, difficulty, scenario, persona, created_at, expires_at
                         FROM conversations WHERE id = ?1 AND expires_at > {SQL_NOW}"
                    ),
                    params![id],
                    |row| {
                        Ok(Conversation {
                            id: row.get(0)?,
                            owner: row.get(1)?,
                            topic: row.get(2)?,
                            difficulty: row.get(3)?,
                            scenario: row.get(4)?,
                            persona: row.get(5)?,
                            messages: Vec::new(),
                            created_at: row.get(6)?,
                            expires_at: row.get(7)?,
                        })
                    },
                )
                .optional()?;

            let Some(mut conversation) = header else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT role, content FROM conversation_messages
                 WHERE conversation_id = ?1 ORDER BY position ASC",
            )?;
            let rows = stmt.query_map(params![conversation.id], |row| {
                Ok(Message {
                    role: parse_column(row, 0)?,
                    content: row.get(1)?,
                })
            })?;
            conversation.messages = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(Some(conversation))
        })
        .await
        .map_err(map_tr_err)
}

/// Append a message at the end of a live transcript and refresh the expiry.
///
/// Returns the new message count.
pub async fn append_message(
    db: &Database,
    id: &str,
    message: &Message,
    expires_at: &str,
) -> Result<usize, ParlaError> {
    match append(db, id, message, None, expires_at).await? {
        Some(AppendOutcome::Appended(count)) => Ok(count),
        _ => Err(ParlaError::not_found("conversation", id)),
    }
}

/// Append only if the transcript currently holds `expected_count` messages.
///
/// Returns `Ok(None)` on a count mismatch and `NotFound` for a missing or
/// expired conversation.
pub async fn append_message_at(
    db: &Database,
    id: &str,
    message: &Message,
    expected_count: usize,
    expires_at: &str,
) -> Result<Option<usize>, ParlaError> {
    match append(db, id, message, Some(expected_count), expires_at).await? {
        Some(AppendOutcome::Appended(count)) => Ok(Some(count)),
        Some(AppendOutcome::CountMismatch) => Ok(None),
        None => Err(ParlaError::not_found("conversation", id)),
    }
}

enum AppendOutcome {
    Appended(usize),
    CountMismatch,
}

async fn append(
    db: &Database,
    id: &str,
    message: &Message,
    expected_count: Option<usize>,
    expires_at: &str,
) -> Result<Option<AppendOutcome>, ParlaError> {
    let id = id.to_string();
    let message = message.clone();
    let expires_at = expires_at.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let live: bool = tx.query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1 AND expires_at > {SQL_NOW})"
                ),
                params![id],
                |row| row.get(0),
            )?;
            if !live {
                return Ok(None);
            }

            let count = message_count(&tx, &id)?;
            if expected_count.is_some_and(|expected| expected != count) {
                return Ok(Some(AppendOutcome::CountMismatch));
            }

            insert_message(&tx, &id, count, &message, None)?;
            tx.execute(
                &format!(
                    "UPDATE conversations SET expires_at = ?1, updated_at = {SQL_NOW} WHERE id = ?2"
                ),
                params![expires_at, id],
            )?;
            tx.commit()?;
            Ok(Some(AppendOutcome::Appended(count + 1)))
        })
        .await
        .map_err(map_tr_err)
}

/// Append a message tagged with `request_id`, once per role.
///
/// Runs in one transaction: an existing message with the same role and tag
/// is reported as [`TaggedAppend::Existing`]; otherwise the message is only
/// stored while the resulting count stays below `limit`.
pub async fn append_tagged(
    db: &Database,
    id: &str,
    message: &Message,
    request_id: &str,
    limit: usize,
    expires_at: &str,
) -> Result<TaggedAppend, ParlaError> {
    let id_owned = id.to_string();
    let message = message.clone();
    let request_id = request_id.to_string();
    let expires_at = expires_at.to_string();
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let live: bool = tx.query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1 AND expires_at > {SQL_NOW})"
                ),
                params![id_owned],
                |row| row.get(0),
            )?;
            if !live {
                return Ok(None);
            }

            if let Some(existing) = tagged(&tx, &id_owned, message.role, &request_id)? {
                return Ok(Some(TaggedAppend::Existing {
                    content: existing.content,
                    turn_count: existing.turn_count,
                }));
            }

            let count = message_count(&tx, &id_owned)?;
            if count + 1 >= limit {
                return Ok(Some(TaggedAppend::LimitReached { turn_count: count }));
            }

            insert_message(&tx, &id_owned, count, &message, Some(&request_id))?;
            tx.execute(
                &format!(
                    "UPDATE conversations SET expires_at = ?1, updated_at = {SQL_NOW} WHERE id = ?2"
                ),
                params![expires_at, id_owned],
            )?;
            tx.commit()?;
            Ok(Some(TaggedAppend::Appended {
                turn_count: count + 1,
            }))
        })
        .await
        .map_err(map_tr_err)?;
    outcome.ok_or_else(|| ParlaError::not_found("conversation", id))
}

/// The message with `role` appended for `request_id`, if any.
pub async fn find_tagged(
    db: &Database,
    id: &str,
    role: Role,
    request_id: &str,
) -> Result<Option<TaggedMessage>, ParlaError> {
    let id = id.to_string();
    let request_id = request_id.to_string();
    db.connection()
        .call(move |conn| tagged(conn, &id, role, &request_id))
        .await
        .map_err(map_tr_err)
}

/// Move a live conversation's expiry.
pub async fn set_expiry(db: &Database, id: &str, expires_at: &str) -> Result<bool, ParlaError> {
    let id = id.to_string();
    let expires_at = expires_at.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE conversations SET expires_at = ?1, updated_at = {SQL_NOW}
                     WHERE id = ?2 AND expires_at > {SQL_NOW}"
                ),
                params![expires_at, id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

fn message_count(tx: &Transaction<'_>, id: &str) -> rusqlite::Result<usize> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM conversation_messages WHERE conversation_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn insert_message(
    tx: &Transaction<'_>,
    id: &str,
    position: usize,
    message: &Message,
    request_id: Option<&str>,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO conversation_messages (conversation_id, position, role, content, request_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            position as i64,
            message.role.to_string(),
            message.content,
            request_id
        ],
    )?;
    Ok(())
}

fn tagged(
    conn: &rusqlite::Connection,
    id: &str,
    role: Role,
    request_id: &str,
) -> rusqlite::Result<Option<TaggedMessage>> {
    conn.query_row(
        "SELECT position, content FROM conversation_messages
         WHERE conversation_id = ?1 AND role = ?2 AND request_id = ?3",
        params![id, role.to_string(), request_id],
        |row| {
            let position: i64 = row.get(0)?;
            Ok(TaggedMessage {
                content: row.get(1)?,
                turn_count: position as usize + 1,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parla_core::types::{format_timestamp, timestamp_after};
    use std::time::Duration;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn conversation(id: &str, expires_at: String) -> Conversation {
        Conversation {
            id: id.to_string(),
            owner: "student@example.com".to_string(),
            topic: "cafe".to_string(),
            difficulty: "beginner".to_string(),
            scenario: "Ordering coffee".to_string(),
            persona: "a friendly barista".to_string(),
            messages: vec![],
            created_at: parla_core::types::now_timestamp(),
            expires_at,
        }
    }

    fn hour() -> String {
        timestamp_after(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn create_and_read_back_in_order() {
        let (db, _dir) = setup_db().await;
        let mut conv = conversation("c1", hour());
        conv.messages = vec![Message::assistant("Welcome!"), Message::user("Hi")];
        create_conversation(&db, &conv).await.unwrap();

        let read = get_conversation(&db, "c1").await.unwrap().unwrap();
        assert_eq!(read.messages, conv.messages);
        assert_eq!(read.persona, "a friendly barista");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn append_increments_count_by_one() {
        let (db, _dir) = setup_db().await;
        create_conversation(&db, &conversation("c1", hour()))
            .await
            .unwrap();

        for expected in 1..=4 {
            let count = append_message(&db, "c1", &Message::user(format!("m{expected}")), &hour())
                .await
                .unwrap();
            assert_eq!(count, expected);
        }
        let read = get_conversation(&db, "c1").await.unwrap().unwrap();
        assert_eq!(read.messages.last().unwrap().content, "m4");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn conditional_append_rejects_stale_count() {
        let (db, _dir) = setup_db().await;
        create_conversation(&db, &conversation("c1", hour()))
            .await
            .unwrap();
        append_message(&db, "c1", &Message::user("hello"), &hour())
            .await
            .unwrap();

        let stale = append_message_at(&db, "c1", &Message::assistant("bye"), 0, &hour())
            .await
            .unwrap();
        assert_eq!(stale, None);

        let fresh = append_message_at(&db, "c1", &Message::assistant("bye"), 1, &hour())
            .await
            .unwrap();
        assert_eq!(fresh, Some(2));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_conversation_reads_as_absent() {
        let (db, _dir) = setup_db().await;
        let past = format_timestamp(chrono_past());
        create_conversation(&db, &conversation("old", past))
            .await
            .unwrap();

        assert!(get_conversation(&db, "old").await.unwrap().is_none());
        let err = append_message(&db, "old", &Message::user("hi"), &hour())
            .await
            .unwrap_err();
        assert!(matches!(err, ParlaError::NotFound { .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn append_refreshes_expiry() {
        let (db, _dir) = setup_db().await;
        create_conversation(&db, &conversation("c1", hour()))
            .await
            .unwrap();
        let later = timestamp_after(Duration::from_secs(86_400));
        append_message(&db, "c1", &Message::user("hello"), &later)
            .await
            .unwrap();
        let read = get_conversation(&db, "c1").await.unwrap().unwrap();
        assert_eq!(read.expires_at, later);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn tagged_append_is_once_per_role_and_request() {
        let (db, _dir) = setup_db().await;
        create_conversation(&db, &conversation("c1", hour()))
            .await
            .unwrap();

        let user = append_tagged(&db, "c1", &Message::user("Hi"), "R1", 15, &hour())
            .await
            .unwrap();
        assert_eq!(user, TaggedAppend::Appended { turn_count: 1 });
        let reply = append_tagged(&db, "c1", &Message::assistant("Hello!"), "R1", 15, &hour())
            .await
            .unwrap();
        assert_eq!(reply, TaggedAppend::Appended { turn_count: 2 });

        let again = append_tagged(&db, "c1", &Message::assistant("Hi again!"), "R1", 15, &hour())
            .await
            .unwrap();
        assert_eq!(
            again,
            TaggedAppend::Existing {
                content: "Hello!".into(),
                turn_count: 2
            }
        );
        let found = find_tagged(&db, "c1", Role::User, "R1").await.unwrap().unwrap();
        assert_eq!(found.turn_count, 1);
        assert!(find_tagged(&db, "c1", Role::User, "R2").await.unwrap().is_none());

        let read = get_conversation(&db, "c1").await.unwrap().unwrap();
        assert_eq!(read.turn_count(), 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn tagged_append_keeps_the_last_slot_free() {
        let (db, _dir) = setup_db().await;
        let mut conv = conversation("c1", hour());
        conv.messages = (0..3).map(|i| Message::user(format!("m{i}"))).collect();
        create_conversation(&db, &conv).await.unwrap();

        let outcome = append_tagged(&db, "c1", &Message::assistant("late"), "R9", 4, &hour())
            .await
            .unwrap();
        assert_eq!(outcome, TaggedAppend::LimitReached { turn_count: 3 });
        let read = get_conversation(&db, "c1").await.unwrap().unwrap();
        assert_eq!(read.turn_count(), 3);

        let err = append_tagged(&db, "missing", &Message::user("x"), "R1", 15, &hour())
            .await
            .unwrap_err();
        assert!(matches!(err, ParlaError::NotFound { .. }));
        db.close().await.unwrap();
    }

    fn chrono_past() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now() - chrono::Duration::seconds(5)
    }
}

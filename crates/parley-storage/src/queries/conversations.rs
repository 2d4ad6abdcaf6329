// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation history operations.

use parley_core::ParleyError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::ConversationRecord;

/// Current time in the format stored in `conversations.timestamp`.
pub fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Append one completed exchange and return its row id.
pub async fn insert_conversation(
    db: &Database,
    user_id: i64,
    chat_id: i64,
    user_message: &str,
    bot_response: &str,
    timestamp: &str,
) -> Result<i64, ParleyError> {
    let user_message = user_message.to_string();
    let bot_response = bot_response.to_string();
    let timestamp = timestamp.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO conversations (user_id, chat_id, user_message, bot_response, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, chat_id, user_message, bot_response, timestamp],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// The newest `limit` records for (user, chat), returned oldest first.
pub async fn recent_conversations(
    db: &Database,
    user_id: i64,
    chat_id: i64,
    limit: usize,
) -> Result<Vec<ConversationRecord>, ParleyError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<ConversationRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, chat_id, user_message, bot_response, timestamp
                 FROM conversations WHERE user_id = ?1 AND chat_id = ?2
                 ORDER BY timestamp DESC, id DESC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![user_id, chat_id, limit], |row| {
                Ok(ConversationRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    chat_id: row.get(2)?,
                    user_message: row.get(3)?,
                    bot_response: row.get(4)?,
                    timestamp: row.get(5)?,
                })
            })?;
            let mut records = rows.collect::<Result<Vec<_>, _>>()?;
            records.reverse();
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete all but the newest `keep` records for (user, chat).
///
/// Returns the number of rows deleted.
pub async fn prune_conversations(
    db: &Database,
    user_id: i64,
    chat_id: i64,
    keep: usize,
) -> Result<usize, ParleyError> {
    let keep = i64::try_from(keep).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM conversations
                 WHERE user_id = ?1 AND chat_id = ?2 AND id NOT IN (
                     SELECT id FROM conversations
                     WHERE user_id = ?1 AND chat_id = ?2
                     ORDER BY timestamp DESC, id DESC LIMIT ?3
                 )",
                params![user_id, chat_id, keep],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Delete every record for (user, chat).
pub async fn delete_conversations(
    db: &Database,
    user_id: i64,
    chat_id: i64,
) -> Result<usize, ParleyError> {
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM conversations WHERE user_id = ?1 AND chat_id = ?2",
                params![user_id, chat_id],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Delete every record for every user.
pub async fn delete_all_conversations(db: &Database) -> Result<usize, ParleyError> {
    db.connection()
        .call(|conn| -> Result<usize, rusqlite::Error> {
            conn.execute("DELETE FROM conversations", [])
        })
        .await
        .map_err(map_tr_err)
}

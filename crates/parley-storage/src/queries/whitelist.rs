// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whitelist operations.

use parley_core::ParleyError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::WhitelistEntry;

pub async fn get_entry(db: &Database, chat_id: i64) -> Result<Option<WhitelistEntry>, ParleyError> {
    db.connection()
        .call(move |conn| -> Result<Option<WhitelistEntry>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, chat_id FROM whitelist WHERE chat_id = ?1",
                params![chat_id],
                |row| {
                    Ok(WhitelistEntry {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert `chat_id` unless present; returns the stored entry either way.
pub async fn insert_entry(db: &Database, chat_id: i64) -> Result<WhitelistEntry, ParleyError> {
    db.connection()
        .call(move |conn| -> Result<WhitelistEntry, rusqlite::Error> {
            conn.execute(
                "INSERT OR IGNORE INTO whitelist (chat_id) VALUES (?1)",
                params![chat_id],
            )?;
            conn.query_row(
                "SELECT id, chat_id FROM whitelist WHERE chat_id = ?1",
                params![chat_id],
                |row| {
                    Ok(WhitelistEntry {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                    })
                },
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Returns whether a row was removed.
pub async fn delete_entry(db: &Database, chat_id: i64) -> Result<bool, ParleyError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let n = conn.execute("DELETE FROM whitelist WHERE chat_id = ?1", params![chat_id])?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// All whitelisted chat ids in insertion order.
pub async fn list_chat_ids(db: &Database) -> Result<Vec<i64>, ParleyError> {
    db.connection()
        .call(|conn| -> Result<Vec<i64>, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT chat_id FROM whitelist ORDER BY id ASC")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

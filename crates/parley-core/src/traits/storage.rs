// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for conversation history and the chat whitelist.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ConversationRecord, WhitelistEntry};

/// Persistence backend for conversation history and access control.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the backend (opens the database, runs migrations).
    async fn initialize(&self) -> Result<(), ParleyError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), ParleyError>;

    // --- Conversation history ---

    /// Records one completed exchange.
    async fn save_conversation(
        &self,
        user_id: i64,
        chat_id: i64,
        user_message: &str,
        bot_response: &str,
    ) -> Result<(), ParleyError>;

    /// The newest `limit` records for (user, chat), ordered oldest first.
    async fn conversation_history(
        &self,
        user_id: i64,
        chat_id: i64,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>, ParleyError>;

    /// Deletes all but the newest `keep` records for (user, chat).
    /// Returns the number of records deleted.
    async fn prune_conversations(
        &self,
        user_id: i64,
        chat_id: i64,
        keep: usize,
    ) -> Result<usize, ParleyError>;

    /// Deletes every record for (user, chat).
    async fn clear_conversations(&self, user_id: i64, chat_id: i64) -> Result<usize, ParleyError>;

    /// Deletes every record for every user.
    async fn clear_all_conversations(&self) -> Result<usize, ParleyError>;

    // --- Whitelist ---

    async fn get_whitelisted(&self, chat_id: i64) -> Result<Option<WhitelistEntry>, ParleyError>;

    /// Adds `chat_id`, returning the existing entry if it is already present.
    async fn add_whitelisted(&self, chat_id: i64) -> Result<WhitelistEntry, ParleyError>;

    /// Removes `chat_id`. Returns whether an entry existed.
    async fn remove_whitelisted(&self, chat_id: i64) -> Result<bool, ParleyError>;

    async fn list_whitelisted(&self) -> Result<Vec<i64>, ParleyError>;
}

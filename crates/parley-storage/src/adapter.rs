// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use parley_config::model::StorageConfig;
use parley_core::types::{ConversationRecord, WhitelistEntry};
use parley_core::{AdapterType, HealthStatus, ParleyError, PluginAdapter, StorageAdapter};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened by [`StorageAdapter::initialize`]; every other call
/// fails until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already-open database. Used by tests and tools.
    pub fn from_database(config: StorageConfig, db: Database) -> Self {
        Self {
            config,
            db: OnceCell::new_with(Some(db)),
        }
    }

    fn db(&self) -> Result<&Database, ParleyError> {
        self.db.get().ok_or_else(|| ParleyError::Storage {
            source: "storage not initialized, call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        self.close().await
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ParleyError::Storage {
            source: "storage already initialized".into(),
        })?;
        info!(path = %self.config.database_path, "storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("storage closed");
        }
        Ok(())
    }

    async fn save_conversation(
        &self,
        user_id: i64,
        chat_id: i64,
        user_message: &str,
        bot_response: &str,
    ) -> Result<(), ParleyError> {
        let timestamp = queries::conversations::now_timestamp();
        queries::conversations::insert_conversation(
            self.db()?,
            user_id,
            chat_id,
            user_message,
            bot_response,
            &timestamp,
        )
        .await?;
        Ok(())
    }

    async fn conversation_history(
        &self,
        user_id: i64,
        chat_id: i64,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>, ParleyError> {
        queries::conversations::recent_conversations(self.db()?, user_id, chat_id, limit).await
    }

    async fn prune_conversations(
        &self,
        user_id: i64,
        chat_id: i64,
        keep: usize,
    ) -> Result<usize, ParleyError> {
        let deleted =
            queries::conversations::prune_conversations(self.db()?, user_id, chat_id, keep).await?;
        if deleted > 0 {
            debug!(user_id, chat_id, deleted, "pruned conversation history");
        }
        Ok(deleted)
    }

    async fn clear_conversations(&self, user_id: i64, chat_id: i64) -> Result<usize, ParleyError> {
        queries::conversations::delete_conversations(self.db()?, user_id, chat_id).await
    }

    async fn clear_all_conversations(&self) -> Result<usize, ParleyError> {
        queries::conversations::delete_all_conversations(self.db()?).await
    }

    async fn get_whitelisted(&self, chat_id: i64) -> Result<Option<WhitelistEntry>, ParleyError> {
        queries::whitelist::get_entry(self.db()?, chat_id).await
    }

    async fn add_whitelisted(&self, chat_id: i64) -> Result<WhitelistEntry, ParleyError> {
        queries::whitelist::insert_entry(self.db()?, chat_id).await
    }

    async fn remove_whitelisted(&self, chat_id: i64) -> Result<bool, ParleyError> {
        queries::whitelist::delete_entry(self.db()?, chat_id).await
    }

    async fn list_whitelisted(&self) -> Result<Vec<i64>, ParleyError> {
        queries::whitelist::list_chat_ids(self.db()?).await
    }
}

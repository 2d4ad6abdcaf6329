// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access control for incoming messages.
//!
//! Sudoers always pass. Everyone else needs a whitelist entry: the chat id in
//! groups, the user id in private chats. Messages without a sender are
//! rejected.

use std::collections::HashSet;
use std::sync::Arc;

use parley_core::StorageAdapter;
use teloxide::types::Message;
use tracing::{debug, error};

use crate::handler::{sender_id, whitelist_key};

pub struct AccessFilter {
    sudoers: HashSet<i64>,
    storage: Arc<dyn StorageAdapter>,
}

impl AccessFilter {
    pub fn new(sudoers: impl IntoIterator<Item = i64>, storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            sudoers: sudoers.into_iter().collect(),
            storage,
        }
    }

    pub fn is_sudoer(&self, msg: &Message) -> bool {
        sender_id(msg).is_some_and(|id| self.sudoers.contains(&id))
    }

    /// Whether the bot should answer `msg` at all.
    ///
    /// A storage failure denies access.
    pub async fn allows(&self, msg: &Message) -> bool {
        if sender_id(msg).is_none() {
            return false;
        }
        if self.is_sudoer(msg) {
            return true;
        }
        let Some(key) = whitelist_key(msg) else {
            return false;
        };
        match self.storage.get_whitelisted(key).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!(chat_id = msg.chat.id.0, key, "ignoring message from non-whitelisted chat");
                false
            }
            Err(e) => {
                error!(key, error = %e, "whitelist lookup failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use parley_test_utils::memory_storage;

    use super::*;
    use crate::handler::tests::{group_message, private_message};

    async fn filter(sudoers: Vec<i64>) -> (AccessFilter, Arc<dyn StorageAdapter>) {
        let storage: Arc<dyn StorageAdapter> = memory_storage().await.unwrap();
        (AccessFilter::new(sudoers, storage.clone()), storage)
    }

    #[tokio::test]
    async fn sudoers_always_pass() {
        let (filter, _) = filter(vec![1]).await;
        assert!(filter.allows(&private_message(1, "hi")).await);
        assert!(filter.allows(&group_message(1, "hi")).await);
        assert!(filter.is_sudoer(&private_message(1, "hi")));
    }

    #[tokio::test]
    async fn private_chats_need_user_whitelisted() {
        let (filter, storage) = filter(vec![]).await;
        assert!(!filter.allows(&private_message(7, "hi")).await);

        storage.add_whitelisted(7).await.unwrap();
        assert!(filter.allows(&private_message(7, "hi")).await);
    }

    #[tokio::test]
    async fn groups_need_chat_whitelisted() {
        let (filter, storage) = filter(vec![]).await;
        storage.add_whitelisted(7).await.unwrap();
        // The user being whitelisted does not open up the group.
        assert!(!filter.allows(&group_message(7, "hi")).await);

        storage.add_whitelisted(-100123).await.unwrap();
        assert!(filter.allows(&group_message(8, "hi")).await);
    }
}

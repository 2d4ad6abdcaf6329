// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation assembly for Parley completion requests.
//!
//! A request is built from three parts:
//! - **System message**: the base prompt plus a per-request session block
//! - **History**: the newest stored exchanges for the (user, chat) pair
//! - **User turn**: the prompt, with reply context folded in and any image
//!   attached as a separate content item
//!
//! The assembled list is reduced to the token budget by [`ContextTruncator`]
//! before every completion call.

pub mod history;
pub mod locale;
pub mod reply;
pub mod system_prompt;
pub mod truncator;

use std::sync::Arc;

use chrono::Utc;
use parley_config::model::{BotConfig, ContextConfig};
use parley_core::{ContentItem, ImageRef, Message, ParleyError, StorageAdapter, TokenEstimator};
use tracing::debug;

pub use history::history_to_messages;
pub use locale::LocaleInfo;
pub use reply::{Participants, ReplyAuthor, ReplyTarget, build_reply_prompt};
pub use system_prompt::{DEFAULT_SYSTEM_PROMPT, SessionUser, SystemPrompt};
pub use truncator::{ContextTruncator, MIN_CONVERSATION_LEN, TRUNCATION_SUFFIX};

/// One inbound user turn, already stripped of bot directives.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub user_id: i64,
    pub chat_id: i64,
    /// Reported in the session block when the sender has a name.
    pub user: Option<SessionUser>,
    /// Prompt text, including any reply context.
    pub prompt: String,
    pub image: Option<ImageRef>,
}

impl TurnRequest {
    /// The user message for this turn.
    ///
    /// With an image this is a multi-part message: the prompt text (when
    /// non-empty) followed by the image.
    pub fn user_message(&self) -> Message {
        match &self.image {
            Some(image) => {
                let mut parts = Vec::with_capacity(2);
                if !self.prompt.is_empty() {
                    parts.push(ContentItem::Text(self.prompt.clone()));
                }
                parts.push(ContentItem::Image(image.clone()));
                Message::user_parts(parts)
            }
            None => Message::user(self.prompt.as_str()),
        }
    }
}

/// Builds the untruncated message list for a turn.
pub struct ContextEngine {
    system_prompt: SystemPrompt,
    truncator: ContextTruncator,
    history_limit: usize,
}

impl ContextEngine {
    /// Loads the system prompt and sizes the truncator from config.
    pub async fn new(
        bot_config: &BotConfig,
        context_config: &ContextConfig,
        estimator: Arc<TokenEstimator>,
    ) -> Self {
        let system_prompt = SystemPrompt::load(bot_config).await;
        let truncator = ContextTruncator::from_config(estimator, context_config);
        Self::from_parts(system_prompt, truncator, context_config.history_limit)
    }

    pub fn from_parts(
        system_prompt: SystemPrompt,
        truncator: ContextTruncator,
        history_limit: usize,
    ) -> Self {
        Self {
            system_prompt,
            truncator,
            history_limit,
        }
    }

    pub fn system_prompt(&self) -> &SystemPrompt {
        &self.system_prompt
    }

    pub fn truncator(&self) -> &ContextTruncator {
        &self.truncator
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Returns `[system, ...history, user]`.
    ///
    /// Truncation is left to the caller, which re-applies it on every tool
    /// round as the list grows.
    pub async fn assemble(
        &self,
        storage: &dyn StorageAdapter,
        turn: &TurnRequest,
    ) -> Result<Vec<Message>, ParleyError> {
        let records = storage
            .conversation_history(turn.user_id, turn.chat_id, self.history_limit)
            .await?;

        let mut messages = Vec::with_capacity(records.len() * 2 + 2);
        messages.push(self.system_prompt.render(turn.user.as_ref(), Utc::now()));
        messages.extend(history_to_messages(&records));
        messages.push(turn.user_message());

        debug!(
            user_id = turn.user_id,
            chat_id = turn.chat_id,
            history = records.len(),
            has_image = turn.image.is_some(),
            "assembled conversation"
        );
        Ok(messages)
    }
}

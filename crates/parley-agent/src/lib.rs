// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation pipeline for the Parley chatbot.
//!
//! The [`ChatService`] is the coordinator for one chat turn:
//! - Resolves the model from a `use:` directive and the attachment
//! - Assembles history and the system prompt
//! - Runs the tool loop, falling back when the default model is rate limited
//! - Records the exchange and prunes history
//!
//! Around it sit the [`MessageQueue`] that serializes turns per (user, chat),
//! the [`RateLimiter`] that gates them, and the [`SearchService`] behind
//! `/search`.

pub mod completion;
pub mod processor;
pub mod queue;
pub mod rate_limit;
pub mod search;
pub mod shutdown;
pub mod tool_loop;
pub mod tracker;

use std::sync::Arc;

use parley_context::{
    ContextEngine, Participants, ReplyTarget, SessionUser, TurnRequest, build_reply_prompt,
};
use parley_core::{AIModel, ImageRef, ParleyError, StorageAdapter};
use tracing::{debug, error, info, warn};

pub use completion::{Completion, CompletionService, FallbackPolicy};
pub use queue::{MessageQueue, QueueKey};
pub use rate_limit::{Decision, RateLimiter};
pub use search::{SearchReply, SearchService};
pub use shutdown::{Lifecycle, ShutdownReason, install_signal_handler};
pub use tool_loop::ToolLoop;
pub use tracker::RateLimitTracker;

use crate::processor::{
    clean_response, format_reply, parse_model_directive, select_model, user_facing_error,
};

/// One inbound message, as the transport hands it over.
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    pub user_id: i64,
    pub chat_id: i64,
    pub user: Option<SessionUser>,
    /// Message text or caption, possibly carrying a `use:` directive.
    pub text: String,
    /// The message this one replies to, if any.
    pub reply: Option<ReplyTarget>,
    pub image: Option<ImageRef>,
    /// Forget this chat's history before answering.
    pub clear_history: bool,
}

/// What to send back for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    /// Model that answered; `None` when the turn failed.
    pub model: Option<String>,
}

/// Runs chat turns end to end.
pub struct ChatService {
    storage: Arc<dyn StorageAdapter>,
    context: ContextEngine,
    completion: CompletionService,
    default_model: AIModel,
    bot_id: Option<i64>,
}

impl ChatService {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        context: ContextEngine,
        completion: CompletionService,
        bot_id: Option<i64>,
    ) -> Self {
        let configured = completion.policy().default_model.as_str();
        let default_model = AIModel::from_identifier(configured).unwrap_or_else(|| {
            warn!(model = configured, "default model is not in the registry");
            AIModel::Gpt41
        });
        info!(default_model = %default_model, "chat service initialized");
        Self {
            storage,
            context,
            completion,
            default_model,
            bot_id,
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn completion(&self) -> &CompletionService {
        &self.completion
    }

    /// Answers `turn`, turning failures into user-facing text.
    ///
    /// Returns `None` when there is nothing to answer (no text and no image).
    pub async fn respond(&self, turn: ChatTurn) -> Option<ChatReply> {
        let (user_id, chat_id) = (turn.user_id, turn.chat_id);
        match self.complete_turn(turn).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(user_id, chat_id, error = %e, "chat turn failed");
                Some(ChatReply {
                    text: user_facing_error(&e),
                    model: None,
                })
            }
        }
    }

    /// Answers `turn`, propagating failures.
    pub async fn complete_turn(&self, turn: ChatTurn) -> Result<Option<ChatReply>, ParleyError> {
        if turn.clear_history {
            let cleared = self
                .storage
                .clear_conversations(turn.user_id, turn.chat_id)
                .await?;
            debug!(user_id = turn.user_id, chat_id = turn.chat_id, cleared, "history cleared");
        }

        let (prompt, requested) = parse_model_directive(&turn.text, self.default_model);
        if prompt.is_empty() && turn.image.is_none() {
            return Ok(None);
        }
        let model = select_model(requested, turn.image.is_some(), self.default_model);

        // Images go out with their caption only.
        let full_prompt = if turn.image.is_some() {
            prompt.clone()
        } else {
            let participants = Participants {
                bot_id: self.bot_id,
                sender_id: Some(turn.user_id),
            };
            build_reply_prompt(&prompt, turn.reply.as_ref(), participants)
        };

        let request = TurnRequest {
            user_id: turn.user_id,
            chat_id: turn.chat_id,
            user: turn.user,
            prompt: full_prompt,
            image: turn.image,
        };
        let messages = self.context.assemble(self.storage.as_ref(), &request).await?;

        let completion = self
            .completion
            .complete_chat(messages, model.identifier())
            .await?;
        let answer = clean_response(&completion.text);
        if answer.is_empty() {
            return Err(ParleyError::EmptyResponse {
                model: completion.model,
            });
        }
        info!(
            user_id = request.user_id,
            chat_id = request.chat_id,
            model = completion.model.as_str(),
            "chat turn answered"
        );

        self.record(request.user_id, request.chat_id, &prompt, &answer)
            .await;

        Ok(Some(ChatReply {
            text: format_reply(&completion.model, &answer),
            model: Some(completion.model),
        }))
    }

    /// Saves an exchange and prunes the chat's history to its limit.
    ///
    /// A storage failure is logged; the reply is still delivered.
    pub async fn record(&self, user_id: i64, chat_id: i64, prompt: &str, answer: &str) {
        if let Err(e) = self
            .storage
            .save_conversation(user_id, chat_id, prompt, answer)
            .await
        {
            warn!(user_id, chat_id, error = %e, "failed to save conversation");
            return;
        }
        match self
            .storage
            .prune_conversations(user_id, chat_id, self.context.history_limit())
            .await
        {
            Ok(0) => {}
            Ok(pruned) => debug!(user_id, chat_id, pruned, "pruned conversation history"),
            Err(e) => warn!(user_id, chat_id, error = %e, "failed to prune conversation history"),
        }
    }
}

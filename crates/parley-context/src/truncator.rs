// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-budget truncation of a conversation before it is sent to a model.
//!
//! The first message (the system message) and the newest pair are always kept
//! whole. Older turns are added back newest-first while they fit; the first
//! one that does not fit is cut down to the remaining budget if possible, and
//! everything older than it is dropped.

use std::sync::Arc;

use parley_config::model::ContextConfig;
use parley_core::{ContentItem, Message, TokenEstimator, UserContent};
use tracing::debug;

/// Appended to a turn whose text was cut.
pub const TRUNCATION_SUFFIX: &str = "[...]";

/// Conversations this short are never truncated.
pub const MIN_CONVERSATION_LEN: usize = 3;

/// Tokens held back from a partial inclusion to make room for the suffix.
const TRUNCATION_BUFFER_TOKENS: usize = 3;

/// Reduces message lists to a token budget.
///
/// Cheap to clone; the estimator and its tokenizer cache are shared.
#[derive(Debug, Clone)]
pub struct ContextTruncator {
    estimator: Arc<TokenEstimator>,
    token_budget: usize,
}

impl ContextTruncator {
    pub fn new(estimator: Arc<TokenEstimator>, token_budget: usize) -> Self {
        Self {
            estimator,
            token_budget,
        }
    }

    pub fn from_config(estimator: Arc<TokenEstimator>, config: &ContextConfig) -> Self {
        Self::new(estimator, config.token_truncate_limit)
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    pub fn estimator(&self) -> &Arc<TokenEstimator> {
        &self.estimator
    }

    /// Returns the subsequence of `messages` that fits the budget.
    ///
    /// Never fails. The result is `[messages[0], ...kept older, ...newest pair]`
    /// in the original order. Lists of [`MIN_CONVERSATION_LEN`] or fewer
    /// messages are returned unchanged.
    pub fn truncate(&self, messages: &[Message], model: &str) -> Vec<Message> {
        let Some((system, rest)) = messages.split_first() else {
            return Vec::new();
        };
        if messages.len() <= MIN_CONVERSATION_LEN {
            return messages.to_vec();
        }

        let (older, newest) = rest.split_at(rest.len() - newest_pair_len(rest));

        let reserved = self.estimator.message_tokens(system, model)
            + self.estimator.messages_tokens(newest, model);
        let mut available = self.token_budget.saturating_sub(reserved);

        let mut kept = Vec::new();
        for message in older.iter().rev() {
            let cost = self.estimator.message_tokens(message, model);
            if cost <= available {
                kept.push(message.clone());
                available -= cost;
                if available == 0 {
                    break;
                }
                continue;
            }
            if let Some(partial) = self.truncate_message(message, available, model) {
                kept.push(partial);
            }
            break;
        }
        kept.reverse();

        // A tool result whose calling assistant turn was dropped cannot be sent.
        let orphaned = kept
            .iter()
            .take_while(|m| matches!(m, Message::ToolResult { .. }))
            .count();
        kept.drain(..orphaned);

        let mut result = Vec::with_capacity(1 + kept.len() + newest.len());
        result.push(system.clone());
        result.extend(kept);
        result.extend_from_slice(newest);

        if result.len() < messages.len() {
            debug!(
                original = messages.len(),
                kept = result.len(),
                tokens = self.estimator.messages_tokens(&result, model),
                budget = self.token_budget,
                model,
                "truncated conversation to fit token budget"
            );
        }
        result
    }

    /// Cuts the text of `message` to fit `available` tokens.
    ///
    /// Returns `None` when nothing useful fits or the message has no
    /// truncatable text (system, tool results, assistant tool calls).
    fn truncate_message(&self, message: &Message, available: usize, model: &str) -> Option<Message> {
        let limit = available.checked_sub(TRUNCATION_BUFFER_TOKENS)?;
        if limit == 0 {
            return None;
        }

        match message {
            Message::User {
                content: UserContent::Text(text),
            } => self.truncate_text(text, model, limit).map(Message::user),
            Message::User {
                content: UserContent::Parts(parts),
            } => self.truncate_parts(parts, model, limit).map(Message::user_parts),
            Message::Assistant {
                content,
                tool_calls,
            } if tool_calls.is_empty() => {
                self.truncate_text(content, model, limit).map(Message::assistant)
            }
            Message::System { .. } | Message::Assistant { .. } | Message::ToolResult { .. } => {
                None
            }
        }
    }

    /// Shares `limit` across the text items in order; images pass through.
    fn truncate_parts(
        &self,
        parts: &[ContentItem],
        model: &str,
        limit: usize,
    ) -> Option<Vec<ContentItem>> {
        let mut remaining = limit;
        let mut changed = false;
        let mut out = Vec::with_capacity(parts.len());

        for item in parts {
            match item {
                ContentItem::Image(_) => out.push(item.clone()),
                ContentItem::Text(text) if changed || remaining == 0 => {
                    // Budget is spent; later text is dropped rather than cut.
                    if text.is_empty() {
                        out.push(item.clone());
                    }
                    changed = true;
                }
                ContentItem::Text(text) => {
                    let cost = self.estimator.encode_length(text, model);
                    if cost <= remaining {
                        remaining -= cost;
                        out.push(item.clone());
                    } else {
                        let cut = self.truncate_text(text, model, remaining)?;
                        out.push(ContentItem::Text(cut));
                        changed = true;
                    }
                }
            }
        }

        changed.then_some(out)
    }

    fn truncate_text(&self, text: &str, model: &str, limit: usize) -> Option<String> {
        let mut cut = self.estimator.truncate_to(text, model, limit);
        if cut == text {
            return None;
        }
        cut.push_str(TRUNCATION_SUFFIX);
        Some(cut)
    }
}

/// Length of the newest pair at the end of `rest` (which excludes the
/// system message): the last message, plus the one before it when that one
/// is an assistant turn.
fn newest_pair_len(rest: &[Message]) -> usize {
    match rest {
        [] => 0,
        [.., previous, _] if previous.is_assistant() => 2,
        _ => 1,
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Field extraction from Telegram messages.
//!
//! Maps teloxide types onto the chat type, sender, and reply context the
//! agent works with.

use parley_context::{ReplyTarget, SessionUser};
use parley_core::ChatType;
use teloxide::types::Message;

/// The chat kind of `msg`.
pub fn chat_type(msg: &Message) -> ChatType {
    if msg.chat.is_private() {
        ChatType::Private
    } else if msg.chat.is_supergroup() {
        ChatType::Supergroup
    } else if msg.chat.is_group() {
        ChatType::Group
    } else {
        ChatType::Channel
    }
}

/// The sender's user id. Channel posts have none.
pub fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|user| user.id.0 as i64)
}

/// Name and language of the sender, for the system prompt.
pub fn session_user(msg: &Message) -> Option<SessionUser> {
    msg.from.as_ref().map(|user| SessionUser {
        full_name: user.full_name(),
        language_code: user.language_code.clone(),
    })
}

/// The message `msg` replies to, as prompt context.
///
/// Replies without text or caption, or without a known sender, give `None`.
pub fn reply_target(msg: &Message) -> Option<ReplyTarget> {
    let reply = msg.reply_to_message()?;
    let content = reply.text().or(reply.caption())?;
    let sender = reply.from.as_ref()?;
    Some(ReplyTarget {
        content: content.to_string(),
        sender_id: sender.id.0 as i64,
        sender_name: sender.full_name(),
    })
}

/// The id the whitelist is keyed on: the chat for groups, the user otherwise.
pub fn whitelist_key(msg: &Message) -> Option<i64> {
    if chat_type(msg).is_group() {
        Some(msg.chat.id.0)
    } else {
        sender_id(msg)
    }
}

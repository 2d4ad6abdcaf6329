// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot commands and message routing.
//!
//! [`route`] decides what an incoming message asks for: a command, a chat
//! turn, or nothing. It is pure so the routing rules can be tested against
//! plain message fixtures.

use teloxide::types::Message;
use teloxide::utils::command::BotCommands;

use crate::handler::chat_type;
use parley_core::ChatType;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "start a fresh conversation with the AI")]
    Ai(String),
    #[command(description = "ask the AI, keeping the conversation")]
    Ask(String),
    #[command(description = "clear your history in this chat")]
    Reset,
    #[command(description = "clear history for all users (sudo)")]
    Resetall,
    #[command(description = "answer a question from web search results")]
    Search(String),
    #[command(description = "list supported models")]
    Models,
    #[command(description = "whitelist a chat id (sudo)")]
    Allow(String),
    #[command(description = "remove a chat id from the whitelist (sudo)")]
    Disallow(String),
    #[command(description = "list whitelisted chat ids (sudo)")]
    List,
    #[command(description = "pull new code and restart (sudo)")]
    Upgrade,
}

impl Command {
    /// Commands only privileged users may run.
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Self::Resetall | Self::Allow(_) | Self::Disallow(_) | Self::List | Self::Upgrade
        )
    }
}

/// What to do with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    /// Send `text` (and any attached image) to the model.
    Chat { text: String, clear_history: bool },
    Ignore,
}

/// Routes `msg` for a bot with the given id and username.
///
/// In private chats every non-command message is a chat turn. In groups the
/// bot answers `/ai`, `/ask`, and replies to its own messages.
pub fn route(msg: &Message, bot_id: i64, bot_username: &str) -> Route {
    let text = msg.text().or(msg.caption()).unwrap_or_default();

    if text.starts_with('/') {
        return match Command::parse(text, bot_username) {
            Ok(Command::Ai(prompt)) => Route::Chat {
                text: prompt,
                clear_history: true,
            },
            Ok(Command::Ask(prompt)) => Route::Chat {
                text: prompt,
                clear_history: false,
            },
            Ok(command) => Route::Command(command),
            Err(_) => Route::Ignore,
        };
    }

    let is_reply_to_bot = msg
        .reply_to_message()
        .and_then(|reply| reply.from.as_ref())
        .is_some_and(|user| user.id.0 as i64 == bot_id);

    match chat_type(msg) {
        ChatType::Private => Route::Chat {
            text: text.to_string(),
            clear_history: false,
        },
        t if t.is_group() && is_reply_to_bot => Route::Chat {
            text: text.to_string(),
            clear_history: false,
        },
        _ => Route::Ignore,
    }
}

/// The first whitespace-separated token of a command argument as a chat id.
pub fn parse_chat_id(args: &str) -> Result<i64, &'static str> {
    let first = args.split_whitespace().next().ok_or("You must provide a chat ID.")?;
    first
        .parse()
        .map_err(|_| "The chat ID must be a valid number.")
}

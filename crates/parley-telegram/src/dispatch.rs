// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update handling.
//!
//! Every message passes the access filter, is routed, checked against the
//! rate limiter, and queued behind earlier messages from the same user in the
//! same chat. The queued job runs the command or chat turn and replies.

use std::sync::Arc;
use std::time::Duration;

use parley_agent::{
    ChatService, ChatTurn, Lifecycle, MessageQueue, QueueKey, RateLimiter, SearchService,
};
use parley_core::{AIModel, ParleyError, StorageAdapter};
use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageId, ParseMode, ReplyParameters};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Command, Route, parse_chat_id, route};
use crate::filters::AccessFilter;
use crate::format::{MAX_MESSAGE_LEN, escape_html, markdown_to_html, split_message};
use crate::handler::{chat_type, reply_target, sender_id, session_user};
use crate::media::{fetch_image, image_message, image_source};
use crate::upgrade::{UP_TO_DATE, UpgradeOutcome, Upgrader};

/// The bot's own account, from `getMe`.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub id: i64,
    pub username: String,
}

/// Everything a handler needs, shared across updates.
pub struct BotServices {
    pub chat: Arc<ChatService>,
    pub search: Arc<SearchService>,
    pub queue: Arc<MessageQueue>,
    pub limiter: Arc<RateLimiter>,
    pub storage: Arc<dyn StorageAdapter>,
    pub access: AccessFilter,
    pub upgrader: Upgrader,
    pub lifecycle: Lifecycle,
}

/// Dispatcher endpoint for message updates.
///
/// Returns as soon as the message is queued; the reply is sent by the
/// queue worker.
pub async fn handle_message(
    bot: Bot,
    msg: Message,
    services: Arc<BotServices>,
    me: Arc<BotIdentity>,
) -> ResponseResult<()> {
    if !services.access.allows(&msg).await {
        return Ok(());
    }
    let route = route(&msg, me.id, &me.username);
    if route == Route::Ignore {
        return Ok(());
    }
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };

    let chat_id = msg.chat.id.0;
    let kind = chat_type(&msg);
    let decision = services.limiter.check(user_id, chat_id, kind);
    if !decision.is_allowed() {
        if let Some(notice) = decision.notice(kind) {
            if let Err(e) = reply_plain(&bot, &msg, &notice).await {
                warn!(user_id, chat_id, error = %e, "failed to send rate limit notice");
            }
        }
        return Ok(());
    }

    let key = QueueKey::new(user_id, chat_id);
    let job = process(bot, msg, route, Arc::clone(&services));
    if let Err(e) = services.queue.enqueue(key, job).await {
        warn!(%key, error = %e, "message dropped");
    }
    Ok(())
}

/// Runs a routed message to completion.
pub async fn process(
    bot: Bot,
    msg: Message,
    route: Route,
    services: Arc<BotServices>,
) -> Result<(), ParleyError> {
    match route {
        Route::Chat {
            text,
            clear_history,
        } => chat_turn(&bot, &msg, &services, text, clear_history).await,
        Route::Command(command) => {
            if command.is_privileged() && !services.access.is_sudoer(&msg) {
                debug!(chat_id = msg.chat.id.0, ?command, "ignoring privileged command");
                return Ok(());
            }
            run_command(&bot, &msg, &services, command).await
        }
        Route::Ignore => Ok(()),
    }
}

async fn chat_turn(
    bot: &Bot,
    msg: &Message,
    services: &BotServices,
    text: String,
    clear_history: bool,
) -> Result<(), ParleyError> {
    let Some(user_id) = sender_id(msg) else {
        return Ok(());
    };
    let _typing = typing(bot, msg);

    let mut text = text;
    let mut image = None;
    if let Some(source_msg) = image_message(msg) {
        // Replying to a photo without text asks about the photo's caption.
        if text.trim().is_empty() && source_msg.id != msg.id {
            text = source_msg.caption().unwrap_or_default().to_string();
        }
        if let Some(source) = image_source(source_msg) {
            match fetch_image(bot, &source).await {
                Ok(fetched) => image = Some(fetched),
                Err(e) => {
                    warn!(user_id, error = %e, "failed to fetch image");
                    return reply_plain(bot, msg, "Media file not found.").await;
                }
            }
        }
    }

    let turn = ChatTurn {
        user_id,
        chat_id: msg.chat.id.0,
        user: session_user(msg),
        text,
        reply: reply_target(msg),
        image,
        clear_history,
    };
    match services.chat.respond(turn).await {
        Some(reply) => reply_markdown(bot, msg, &reply.text).await,
        None => Ok(()),
    }
}

async fn run_command(
    bot: &Bot,
    msg: &Message,
    services: &BotServices,
    command: Command,
) -> Result<(), ParleyError> {
    let user_id = sender_id(msg).unwrap_or_default();
    let chat_id = msg.chat.id.0;

    match command {
        Command::Ai(text) => chat_turn(bot, msg, services, text, true).await,
        Command::Ask(text) => chat_turn(bot, msg, services, text, false).await,
        Command::Reset => {
            services.storage.clear_conversations(user_id, chat_id).await?;
            reply_plain(bot, msg, "History cleared.").await
        }
        Command::Resetall => {
            let cleared = services.storage.clear_all_conversations().await?;
            info!(user_id, cleared, "cleared history for all users");
            reply_plain(bot, msg, "History cleared for all users!").await
        }
        Command::Models => reply_html(bot, msg, &models_html()).await,
        Command::Search(query) => {
            let _typing = typing(bot, msg);
            let user = session_user(msg);
            let reply = services.search.answer(&query, user.as_ref()).await;
            if let Some(answer) = &reply.answer {
                services
                    .chat
                    .record(user_id, chat_id, query.trim(), answer)
                    .await;
            }
            reply_markdown(bot, msg, &reply.text).await
        }
        Command::Allow(args) => match parse_chat_id(&args) {
            Ok(id) => {
                services.storage.add_whitelisted(id).await?;
                info!(user_id, chat_id = id, "chat whitelisted");
                reply_plain(bot, msg, &format!("Chat ID {id} has been allowed to use the bot.")).await
            }
            Err(usage) => reply_plain(bot, msg, usage).await,
        },
        Command::Disallow(args) => match parse_chat_id(&args) {
            Ok(id) => {
                let text = if services.storage.remove_whitelisted(id).await? {
                    info!(user_id, chat_id = id, "chat removed from whitelist");
                    format!("Chat ID {id} has been disallowed to use the bot.")
                } else {
                    format!("Chat ID {id} was not in the whitelist.")
                };
                reply_plain(bot, msg, &text).await
            }
            Err(usage) => reply_plain(bot, msg, usage).await,
        },
        Command::List => {
            let ids = services.storage.list_whitelisted().await?;
            let text = whitelist_text(&ids);
            reply_plain(bot, msg, &text).await
        }
        Command::Upgrade => upgrade(bot, msg, services).await,
    }
}

async fn upgrade(bot: &Bot, msg: &Message, services: &BotServices) -> Result<(), ParleyError> {
    match services.upgrader.upgrade().await {
        Ok(UpgradeOutcome::UpToDate) => reply_plain(bot, msg, UP_TO_DATE).await,
        Ok(UpgradeOutcome::Pulled { changelog }) => {
            let text = format!(
                "Upgrade successful. Restarting bot...\n<pre>{}</pre>",
                escape_html(&changelog)
            );
            reply_html(bot, msg, &text).await?;
            services.lifecycle.request_upgrade();
            Ok(())
        }
        Err(e) => {
            let text = format!("Upgrade failed:\n<pre>{}</pre>", escape_html(&e.to_string()));
            reply_html(bot, msg, &text).await
        }
    }
}

/// `/models` reply.
pub fn models_html() -> String {
    let items = AIModel::identifiers()
        .into_iter()
        .map(|id| format!("• <code>{id}</code>"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("<b>Supported Models:</b>\n{items}")
}

/// `/list` reply.
pub fn whitelist_text(ids: &[i64]) -> String {
    if ids.is_empty() {
        return "No whitelist entries found.".into();
    }
    let ids = ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("Whitelisted chat IDs: {ids}")
}

/// The message a reply should thread under: the one being replied to, if
/// any, else the trigger itself.
fn reply_anchor(msg: &Message) -> MessageId {
    msg.reply_to_message().map_or(msg.id, |reply| reply.id)
}

fn channel_error(action: &str, e: teloxide::RequestError) -> ParleyError {
    ParleyError::Channel {
        message: format!("failed to {action}: {e}"),
        source: Some(Box::new(e)),
    }
}

async fn reply_plain(bot: &Bot, msg: &Message, text: &str) -> Result<(), ParleyError> {
    bot.send_message(msg.chat.id, text)
        .reply_parameters(ReplyParameters::new(reply_anchor(msg)).allow_sending_without_reply())
        .await
        .map_err(|e| channel_error("send message", e))?;
    Ok(())
}

async fn reply_html(bot: &Bot, msg: &Message, html: &str) -> Result<(), ParleyError> {
    bot.send_message(msg.chat.id, html)
        .parse_mode(ParseMode::Html)
        .reply_parameters(ReplyParameters::new(reply_anchor(msg)).allow_sending_without_reply())
        .await
        .map_err(|e| channel_error("send message", e))?;
    Ok(())
}

/// Sends Markdown `text` in chunks, as HTML where Telegram accepts it.
async fn reply_markdown(bot: &Bot, msg: &Message, text: &str) -> Result<(), ParleyError> {
    for chunk in split_message(text, MAX_MESSAGE_LEN) {
        if let Err(e) = reply_html(bot, msg, &markdown_to_html(&chunk)).await {
            warn!(error = %e, "HTML reply failed, sending as plain text");
            reply_plain(bot, msg, &chunk).await?;
        }
    }
    Ok(())
}

/// Shows "typing…" until the returned guard is dropped.
fn typing(bot: &Bot, msg: &Message) -> tokio_util::sync::DropGuard {
    let cancel = CancellationToken::new();
    start_typing_indicator(bot.clone(), msg.chat.id, cancel.clone());
    cancel.drop_guard()
}

/// Starts a background task that sends typing indicators every 5 seconds.
///
/// The task continues until the `cancel` token is triggered.
pub fn start_typing_indicator(
    bot: Bot,
    chat_id: ChatId,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
                debug!(error = %e, "failed to send typing indicator");
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_listing() {
        let html = models_html();
        assert!(html.starts_with("<b>Supported Models:</b>\n• <code>gpt-4.1</code>"));
        assert_eq!(html.lines().count(), 1 + AIModel::identifiers().len());
    }

    #[test]
    fn whitelist_listing() {
        assert_eq!(whitelist_text(&[]), "No whitelist entries found.");
        assert_eq!(
            whitelist_text(&[-100123, 42]),
            "Whitelisted chat IDs: -100123, 42"
        );
    }
}

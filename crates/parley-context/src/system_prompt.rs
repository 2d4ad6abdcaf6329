// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! System prompt loading and the per-request session block.

use chrono::{DateTime, Utc};
use parley_config::model::BotConfig;
use parley_core::Message;
use tracing::{info, warn};

use crate::locale::LocaleInfo;

/// Base prompt used when neither a file nor an inline prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant.";

/// Who is talking to the bot, as far as the session block reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUser {
    pub full_name: String,
    /// IETF language tag reported by the client, e.g. `pt-BR`.
    pub language_code: Option<String>,
}

/// Loaded base system prompt, rendered into a fresh system message per request.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    base: String,
}

impl SystemPrompt {
    /// Loads the base prompt.
    ///
    /// # Priority
    /// 1. `bot.system_prompt_file`, read from disk
    /// 2. `bot.system_prompt`, inline string
    /// 3. [`DEFAULT_SYSTEM_PROMPT`]
    pub async fn load(config: &BotConfig) -> Self {
        if let Some(path) = &config.system_prompt_file {
            match tokio::fs::read_to_string(path).await {
                Ok(content) if !content.trim().is_empty() => {
                    info!(path = path.as_str(), "loaded system prompt from file");
                    return Self::new(content.trim());
                }
                Ok(_) => warn!(path = path.as_str(), "system prompt file is empty, falling back"),
                Err(e) => warn!(
                    path = path.as_str(),
                    error = %e,
                    "failed to read system prompt file, falling back"
                ),
            }
        }

        match &config.system_prompt {
            Some(prompt) if !prompt.trim().is_empty() => Self::new(prompt.trim()),
            _ => Self::new(DEFAULT_SYSTEM_PROMPT),
        }
    }

    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// System message for one request at `now`.
    ///
    /// Without a named user only the base prompt is sent.
    pub fn render(&self, user: Option<&SessionUser>, now: DateTime<Utc>) -> Message {
        match user.filter(|u| !u.full_name.trim().is_empty()) {
            Some(user) => Message::system(format!(
                "{}\n_session:\n{}",
                self.base,
                session_block(user, now)
            )),
            None => Message::system(self.base.clone()),
        }
    }
}

fn session_block(user: &SessionUser, now: DateTime<Utc>) -> String {
    let code = user.language_code.as_deref().unwrap_or("Unknown");
    let locale = LocaleInfo::from_language_code(code);
    format!(
        "UTC Date and Time: {}\nUser Full Name: {}\nUser Language: {} ({code})\nUser Region: {}",
        now.format("%d-%m-%Y %H:%M:%S"),
        user.full_name,
        locale.language,
        locale.region,
    )
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram transport for the Parley chatbot.
//!
//! Long-polls the Bot API via teloxide, routes commands and chat turns, and
//! sends replies as Telegram HTML with a plain-text fallback.

pub mod command;
pub mod dispatch;
pub mod filters;
pub mod format;
pub mod handler;
pub mod media;
pub mod upgrade;

use std::sync::Arc;

use async_trait::async_trait;
use parley_agent::Lifecycle;
use parley_config::model::TelegramConfig;
use parley_core::{AdapterType, HealthStatus, ParleyError, PluginAdapter};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::BotCommandScope;
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

pub use command::{Command, Route};
pub use dispatch::{BotIdentity, BotServices};
pub use filters::AccessFilter;
pub use upgrade::Upgrader;

/// Telegram channel: owns the bot client and runs the update dispatcher.
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    /// Creates a new Telegram channel.
    ///
    /// Requires `config.bot_token` to be set.
    pub fn new(config: &TelegramConfig) -> Result<Self, ParleyError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            ParleyError::Config("telegram.bot_token is required to serve".into())
        })?;

        if token.is_empty() {
            return Err(ParleyError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }

        Ok(Self {
            bot: Bot::new(token),
        })
    }

    /// Wraps an existing client, e.g. one pointed at a test server.
    pub fn from_bot(bot: Bot) -> Self {
        Self { bot }
    }

    /// Returns a reference to the underlying teloxide Bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Looks up the bot's own id and username.
    pub async fn identity(&self) -> Result<BotIdentity, ParleyError> {
        let me = self.bot.get_me().await.map_err(|e| ParleyError::Channel {
            message: format!("failed to fetch bot identity: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(BotIdentity {
            id: me.id.0 as i64,
            username: me.username().to_string(),
        })
    }

    /// Publishes the command list shown in Telegram's command menu.
    pub async fn register_commands(&self) -> Result<(), ParleyError> {
        self.bot
            .set_my_commands(Command::bot_commands())
            .scope(BotCommandScope::Default)
            .await
            .map_err(|e| ParleyError::Channel {
                message: format!("failed to set bot commands: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(())
    }

    /// Polls for updates until `lifecycle` stops.
    ///
    /// Returns after the dispatcher has finished in-flight updates.
    pub async fn run(
        &self,
        services: Arc<BotServices>,
        identity: BotIdentity,
        lifecycle: Lifecycle,
    ) -> Result<(), ParleyError> {
        info!(username = %identity.username, "starting Telegram long polling");

        let handler = Update::filter_message().endpoint(dispatch::handle_message);
        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![services, Arc::new(identity)])
            .default_handler(|_| async {})
            .build();

        let shutdown = dispatcher.shutdown_token();
        let stop = lifecycle.clone();
        let watcher = tokio::spawn(async move {
            stop.stopped().await;
            match shutdown.shutdown() {
                Ok(done) => {
                    done.await;
                    debug!("dispatcher stopped");
                }
                Err(e) => warn!(error = %e, "dispatcher was not running"),
            }
        });

        dispatcher.dispatch().await;
        watcher.abort();
        info!("Telegram long polling stopped");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        debug!("Telegram channel shutting down");
        Ok(())
    }
}

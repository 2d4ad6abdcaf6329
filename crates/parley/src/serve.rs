// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley serve` command implementation.
//!
//! Opens storage, wires the completion, search, queue, and rate-limit
//! services together, and runs the Telegram dispatcher until a signal or an
//! upgrade request stops it.

use std::sync::Arc;

use parley_agent::{
    ChatService, CompletionService, FallbackPolicy, Lifecycle, MessageQueue, RateLimitTracker,
    RateLimiter, SearchService, ShutdownReason, ToolLoop, install_signal_handler,
};
use parley_config::ParleyConfig;
use parley_context::ContextEngine;
use parley_core::{
    HealthStatus, ParleyError, PluginAdapter, ProviderAdapter, StorageAdapter, TokenEstimator,
};
use parley_openai::OpenAiProvider;
use parley_skill::{ToolRegistry, WebSearchTool, register_builtins};
use parley_storage::SqliteStorage;
use parley_telegram::{AccessFilter, BotServices, TelegramChannel, Upgrader};
use tracing::{info, warn};

/// Runs the bot until it is told to stop, and reports why it stopped.
pub async fn run_serve(config: ParleyConfig) -> Result<ShutdownReason, ParleyError> {
    info!(name = %config.bot.name, "starting parley serve");

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    report_health(storage.as_ref()).await;
    let storage: Arc<dyn StorageAdapter> = storage;

    let provider: Arc<dyn ProviderAdapter> = Arc::new(OpenAiProvider::new(&config.provider)?);

    let channel = TelegramChannel::new(&config.telegram)?;
    let identity = channel.identity().await?;
    report_health(&channel).await;
    if let Err(e) = channel.register_commands().await {
        warn!(error = %e, "failed to register command menu, continuing");
    }

    let lifecycle = Lifecycle::new(install_signal_handler());
    let services = build_services(
        &config,
        Arc::clone(&storage),
        provider,
        lifecycle.clone(),
        identity.id,
    )
    .await?;
    services.queue.start_sweeper();
    services.limiter.start_sweeper();

    channel
        .run(Arc::clone(&services), identity, lifecycle.clone())
        .await?;

    info!("shutting down");
    services.queue.shutdown().await;
    services.limiter.shutdown().await;
    if let Err(e) = channel.shutdown().await {
        warn!(error = %e, "failed to shut down Telegram channel");
    }
    if let Err(e) = storage.close().await {
        warn!(error = %e, "failed to close storage cleanly");
    }

    let reason = lifecycle.reason();
    info!(?reason, "parley stopped");
    Ok(reason)
}

async fn report_health(adapter: &dyn PluginAdapter) {
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => {
            info!(adapter = adapter.name(), version = %adapter.version(), "adapter ready");
        }
        Ok(status) => warn!(adapter = adapter.name(), ?status, "adapter not fully healthy"),
        Err(e) => warn!(adapter = adapter.name(), error = %e, "health check failed"),
    }
}

/// Builds the shared handler services from config.
pub async fn build_services(
    config: &ParleyConfig,
    storage: Arc<dyn StorageAdapter>,
    provider: Arc<dyn ProviderAdapter>,
    lifecycle: Lifecycle,
    bot_id: i64,
) -> Result<Arc<BotServices>, ParleyError> {
    let estimator = Arc::new(TokenEstimator::new());
    let context = ContextEngine::new(&config.bot, &config.context, estimator).await;
    let prompt = context.system_prompt().clone();
    let truncator = Arc::new(context.truncator().clone());

    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, &config.search)?;
    info!(tools = registry.len(), "tool registry initialized");

    // Chat and search share one tracker so a 429 seen by either is honored by both.
    let tracker = Arc::new(RateLimitTracker::new());
    let tool_loop = ToolLoop::new(
        Arc::clone(&provider),
        Arc::new(registry),
        truncator,
        config.context.max_tool_rounds,
    );
    let completion = CompletionService::new(
        tool_loop,
        Arc::clone(&tracker),
        FallbackPolicy::from_config(&config.provider),
    );
    let chat = ChatService::new(Arc::clone(&storage), context, completion, Some(bot_id));
    let search = SearchService::new(
        provider,
        tracker,
        WebSearchTool::from_config(&config.search),
        prompt,
        config.search.clone(),
        &config.provider,
    );

    let sudoers = config.bot.sudoers.clone();
    Ok(Arc::new(BotServices {
        chat: Arc::new(chat),
        search: Arc::new(search),
        queue: Arc::new(MessageQueue::new(config.queue.clone())),
        limiter: Arc::new(RateLimiter::new(
            &config.rate_limit,
            sudoers.iter().copied(),
        )),
        storage: Arc::clone(&storage),
        access: AccessFilter::new(sudoers, storage),
        upgrader: Upgrader::new(config.upgrade.clone()),
        lifecycle,
    }))
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

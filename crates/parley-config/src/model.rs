// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley chatbot.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Bot identity, logging, and privileged users.
    #[serde(default)]
    pub bot: BotConfig,

    /// Telegram Bot API settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Chat completion endpoint settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Web search API settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Context truncation and tool loop settings.
    #[serde(default)]
    pub context: ContextConfig,

    /// Per-user message queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Dual-tier rate limiter settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Self-upgrade settings.
    #[serde(default)]
    pub upgrade: UpgradeConfig,
}

/// Bot identity and behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Display name of the bot.
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Telegram user IDs exempt from rate limiting and allowed to run
    /// administrative commands.
    #[serde(default)]
    pub sudoers: Vec<i64>,

    /// Inline system prompt string. Overridden by `system_prompt_file` if both set.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Path to a text file containing the system prompt.
    #[serde(default)]
    pub system_prompt_file: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            log_level: default_log_level(),
            sudoers: Vec::new(),
            system_prompt: None,
            system_prompt_file: None,
        }
    }
}

impl BotConfig {
    pub fn is_sudoer(&self, user_id: i64) -> bool {
        self.sudoers.contains(&user_id)
    }
}

fn default_bot_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. Required by `parley serve`.
    #[serde(default)]
    pub bot_token: Option<String>,
}

impl TelegramConfig {
    /// The bot's own user ID: the numeric prefix of the token.
    pub fn bot_id(&self) -> Option<u64> {
        self.bot_token
            .as_deref()
            .and_then(|t| t.split(':').next())
            .and_then(|id| id.parse().ok())
    }
}

/// Chat completion endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// API key for the completion endpoint.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible inference endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// `api-version` query parameter sent with every request.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Model used when the prompt does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model substituted while the default model is rate limited.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Transport retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Exponential backoff factor in seconds.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound on a single backoff sleep in seconds.
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    /// Wall-clock budget for all attempts of one request, in seconds.
    #[serde(default = "default_retry_timeout_secs")]
    pub retry_timeout_secs: u64,

    /// Rate-limit window assumed when a 429 carries no wait hint.
    #[serde(default = "default_rate_limit_secs")]
    pub default_rate_limit_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_endpoint(),
            api_version: default_api_version(),
            default_model: default_model(),
            fallback_model: default_fallback_model(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            backoff_max_secs: default_backoff_max_secs(),
            retry_timeout_secs: default_retry_timeout_secs(),
            default_rate_limit_secs: default_rate_limit_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "https://models.inference.ai.azure.com".to_string()
}

fn default_api_version() -> String {
    "2025-03-01-preview".to_string()
}

fn default_model() -> String {
    "gpt-4.1".to_string()
}

fn default_fallback_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    0.8
}

fn default_backoff_max_secs() -> u64 {
    120
}

fn default_retry_timeout_secs() -> u64 {
    600
}

fn default_rate_limit_secs() -> u64 {
    3600
}

/// Web search API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Bing Web Search subscription key. `None` disables the search tool.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Results used to build `/search` context.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Character cap on the `/search` context block.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// How long `/search` avoids the default model after a 429.
    #[serde(default = "default_search_rate_limit_secs")]
    pub rate_limit_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_search_endpoint(),
            max_results: default_max_results(),
            max_context_chars: default_max_context_chars(),
            rate_limit_secs: default_search_rate_limit_secs(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://api.bing.microsoft.com/v7.0/search".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_max_context_chars() -> usize {
    4000
}

fn default_search_rate_limit_secs() -> u64 {
    300
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parley").join("parley.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Context assembly configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Token budget for one completion request.
    #[serde(default = "default_token_truncate_limit")]
    pub token_truncate_limit: usize,

    /// Exchanges kept per (user, chat) and replayed as history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Tool-call rounds allowed before a turn is abandoned.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_truncate_limit: default_token_truncate_limit(),
            history_limit: default_history_limit(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

fn default_token_truncate_limit() -> usize {
    4000
}

fn default_history_limit() -> usize {
    30
}

fn default_max_tool_rounds() -> usize {
    8
}

/// Per-user message queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    #[serde(default = "default_process_timeout_secs")]
    pub process_timeout_secs: u64,

    #[serde(default = "default_enqueue_timeout_secs")]
    pub enqueue_timeout_secs: u64,

    #[serde(default = "default_queue_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            process_timeout_secs: default_process_timeout_secs(),
            enqueue_timeout_secs: default_enqueue_timeout_secs(),
            cleanup_interval_secs: default_queue_cleanup_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl QueueConfig {
    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_secs(self.enqueue_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn default_max_queue_size() -> usize {
    50
}

fn default_process_timeout_secs() -> u64 {
    60
}

fn default_enqueue_timeout_secs() -> u64 {
    5
}

fn default_queue_cleanup_interval_secs() -> u64 {
    300
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

/// Dual-tier rate limiter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_user_limit")]
    pub user_limit: usize,

    #[serde(default = "default_user_interval_secs")]
    pub user_interval_secs: u64,

    #[serde(default = "default_group_limit")]
    pub group_limit: usize,

    #[serde(default = "default_group_interval_secs")]
    pub group_interval_secs: u64,

    #[serde(default = "default_rate_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            user_limit: default_user_limit(),
            user_interval_secs: default_user_interval_secs(),
            group_limit: default_group_limit(),
            group_interval_secs: default_group_interval_secs(),
            cleanup_interval_secs: default_rate_cleanup_interval_secs(),
        }
    }
}

fn default_user_limit() -> usize {
    5
}

fn default_user_interval_secs() -> u64 {
    30
}

fn default_group_limit() -> usize {
    10
}

fn default_group_interval_secs() -> u64 {
    60
}

fn default_rate_cleanup_interval_secs() -> u64 {
    300
}

/// `/upgrade` configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeConfig {
    /// Git remote to fetch from.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch compared against `HEAD`.
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            branch: default_branch(),
        }
    }
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

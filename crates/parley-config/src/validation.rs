// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: non-zero limits, known
//! model identifiers, and well-formed endpoints. All problems are collected
//! rather than stopping at the first.

use parley_core::AIModel;

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.bot.log_level.to_lowercase().as_str()) {
        errors.push(ConfigError::validation(
            "bot.log_level",
            format!("expected one of {}", LOG_LEVELS.join(", ")),
        ));
    }

    let provider = &config.provider;
    for (key, name) in [
        ("provider.default_model", &provider.default_model),
        ("provider.fallback_model", &provider.fallback_model),
    ] {
        if AIModel::from_identifier(name).is_none() {
            errors.push(ConfigError::validation(
                key,
                format!(
                    "unknown model `{name}`, known models: {}",
                    AIModel::identifiers().join(", ")
                ),
            ));
        }
    }
    if provider.default_model.eq_ignore_ascii_case(&provider.fallback_model) {
        errors.push(ConfigError::validation(
            "provider.fallback_model",
            "must differ from provider.default_model",
        ));
    }
    if !provider.backoff_factor.is_finite() || provider.backoff_factor < 0.0 {
        errors.push(ConfigError::validation(
            "provider.backoff_factor",
            format!("must be a non-negative number, got {}", provider.backoff_factor),
        ));
    }

    for (key, url) in [
        ("provider.endpoint", &provider.endpoint),
        ("search.endpoint", &config.search.endpoint),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ConfigError::validation(
                key,
                format!("`{url}` is not an http(s) URL"),
            ));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path",
            "must not be empty",
        ));
    }

    let non_zero: [(&str, u64); 17] = [
        ("provider.request_timeout_secs", provider.request_timeout_secs),
        ("provider.retry_timeout_secs", provider.retry_timeout_secs),
        ("provider.default_rate_limit_secs", provider.default_rate_limit_secs),
        ("search.max_results", config.search.max_results as u64),
        ("search.max_context_chars", config.search.max_context_chars as u64),
        ("context.token_truncate_limit", config.context.token_truncate_limit as u64),
        ("context.history_limit", config.context.history_limit as u64),
        ("context.max_tool_rounds", config.context.max_tool_rounds as u64),
        ("queue.process_timeout_secs", config.queue.process_timeout_secs),
        ("queue.enqueue_timeout_secs", config.queue.enqueue_timeout_secs),
        ("queue.cleanup_interval_secs", config.queue.cleanup_interval_secs),
        ("queue.idle_timeout_secs", config.queue.idle_timeout_secs),
        ("rate_limit.user_limit", config.rate_limit.user_limit as u64),
        ("rate_limit.user_interval_secs", config.rate_limit.user_interval_secs),
        ("rate_limit.group_limit", config.rate_limit.group_limit as u64),
        ("rate_limit.group_interval_secs", config.rate_limit.group_interval_secs),
        ("rate_limit.cleanup_interval_secs", config.rate_limit.cleanup_interval_secs),
    ];
    for (key, value) in non_zero {
        if value == 0 {
            errors.push(ConfigError::validation(key, "must be greater than zero"));
        }
    }

    if config.upgrade.remote.trim().is_empty() || config.upgrade.branch.trim().is_empty() {
        errors.push(ConfigError::validation(
            "upgrade",
            "remote and branch must not be empty",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Keys `parley serve` cannot start without.
///
/// Kept apart from [`validate_config`] so `check-config` and `models` work on
/// a config that has no credentials yet.
pub fn require_serve_keys(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    if config.telegram.bot_token.as_deref().is_none_or(str::is_empty) {
        errors.push(ConfigError::MissingKey {
            key: "telegram.bot_token".to_string(),
        });
    }
    if config.provider.api_key.as_deref().is_none_or(str::is_empty) {
        errors.push(ConfigError::MissingKey {
            key: "provider.api_key".to_string(),
        });
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

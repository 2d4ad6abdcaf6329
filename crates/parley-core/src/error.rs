// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley chatbot.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Parley crates.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel errors (Telegram API failure, download failure, bad chat id).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Completion endpoint errors that are not rate limits or auth failures.
    ///
    /// `transient` marks connection failures, timeouts, and 5xx responses.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The endpoint refused the call for `model` because of capacity limits.
    #[error("model {model} is rate limited: {message}")]
    RateLimited {
        model: String,
        /// Wait hint parsed from the error payload, if one was present.
        retry_after: Option<Duration>,
        message: String,
    },

    /// Credentials were rejected. Never retried.
    #[error("authentication failed: {message}")]
    Unauthorized { message: String },

    /// The final assistant turn carried no text.
    #[error("{model} returned an empty response")]
    EmptyResponse { model: String },

    /// The model kept requesting tools past the round cap.
    #[error("tool loop exceeded {rounds} rounds")]
    ToolLoopExceeded { rounds: usize },

    /// Tool registration or execution errors.
    #[error("tool error: {message}")]
    Tool {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The per-user queue for `key` is at capacity.
    #[error("queue {key} is full")]
    QueueFull { key: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Shorthand for a non-transient provider error without a source.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            transient: false,
            source: None,
        }
    }

    /// Whether a transport-level retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Provider {
                transient: true,
                ..
            } | Self::Timeout { .. }
        )
    }

    /// Whether this is a capacity (HTTP 429) signal.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion with model fallback.
//!
//! A turn normally runs on the requested model. When the default model is
//! rate limited the turn is rerun once on the fallback model, and the default
//! is remembered as limited so later turns skip it until the window passes.

use std::sync::Arc;
use std::time::Duration;

use parley_config::model::ProviderConfig;
use parley_core::{Message, ParleyError};
use tracing::{info, warn};

use crate::tool_loop::ToolLoop;
use crate::tracker::RateLimitTracker;

/// The answer to one turn and the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

/// Which models to use and how long to avoid a limited one.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    pub default_model: String,
    pub fallback_model: String,
    /// Assumed window when a 429 carries no wait hint.
    pub default_rate_limit: Duration,
}

impl FallbackPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            fallback_model: config.fallback_model.clone(),
            default_rate_limit: Duration::from_secs(config.default_rate_limit_secs),
        }
    }
}

/// Runs turns through the tool loop, falling back on rate limits.
pub struct CompletionService {
    tool_loop: ToolLoop,
    tracker: Arc<RateLimitTracker>,
    policy: FallbackPolicy,
}

impl CompletionService {
    pub fn new(tool_loop: ToolLoop, tracker: Arc<RateLimitTracker>, policy: FallbackPolicy) -> Self {
        Self {
            tool_loop,
            tracker,
            policy,
        }
    }

    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    /// Completes `messages` on `model`.
    ///
    /// A model still inside its rate-limit window is skipped in favor of the
    /// fallback. A 429 on the default model marks it and retries once on the
    /// fallback; a 429 on any other model, and every other error, propagates.
    pub async fn complete_chat(
        &self,
        messages: Vec<Message>,
        model: &str,
    ) -> Result<Completion, ParleyError> {
        let fallback = self.policy.fallback_model.as_str();

        if model != fallback {
            if let Some(wait) = self.tracker.remaining(model) {
                warn!(
                    model,
                    fallback,
                    seconds = wait.as_secs(),
                    "model is rate limited, using fallback directly"
                );
                return self.run(messages, fallback).await;
            }
        }

        match self.tool_loop.run(messages.clone(), model).await {
            Ok(text) => Ok(Completion {
                text,
                model: model.to_string(),
            }),
            Err(ParleyError::RateLimited { retry_after, .. })
                if model == self.policy.default_model && model != fallback =>
            {
                let wait = retry_after.unwrap_or(self.policy.default_rate_limit);
                self.tracker.mark(model, wait);
                warn!(
                    model,
                    fallback,
                    seconds = wait.as_secs(),
                    "rate limited, falling back"
                );
                self.run(messages, fallback).await
            }
            Err(e) => Err(e),
        }
    }

    async fn run(&self, messages: Vec<Message>, model: &str) -> Result<Completion, ParleyError> {
        let text = self.tool_loop.run(messages, model).await.inspect_err(|e| {
            warn!(model, error = %e, "fallback model failed");
        })?;
        info!(model, "answered by fallback model");
        Ok(Completion {
            text,
            model: model.to_string(),
        })
    }
}

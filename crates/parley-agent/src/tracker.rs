// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory of models the endpoint has recently rate limited.
//!
//! While a model is marked, callers skip it and go straight to the fallback
//! instead of spending another request on a 429.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

/// Tracks, per model identifier, when its rate limit expires.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    until: DashMap<String, Instant>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `model` as rate limited for `duration` from now.
    pub fn mark(&self, model: &str, duration: Duration) {
        debug!(model, seconds = duration.as_secs(), "model marked rate limited");
        self.until
            .insert(model.to_string(), Instant::now() + duration);
    }

    /// Whether `model` is still inside its rate-limit window.
    ///
    /// Expired entries are dropped on lookup.
    pub fn is_limited(&self, model: &str) -> bool {
        self.remaining(model).is_some()
    }

    /// Time left on the window for `model`, if it is limited.
    pub fn remaining(&self, model: &str) -> Option<Duration> {
        let now = Instant::now();
        let until = *self.until.get(model)?;
        if now < until {
            return Some(until - now);
        }
        self.until.remove_if(model, |_, until| *until <= now);
        None
    }

    pub fn clear(&self, model: &str) {
        self.until.remove(model);
    }
}

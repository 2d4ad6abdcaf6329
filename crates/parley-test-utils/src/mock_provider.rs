// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock completion provider for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with scripted outcomes. Each
//! outcome is queued either for a specific model or for any model; requests
//! pop the model-specific queue first. Every request is recorded so tests can
//! assert on call counts and payloads.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use parley_core::{
    AdapterType, ChatRequest, ChatResponse, HealthStatus, ParleyError, PluginAdapter,
    ProviderAdapter, ToolCall,
};

/// Text returned when nothing is scripted.
pub const DEFAULT_REPLY: &str = "mock response";

enum Outcome {
    Reply {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Fail(ParleyError),
}

#[derive(Default)]
struct Script {
    any_model: VecDeque<Outcome>,
    by_model: HashMap<String, VecDeque<Outcome>>,
}

/// A completion provider that returns pre-configured outcomes.
#[derive(Default)]
pub struct MockProvider {
    script: Mutex<Script>,
    calls: Mutex<Vec<ChatRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock pre-loaded with plain text replies for any model.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for reply in replies {
            provider.push_reply(reply);
        }
        provider
    }

    /// Queue a plain text reply for any model.
    pub fn push_reply(&self, text: impl Into<String>) -> &Self {
        self.push(None, Outcome::Reply {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        })
    }

    /// Queue a plain text reply for one model.
    pub fn push_reply_for(&self, model: &str, text: impl Into<String>) -> &Self {
        self.push(Some(model), Outcome::Reply {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        })
    }

    /// Queue an assistant turn with no text.
    pub fn push_empty(&self) -> &Self {
        self.push(None, Outcome::Reply {
            content: None,
            tool_calls: Vec::new(),
        })
    }

    /// Queue a single tool call for any model.
    pub fn push_tool_call(&self, id: &str, function_name: &str, arguments: &str) -> &Self {
        self.push(None, Outcome::Reply {
            content: None,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                function_name: function_name.to_string(),
                arguments: arguments.to_string(),
            }],
        })
    }

    /// Queue several tool calls in one assistant turn.
    pub fn push_tool_calls(&self, calls: Vec<ToolCall>) -> &Self {
        self.push(None, Outcome::Reply {
            content: None,
            tool_calls: calls,
        })
    }

    /// Queue an error for any model.
    pub fn push_error(&self, error: ParleyError) -> &Self {
        self.push(None, Outcome::Fail(error))
    }

    /// Queue an error for one model.
    pub fn push_error_for(&self, model: &str, error: ParleyError) -> &Self {
        self.push(Some(model), Outcome::Fail(error))
    }

    fn push(&self, model: Option<&str>, outcome: Outcome) -> &Self {
        let mut script = lock(&self.script);
        match model {
            Some(model) => script
                .by_model
                .entry(model.to_string())
                .or_default()
                .push_back(outcome),
            None => script.any_model.push_back(outcome),
        }
        self
    }

    fn next_outcome(&self, model: &str) -> Option<Outcome> {
        let mut script = lock(&self.script);
        script
            .by_model
            .get_mut(model)
            .and_then(VecDeque::pop_front)
            .or_else(|| script.any_model.pop_front())
    }

    /// Number of `complete` calls received so far.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Models requested, in call order.
    pub fn models_called(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|r| r.model.clone()).collect()
    }

    /// Snapshot of every request received.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ParleyError> {
        let model = request.model.clone();
        lock(&self.calls).push(request);

        match self.next_outcome(&model) {
            Some(Outcome::Reply {
                content,
                tool_calls,
            }) => Ok(ChatResponse {
                model,
                content,
                tool_calls,
            }),
            Some(Outcome::Fail(error)) => Err(error),
            None => Ok(ChatResponse::text(model, DEFAULT_REPLY)),
        }
    }
}

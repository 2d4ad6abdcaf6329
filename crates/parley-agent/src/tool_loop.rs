// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool invocation loop.
//!
//! Submits a conversation with the registered tool definitions, executes any
//! tool calls the model makes, appends the results, and resubmits until the
//! model answers in plain text. Every submission is truncated to the token
//! budget first.

use std::sync::Arc;

use parley_context::ContextTruncator;
use parley_core::{ChatRequest, Message, ParleyError, ProviderAdapter, ToolCall};
use parley_skill::ToolRegistry;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Appended to tool output that was cut to fit the budget.
pub const TOOL_OUTPUT_SUFFIX: &str = "...";

/// Drives one assistant turn to a final text answer.
pub struct ToolLoop {
    provider: Arc<dyn ProviderAdapter>,
    tools: Arc<ToolRegistry>,
    truncator: Arc<ContextTruncator>,
    max_rounds: usize,
}

impl ToolLoop {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        tools: Arc<ToolRegistry>,
        truncator: Arc<ContextTruncator>,
        max_rounds: usize,
    ) -> Self {
        Self {
            provider,
            tools,
            truncator,
            max_rounds,
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Runs the loop for `model` and returns the final answer text.
    ///
    /// Fails with [`ParleyError::ToolLoopExceeded`] when the model is still
    /// asking for tools after `max_rounds` rounds, and with
    /// [`ParleyError::EmptyResponse`] when the final answer has no text.
    /// Provider errors propagate unchanged.
    pub async fn run(&self, messages: Vec<Message>, model: &str) -> Result<String, ParleyError> {
        let definitions = self.tools.definitions();
        let mut messages = self.truncator.truncate(&messages, model);
        let mut rounds = 0;

        loop {
            let response = self
                .provider
                .complete(ChatRequest {
                    model: model.to_string(),
                    messages: messages.clone(),
                    tools: definitions.clone(),
                })
                .await?;

            if !response.has_tool_calls() {
                return match response.content {
                    Some(content) if !content.trim().is_empty() => Ok(content),
                    _ => Err(ParleyError::EmptyResponse {
                        model: model.to_string(),
                    }),
                };
            }

            if rounds == self.max_rounds {
                warn!(model, rounds, "model kept requesting tools, giving up");
                return Err(ParleyError::ToolLoopExceeded { rounds });
            }
            rounds += 1;

            for call in response.tool_calls {
                let output = self.execute(&call, model).await;
                let call_id = call.id.clone();
                messages.push(Message::assistant_tool_call(call));
                messages.push(Message::tool_result(output, call_id));
            }

            messages = self.truncator.truncate(&messages, model);
            debug!(model, round = rounds, messages = messages.len(), "resubmitting after tool calls");
        }
    }

    /// Executes one call and returns its output, cut to half the budget.
    async fn execute(&self, call: &ToolCall, model: &str) -> String {
        let arguments = match serde_json::from_str::<Value>(&call.arguments) {
            Ok(value @ Value::Object(_)) => value,
            Ok(other) => {
                warn!(tool = call.function_name.as_str(), arguments = %other, "tool arguments are not an object");
                Value::Object(Default::default())
            }
            Err(e) => {
                warn!(tool = call.function_name.as_str(), error = %e, "failed to decode tool arguments");
                Value::Object(Default::default())
            }
        };

        let output = self.tools.execute(&call.function_name, arguments).await;
        let output = output.to_string();

        let limit = self.truncator.token_budget() / 2;
        let estimator = self.truncator.estimator();
        let tokens = estimator.encode_length(&output, model);
        if tokens <= limit {
            return output;
        }

        info!(
            tool = call.function_name.as_str(),
            from = tokens,
            to = limit,
            model,
            "truncating tool output"
        );
        let mut truncated = estimator.truncate_to(&output, model, limit);
        truncated.push_str(TOOL_OUTPUT_SUFFIX);
        truncated
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation message model and common types shared across crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Provider,
    Storage,
}

/// Kind of chat a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatType {
    /// Group-type chats share the per-group rate limit window.
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

/// Level of detail requested for an attached image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ImageDetail {
    #[default]
    Auto,
    Low,
}

/// Reference to an image attached to a user turn (usually a `data:` URL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub detail: ImageDetail,
}

impl ImageRef {
    /// Builds a base64 `data:` URL reference from raw bytes.
    ///
    /// Chat photos are sent at low detail.
    pub fn from_base64(mime_type: &str, encoded: &str) -> Self {
        Self {
            url: format!("data:{mime_type};base64,{encoded}"),
            detail: ImageDetail::Low,
        }
    }
}

/// One item of a multi-part user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentItem {
    Text(String),
    Image(ImageRef),
}

/// Content of a user turn: plain text or a list of parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserContent {
    Text(String),
    Parts(Vec<ContentItem>),
}

impl UserContent {
    /// Concatenated text of every text item.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|item| match item {
                    ContentItem::Text(text) => Some(text.as_str()),
                    ContentItem::Image(_) => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Whether any part is an image.
    pub fn has_image(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Parts(parts) => parts
                .iter()
                .any(|item| matches!(item, ContentItem::Image(_))),
        }
    }
}

/// A tool invocation requested by the model.
///
/// `id` is unique within one assistant turn and is echoed back by the
/// matching [`Message::ToolResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub function_name: String,
    /// JSON-encoded arguments exactly as the model produced them.
    pub arguments: String,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        content: String,
        tool_call_id: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: UserContent::Text(content.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentItem>) -> Self {
        Self::User {
            content: UserContent::Parts(parts),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// An assistant turn carrying a single tool call and no text.
    pub fn assistant_tool_call(call: ToolCall) -> Self {
        Self::Assistant {
            content: String::new(),
            tool_calls: vec![call],
        }
    }

    pub fn tool_result(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self::ToolResult {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    /// Role name as the completion endpoint spells it.
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System { .. })
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Self::Assistant { .. })
    }

    /// All text carried by the message, including tool call arguments.
    pub fn text(&self) -> String {
        match self {
            Self::System { content } | Self::ToolResult { content, .. } => content.clone(),
            Self::User { content } => content.text(),
            Self::Assistant {
                content,
                tool_calls,
            } => {
                let mut text = content.clone();
                for call in tool_calls {
                    text.push_str(&call.function_name);
                    text.push_str(&call.arguments);
                }
                text
            }
        }
    }
}

/// Definition of a tool advertised to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments object.
    pub parameters: serde_json::Value,
}

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// Tools the model may call. Empty disables tool calling.
    pub tools: Vec<ToolDefinition>,
}

/// The first choice of a chat completion response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    /// Model that produced the response.
    pub model: String,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    /// A plain text response with no tool calls.
    pub fn text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// --- Persisted records ---

/// One completed exchange, as stored by the history store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub user_message: String,
    pub bot_response: String,
    /// ISO 8601 UTC timestamp with millisecond precision.
    pub timestamp: String,
}

/// A chat (or user, for private chats) allowed to use the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistEntry {
    pub id: i64,
    pub chat_id: i64,
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat completions request/response wire types.

use serde::{Deserialize, Serialize};

// --- Request types ---

/// A request to the chat completions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,

    pub messages: Vec<ApiMessage>,

    /// Tool definitions available to the model. Omitted when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ApiTool>,

    /// `"auto"` whenever tools are present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

/// One conversation message, tagged by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ApiMessage {
    System {
        content: String,
    },
    User {
        content: ApiUserContent,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ApiToolCall>,
    },
    Tool {
        content: String,
        tool_call_id: String,
    },
}

/// User content: a plain string or typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiUserContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiImageUrl {
    pub url: String,
    pub detail: String,
}

/// A function call requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: ApiFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFunctionCall {
    pub name: String,
    /// JSON-encoded arguments.
    #[serde(default)]
    pub arguments: String,
}

/// A tool definition advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ApiTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: ApiFunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiFunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: serde_json::Value,
}

fn function_type() -> String {
    "function".to_string()
}

// --- Response types ---

/// A full response from the chat completions endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    /// Model that generated the response, as reported by the endpoint.
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ApiToolCall>,
}

// --- Error types ---

/// Error envelope returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    /// `(code) message`, the form user-facing error cleaning looks for.
    pub fn display(&self) -> String {
        match &self.code {
            Some(code) => format!("({code}) {}", self.message),
            None => self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_empty_tools() {
        let request = CompletionRequest {
            model: "gpt-4.1".into(),
            messages: vec![ApiMessage::System {
                content: "sys".into(),
            }],
            tools: Vec::new(),
            tool_choice: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-4.1",
                "messages": [{"role": "system", "content": "sys"}]
            })
        );
    }

    #[test]
    fn user_parts_serialize_as_typed_items() {
        let message = ApiMessage::User {
            content: ApiUserContent::Parts(vec![
                ApiContentPart::Text {
                    text: "what is this".into(),
                },
                ApiContentPart::ImageUrl {
                    image_url: ApiImageUrl {
                        url: "data:image/jpeg;base64,AAAA".into(),
                        detail: "auto".into(),
                    },
                },
            ]),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["detail"], "auto");
    }

    #[test]
    fn assistant_tool_call_omits_content() {
        let message = ApiMessage::Assistant {
            content: None,
            tool_calls: vec![ApiToolCall {
                id: "call_1".into(),
                call_type: "function".into(),
                function: ApiFunctionCall {
                    name: "web_search".into(),
                    arguments: r#"{"query":"rust"}"#.into(),
                },
            }],
        };
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "web_search");
    }

    #[test]
    fn response_with_tool_calls_parses() {
        let body = serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4.1",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{\"query\":\"x\"}"}
                    }]
                }
            }]
        });
        let response: CompletionResponse = serde_json::from_value(body).unwrap();
        let message = &response.choices[0].message;
        assert!(message.content.is_none());
        assert_eq!(message.tool_calls[0].function.name, "web_search");
    }

    #[test]
    fn api_error_display_includes_code() {
        let error: ApiErrorResponse = serde_json::from_value(serde_json::json!({
            "error": {"code": "content_filter", "message": "Blocked."}
        }))
        .unwrap();
        assert_eq!(error.error.display(), "(content_filter) Blocked.");
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible chat completions provider for Parley.
//!
//! This crate implements [`ProviderAdapter`] for the chat completions API as
//! served by Azure AI inference (and any server speaking the same protocol).

pub mod client;
pub mod types;

use async_trait::async_trait;
use parley_config::model::ProviderConfig;
use parley_core::{
    AdapterType, ChatRequest, ChatResponse, ContentItem, HealthStatus, Message, ParleyError,
    PluginAdapter, ProviderAdapter, ToolCall, ToolDefinition, UserContent,
};
use tracing::{debug, info};

pub use client::{CompletionClient, RetryPolicy, retry_after_from_message};

use crate::types::{
    ApiContentPart, ApiFunctionCall, ApiFunctionDefinition, ApiImageUrl, ApiMessage, ApiTool,
    ApiToolCall, ApiUserContent, CompletionRequest, CompletionResponse,
};

/// Chat completions provider implementing [`ProviderAdapter`].
pub struct OpenAiProvider {
    client: CompletionClient,
}

impl OpenAiProvider {
    /// Creates a provider from `[provider]` config. Requires `api_key`.
    pub fn new(config: &ProviderConfig) -> Result<Self, ParleyError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ParleyError::Config("provider.api_key is not set".into()))?;
        let client = CompletionClient::new(api_key, config)?;

        info!(
            endpoint = config.endpoint,
            default_model = config.default_model,
            "completion provider initialized"
        );
        Ok(Self { client })
    }

    pub fn with_client(client: CompletionClient) -> Self {
        Self { client }
    }
}

/// Converts a [`ChatRequest`] into the wire request.
pub fn to_completion_request(request: &ChatRequest) -> CompletionRequest {
    let tools: Vec<ApiTool> = request.tools.iter().map(to_api_tool).collect();
    let tool_choice = (!tools.is_empty()).then(|| "auto".to_string());

    CompletionRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(to_api_message).collect(),
        tools,
        tool_choice,
    }
}

fn to_api_message(message: &Message) -> ApiMessage {
    match message {
        Message::System { content } => ApiMessage::System {
            content: content.clone(),
        },
        Message::User { content } => ApiMessage::User {
            content: match content {
                UserContent::Text(text) => ApiUserContent::Text(text.clone()),
                UserContent::Parts(parts) => {
                    ApiUserContent::Parts(parts.iter().map(to_api_part).collect())
                }
            },
        },
        Message::Assistant {
            content,
            tool_calls,
        } => ApiMessage::Assistant {
            content: (!content.is_empty() || tool_calls.is_empty()).then(|| content.clone()),
            tool_calls: tool_calls.iter().map(to_api_tool_call).collect(),
        },
        Message::ToolResult {
            content,
            tool_call_id,
        } => ApiMessage::Tool {
            content: content.clone(),
            tool_call_id: tool_call_id.clone(),
        },
    }
}

fn to_api_part(item: &ContentItem) -> ApiContentPart {
    match item {
        ContentItem::Text(text) => ApiContentPart::Text { text: text.clone() },
        ContentItem::Image(image) => ApiContentPart::ImageUrl {
            image_url: ApiImageUrl {
                url: image.url.clone(),
                detail: image.detail.to_string(),
            },
        },
    }
}

fn to_api_tool_call(call: &ToolCall) -> ApiToolCall {
    ApiToolCall {
        id: call.id.clone(),
        call_type: "function".to_string(),
        function: ApiFunctionCall {
            name: call.function_name.clone(),
            arguments: call.arguments.clone(),
        },
    }
}

fn to_api_tool(tool: &ToolDefinition) -> ApiTool {
    ApiTool {
        tool_type: "function".to_string(),
        function: ApiFunctionDefinition {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

/// Takes the first choice of a wire response.
///
/// The reported model is the one that was requested; endpoints often return
/// a dated snapshot name that does not match the registry.
pub fn from_completion_response(
    requested_model: &str,
    response: CompletionResponse,
) -> Result<ChatResponse, ParleyError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ParleyError::EmptyResponse {
            model: requested_model.to_string(),
        })?;

    Ok(ChatResponse {
        model: requested_model.to_string(),
        content: choice.message.content,
        tool_calls: choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                function_name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect(),
    })
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        // Probing the endpoint would spend quota.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        debug!("completion provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ParleyError> {
        let api_request = to_completion_request(&request);
        let response = self.client.complete(&api_request).await?;
        from_completion_response(&request.model, response)
    }
}

#[cfg(test)]
mod tests {
    use parley_core::ImageRef;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider(endpoint: &str) -> OpenAiProvider {
        OpenAiProvider::new(&ProviderConfig {
            api_key: Some("k".into()),
            endpoint: endpoint.to_string(),
            max_retries: 0,
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    fn search_tool() -> ToolDefinition {
        ToolDefinition {
            name: "web_search".into(),
            description: "Search the web".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        }
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let result = OpenAiProvider::new(&ProviderConfig::default());
        assert!(matches!(result, Err(ParleyError::Config(_))));
    }

    #[test]
    fn tool_choice_is_auto_only_with_tools() {
        let mut request = ChatRequest {
            model: "gpt-4.1".into(),
            messages: vec![Message::system("s"), Message::user("u")],
            tools: Vec::new(),
        };
        assert!(to_completion_request(&request).tool_choice.is_none());

        request.tools.push(search_tool());
        let wire = to_completion_request(&request);
        assert_eq!(wire.tool_choice.as_deref(), Some("auto"));
        assert_eq!(wire.tools[0].function.name, "web_search");
    }

    #[test]
    fn converts_every_message_kind() {
        let call = ToolCall {
            id: "call_1".into(),
            function_name: "web_search".into(),
            arguments: r#"{"query":"rust"}"#.into(),
        };
        let request = ChatRequest {
            model: "gpt-4.1".into(),
            messages: vec![
                Message::system("s"),
                Message::user_parts(vec![
                    ContentItem::Text("look".into()),
                    ContentItem::Image(ImageRef::from_base64("image/png", "AAAA")),
                ]),
                Message::assistant_tool_call(call),
                Message::tool_result("{\"results\":[]}", "call_1"),
                Message::assistant("done"),
            ],
            tools: Vec::new(),
        };
        let json = serde_json::to_value(to_completion_request(&request)).unwrap();
        let messages = json["messages"].as_array().unwrap();

        assert_eq!(messages[1]["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert_eq!(messages[1]["content"][1]["image_url"]["detail"], "low");
        assert!(messages[2].get("content").is_none());
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        assert_eq!(messages[4]["content"], "done");
    }

    #[test]
    fn empty_choices_is_empty_response() {
        let response = CompletionResponse {
            id: None,
            model: None,
            choices: Vec::new(),
        };
        let err = from_completion_response("gpt-4.1", response).unwrap_err();
        assert!(matches!(err, ParleyError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn complete_returns_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4.1",
                "tool_choice": "auto"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4.1-2025-04-14",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_9",
                            "type": "function",
                            "function": {"name": "web_search", "arguments": "{\"query\":\"news\"}"}
                        }]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let response = provider(&server.uri())
            .complete(ChatRequest {
                model: "gpt-4.1".into(),
                messages: vec![Message::system("s"), Message::user("what's new?")],
                tools: vec![search_tool()],
            })
            .await
            .unwrap();

        assert_eq!(response.model, "gpt-4.1");
        assert!(response.content.is_none());
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "call_9");
        assert_eq!(response.tool_calls[0].arguments, r#"{"query":"news"}"#);
    }
}

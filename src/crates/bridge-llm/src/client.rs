//! HTTP chat-completions client.
//!
//! One wire contract serves every configured provider: POST
//! `{endpoint}/chat/completions` with bearer auth and a JSON body carrying
//! `model`, `messages` and optional `tools`/`tool_choice`. Status codes
//! map onto the error taxonomy the coordinator surfaces to users.

use crate::chat::{ChatRequest, ChatResponse, Message, ToolCall, ToolSpec, Usage};
use crate::config::ProviderConfig;
use crate::error::{LlmError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Anything that can answer a chat request. The coordinator is written
/// against this trait so tests can substitute a scripted model.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// Production client speaking the chat-completions contract.
#[derive(Clone)]
pub struct HttpChatClient {
    config: ProviderConfig,
    client: Client,
}

impl HttpChatClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(LlmError::Http)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::ApiKeyNotFound(
                "no API key configured for this request".to_string(),
            ));
        }

        let url = format!("{}/chat/completions", self.config.endpoint);
        let body = WireRequest {
            model: self.config.model.clone(),
            messages: request.messages,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(request.tools.iter().map(WireTool::from).collect())
            },
            tool_choice: request.tool_choice,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model = %body.model, url = %url, "Sending chat request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(format!("chat request to {} timed out", url))
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::Authentication(text),
                404 => LlmError::ModelNotFound(format!(
                    "model '{}' was not recognized by the provider; check the profile's model name. {}",
                    body.model, text
                )),
                429 => LlmError::RateLimitExceeded(text),
                code if code >= 500 => LlmError::ServiceUnavailable(format!("{}: {}", code, text)),
                code => LlmError::Provider(format!("{}: {}", code, text)),
            });
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response carried no choices".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments: Value = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::String(tc.function.arguments));
                ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments,
                }
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: wire.usage,
            model: wire.model,
        })
    }
}

// Wire shapes.

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction,
}

#[derive(Serialize)]
struct WireToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            kind: "function",
            function: WireToolFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: String,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;

    #[test]
    fn test_missing_key_is_rejected_before_any_io() {
        let config = ProviderConfig::new(Provider::OpenAi, "");
        let client = HttpChatClient::new(config).unwrap();
        let request = ChatRequest::new(vec![Message::user("hello")]);

        let result = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(client.chat(request));
        assert!(matches!(result, Err(LlmError::ApiKeyNotFound(_))));
    }

    #[test]
    fn test_tool_call_arguments_parse_from_string() {
        let raw = r#"{
            "model": "test-model",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "create_graph", "arguments": "{\"name\": \"Cities\"}"}
                    }]
                }
            }]
        }"#;
        let wire: WireResponse = serde_json::from_str(raw).unwrap();
        let call = &wire.choices[0].message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.name, "create_graph");
        let parsed: Value = serde_json::from_str(&call.function.arguments).unwrap();
        assert_eq!(parsed["name"], "Cities");
    }
}

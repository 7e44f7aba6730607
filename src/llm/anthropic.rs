//! Anthropic provider — Messages API over HTTP.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse,
};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// The Messages API requires max_tokens; used when the request leaves it unset.
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    api_key: SecretString,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: SecretString, model: &str) -> Self {
        Self {
            api_key,
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Split system messages out of the transcript — the Messages API takes
    /// the system prompt as a top-level field.
    fn build_body(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> serde_json::Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let turns: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Role::Assistant => "assistant",
                        _ => "user",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": turns,
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system.join("\n\n"));
        }
        if let Some(t) = temperature {
            body["temperature"] = serde_json::json!(t);
        }
        body
    }

    async fn post(&self, body: serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let resp = self
            .client
            .post(API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "anthropic".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::AuthFailed {
                provider: "anthropic".into(),
            });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: "anthropic".into(),
                reason: format!("HTTP {status}: {text}"),
            });
        }

        resp.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: "anthropic".into(),
            reason: e.to_string(),
        })
    }
}

fn usage_tokens(json: &serde_json::Value) -> (u32, u32) {
    let input = json["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32;
    let output = json["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32;
    (input, output)
}

fn finish_reason(json: &serde_json::Value) -> FinishReason {
    match json["stop_reason"].as_str() {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolUse,
        _ => FinishReason::Unknown,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_body(&request.messages, request.temperature, request.max_tokens);
        let json = self.post(body).await?;

        let content = json["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let (input_tokens, output_tokens) = usage_tokens(&json);
        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
            finish_reason: finish_reason(&json),
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let mut body = self.build_body(&request.messages, request.temperature, request.max_tokens);
        body["tools"] = serde_json::Value::Array(
            request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect(),
        );

        let json = self.post(body).await?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        if let Some(blocks) = json["content"].as_array() {
            for block in blocks {
                match block["type"].as_str() {
                    Some("text") => {
                        if let Some(text) = block["text"].as_str() {
                            content.push_str(text);
                        }
                    }
                    Some("tool_use") => {
                        tool_calls.push(ToolCall {
                            id: block["id"].as_str().unwrap_or_default().to_string(),
                            name: block["name"].as_str().unwrap_or_default().to_string(),
                            arguments: block["input"].clone(),
                        });
                    }
                    _ => {}
                }
            }
        }

        let (input_tokens, output_tokens) = usage_tokens(&json);
        Ok(ToolCompletionResponse {
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            tool_calls,
            input_tokens,
            output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(SecretString::from("test-key"), "claude-sonnet-4-20250514")
    }

    #[test]
    fn body_lifts_system_prompt() {
        let messages = vec![
            ChatMessage::system("You categorize emails."),
            ChatMessage::user("Hello"),
        ];
        let body = provider().build_body(&messages, Some(0.1), Some(512));
        assert_eq!(body["system"], "You categorize emails.");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn body_defaults_max_tokens() {
        let body = provider().build_body(&[ChatMessage::user("hi")], None, None);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn finish_reason_mapping() {
        let json = serde_json::json!({"stop_reason": "tool_use"});
        assert_eq!(finish_reason(&json), FinishReason::ToolUse);
        let json = serde_json::json!({"stop_reason": "end_turn"});
        assert_eq!(finish_reason(&json), FinishReason::Stop);
        let json = serde_json::json!({});
        assert_eq!(finish_reason(&json), FinishReason::Unknown);
    }
}

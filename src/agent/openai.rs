//! Chat-completions agent with function calling.
//!
//! Sends the instructions and prompt with every toolbox tool declared as a
//! function, executes whatever tool calls the model asks for, feeds the
//! results back, and stops at the first reply without tool calls.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{Agent, CodeRequest};
use crate::facade::Toolbox;
use crate::server::ToolDefinition;

/// Upper bound on model round-trips for one request.
const MAX_TURNS: usize = 10;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_owned(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn tool_result(call_id: &str, content: String) -> Self {
        Self {
            tool_call_id: Some(call_id.to_owned()),
            ..Self::text("tool", content)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded arguments, as produced by the model.
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Agent backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiAgent {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAgent")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiAgent {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> serde_json::Value {
        let functions: Vec<serde_json::Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema,
                    }
                })
            })
            .collect();

        json!({
            "model": self.model,
            "messages": messages,
            "tools": functions,
        })
    }

    fn complete(&self, body: &serde_json::Value) -> Result<ChatMessage> {
        let response: ChatResponse = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .context("chat completion request failed")?
            .error_for_status()
            .context("chat completion rejected")?
            .json()
            .context("malformed chat completion response")?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .context("chat completion returned no choices")
    }
}

impl Agent for OpenAiAgent {
    fn run(&self, instructions: &str, request: &CodeRequest, toolbox: &Toolbox) -> Result<String> {
        let tools = toolbox.definitions();
        let mut messages = vec![
            ChatMessage::text("system", instructions),
            ChatMessage::text("user", request.prompt()),
        ];

        for turn in 1..=MAX_TURNS {
            let reply = self.complete(&self.request_body(&messages, &tools))?;
            let calls = reply.tool_calls.clone().unwrap_or_default();

            if calls.is_empty() {
                info!(turn, "agent finished");
                return Ok(reply.content.unwrap_or_default());
            }

            messages.push(reply);
            for call in calls {
                debug!(turn, tool = call.function.name, "model requested tool");
                let arguments = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| json!({}));
                let output = toolbox.invoke(&call.function.name, arguments);
                messages.push(ChatMessage::tool_result(&call.id, output));
            }
        }

        bail!("agent did not finish within {MAX_TURNS} turns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_declares_tools_as_functions() {
        let agent = OpenAiAgent::new("sk-test", "gpt-4o-mini", "https://example.invalid/v1/")
            .expect("agent");
        assert_eq!(agent.endpoint(), "https://example.invalid/v1/chat/completions");

        let tools = vec![ToolDefinition {
            name: "get_coding_standards".to_owned(),
            description: "standards".to_owned(),
            input_schema: json!({"type": "object"}),
        }];
        let body = agent.request_body(&[ChatMessage::text("user", "hi")], &tools);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body["messages"][0].get("tool_calls").is_none());
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_coding_standards");
    }

    #[test]
    fn tool_call_message_parses() {
        let message: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {
                    "name": "analyze_code_requirements",
                    "arguments": "{\"request\":\"x\",\"language\":\"go\"}"
                }
            }]
        }))
        .expect("parse");

        let calls = message.tool_calls.expect("calls");
        assert_eq!(calls[0].function.name, "analyze_code_requirements");
        assert_eq!(calls[0].kind, "function");
    }
}

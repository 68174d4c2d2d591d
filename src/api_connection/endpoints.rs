use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One model invocation, transport-style agnostic. The transport decides how
/// to shape it on the wire.
#[derive(Debug, Clone)]
pub struct ModelCall {
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout: Duration,
    /// Provider-side tools (e.g. web search) for the responses style.
    pub tools: Vec<Value>,
}

impl ModelCall {
    pub fn new(system: impl Into<String>, user: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            model: model.into(),
            temperature: 0.4,
            max_output_tokens: 900,
            timeout: Duration::from_secs(20),
            tools: Vec::new(),
        }
    }

    pub fn with_limits(mut self, max_output_tokens: u32, timeout: Duration) -> Self {
        self.max_output_tokens = max_output_tokens;
        self.timeout = timeout;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponseMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ResponsesContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ResponsesMessage {
    pub role: String,
    pub content: Vec<ResponsesContent>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<ResponsesMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
}

impl ResponsesMessage {
    pub fn input_text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            content: vec![ResponsesContent {
                content_type: "input_text".to_string(),
                text: text.to_string(),
            }],
        }
    }
}

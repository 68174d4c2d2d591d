use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::endpoints::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ModelCall, ResponseFormat,
    ResponsesMessage, ResponsesRequest,
};
use crate::config::{ApiStyle, AppConfig};

#[derive(Debug, Error)]
pub enum ApiConnectionError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("API error {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("model returned empty content")]
    EmptyContent,
}

/// Seam between the generation client and the LLM provider. The production
/// implementation speaks HTTP; tests inject canned payloads.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Issue one model call and return the raw provider payload. For the
    /// chat style this is the first choice's content as a JSON string value;
    /// for the responses style it is the whole response body.
    async fn invoke(&self, call: &ModelCall) -> Result<Value, ApiConnectionError>;
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: String,
    style: ApiStyle,
}

impl HttpTransport {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            style: config.api_style,
        }
    }

    async fn invoke_chat(&self, call: &ModelCall) -> Result<Value, ApiConnectionError> {
        let request = ChatCompletionRequest {
            model: call.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: call.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: call.user.clone(),
                },
            ],
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
            temperature: Some(call.temperature),
            max_tokens: Some(call.max_output_tokens),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(call.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(ApiConnectionError::Api { status, body });
        }

        let parsed = response.json::<ChatCompletionResponse>().await?;
        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(ApiConnectionError::EmptyContent)?;

        debug!(model = %call.model, bytes = content.len(), "chat completion received");
        Ok(Value::String(content))
    }

    async fn invoke_responses(&self, call: &ModelCall) -> Result<Value, ApiConnectionError> {
        let request = ResponsesRequest {
            model: call.model.clone(),
            input: vec![
                ResponsesMessage::input_text("system", &call.system),
                ResponsesMessage::input_text("user", &call.user),
            ],
            temperature: Some(call.temperature),
            max_output_tokens: Some(call.max_output_tokens),
            tools: call.tools.clone(),
        };

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(call.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(ApiConnectionError::Api { status, body });
        }

        let payload = response.json::<Value>().await?;
        debug!(model = %call.model, "responses payload received");
        Ok(payload)
    }
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn invoke(&self, call: &ModelCall) -> Result<Value, ApiConnectionError> {
        match self.style {
            ApiStyle::Chat => self.invoke_chat(call).await,
            ApiStyle::Responses => self.invoke_responses(call).await,
        }
    }
}

//! Retrying JSON-producing wrapper around the LLM provider.

pub mod json_scan;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api_connection::{ModelCall, ModelTransport};
use crate::error::GenerationError;
use json_scan::{collect_strings, extract_balanced_objects};

/// One JSON generation request. `template` is an example of the desired
/// output shape; its top-level keys double as the acceptance contract unless
/// `expected_keys` overrides them.
#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub system: String,
    pub user: String,
    pub template: String,
    pub model: String,
    pub retries: u32,
    pub max_output_tokens: u32,
    pub timeout: Duration,
    pub tools: Vec<Value>,
}

impl GenerateArgs {
    pub fn new(
        system: impl Into<String>,
        user: impl Into<String>,
        template: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            template: template.into(),
            model: model.into(),
            retries: 1,
            max_output_tokens: 900,
            timeout: Duration::from_secs(20),
            tools: Vec::new(),
        }
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn limits(mut self, max_output_tokens: u32, timeout: Duration) -> Self {
        self.max_output_tokens = max_output_tokens;
        self.timeout = timeout;
        self
    }

    pub fn tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self
    }
}

/// Top-level keys of the example template, used to decide whether a parsed
/// candidate object is the one we asked for.
pub fn expected_top_level_keys(template: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(template) {
        Ok(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Scan a provider payload for the first JSON object whose top-level keys
/// overlap `expected_keys`.
pub fn locate_json_object(payload: &Value, expected_keys: &[String]) -> Option<Value> {
    let mut texts = Vec::new();
    match payload {
        Value::String(text) => texts.push(text.trim().to_string()),
        other => {
            if let Ok(serialized) = serde_json::to_string(other) {
                texts.push(serialized);
            }
            collect_strings(other, &mut texts);
        }
    }

    let mut snippets = Vec::new();
    for text in &texts {
        snippets.push(text.trim().to_string());
        snippets.extend(extract_balanced_objects(text));
    }

    for snippet in snippets {
        let Ok(parsed) = serde_json::from_str::<Value>(&snippet) else {
            continue;
        };
        let Value::Object(map) = &parsed else {
            continue;
        };
        if expected_keys.is_empty() || expected_keys.iter().any(|key| map.contains_key(key)) {
            return Some(parsed);
        }
    }

    None
}

pub struct GenerationClient {
    transport: Arc<dyn ModelTransport>,
}

impl GenerationClient {
    pub fn new(transport: Arc<dyn ModelTransport>) -> Self {
        Self { transport }
    }

    /// Call the model and coerce its output into `T`, retrying the whole
    /// call-and-parse cycle up to `retries` extra times.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        args: &GenerateArgs,
    ) -> Result<T, GenerationError> {
        let system = format!(
            "{}\n\n必须输出严格 JSON 对象，不要 markdown。\nJSON模板：\n{}",
            args.system, args.template
        );
        let expected_keys = expected_top_level_keys(&args.template);

        let attempts = args.retries + 1;
        let mut last_error = GenerationError::NoJsonObject;

        for attempt in 1..=attempts {
            match self.attempt::<T>(&system, args, &expected_keys).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    warn!(attempt, model = %args.model, %error, "JSON generation attempt failed");
                    last_error = error;
                }
            }
        }

        Err(GenerationError::Exhausted {
            attempts,
            source: Box::new(last_error),
        })
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        system: &str,
        args: &GenerateArgs,
        expected_keys: &[String],
    ) -> Result<T, GenerationError> {
        let call = ModelCall::new(system, args.user.clone(), args.model.clone())
            .with_limits(args.max_output_tokens, args.timeout)
            .with_tools(args.tools.clone());

        let payload = self.transport.invoke(&call).await?;
        let object =
            locate_json_object(&payload, expected_keys).ok_or(GenerationError::NoJsonObject)?;
        debug!(model = %args.model, "candidate JSON object located");
        serde_json::from_value(object).map_err(GenerationError::Shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedTransport;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Shape {
        ingredients: Vec<String>,
    }

    fn args() -> GenerateArgs {
        GenerateArgs::new(
            "system",
            "user",
            r#"{ "ingredients": ["土豆"] }"#,
            "test-model",
        )
    }

    #[test]
    fn expected_keys_come_from_the_template() {
        assert_eq!(
            expected_top_level_keys(r#"{ "recommendations": [], "noMatch": false }"#),
            vec!["recommendations".to_string(), "noMatch".to_string()]
        );
        assert!(expected_top_level_keys("not json").is_empty());
    }

    #[test]
    fn locates_object_by_key_overlap() {
        let payload = json!({
            "output": [
                { "content": [ { "type": "output_text",
                    "text": "前言 {\"other\": 1} 中间 {\"ingredients\": [\"蛋\"]} 后记" } ] }
            ]
        });
        let located =
            locate_json_object(&payload, &["ingredients".to_string()]).expect("object found");
        assert_eq!(located["ingredients"][0], "蛋");
    }

    #[tokio::test]
    async fn parses_clean_string_payload() {
        let transport = ScriptedTransport::new(vec![Ok(Value::String(
            r#"{"ingredients": ["西红柿", "鸡蛋"]}"#.to_string(),
        ))]);
        let client = GenerationClient::new(Arc::new(transport));
        let shape: Shape = client.generate_json(&args()).await.unwrap();
        assert_eq!(shape.ingredients, vec!["西红柿", "鸡蛋"]);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let transport = ScriptedTransport::new(vec![
            Ok(Value::String("完全不是 JSON".to_string())),
            Ok(Value::String(r#"{"ingredients": ["土豆"]}"#.to_string())),
        ]);
        let client = GenerationClient::new(Arc::new(transport));
        let shape: Shape = client.generate_json(&args().retries(1)).await.unwrap();
        assert_eq!(shape.ingredients, vec!["土豆"]);
    }

    #[tokio::test]
    async fn exhaustion_carries_last_error() {
        let transport = ScriptedTransport::new(vec![
            Ok(Value::String("垃圾".to_string())),
            Ok(Value::String("还是垃圾".to_string())),
        ]);
        let client = GenerationClient::new(Arc::new(transport));
        let result: Result<Shape, _> = client.generate_json(&args().retries(1)).await;
        match result {
            Err(GenerationError::Exhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn markdown_fenced_output_is_recovered() {
        let transport = ScriptedTransport::new(vec![Ok(Value::String(
            "```json\n{\"ingredients\": [\"葱\"]}\n```".to_string(),
        ))]);
        let client = GenerationClient::new(Arc::new(transport));
        let shape: Shape = client.generate_json(&args()).await.unwrap();
        assert_eq!(shape.ingredients, vec!["葱"]);
    }
}

//! Shared unit-test doubles.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::api_connection::connection::ApiConnectionError;
use crate::api_connection::{ModelCall, ModelTransport};

/// Transport returning a scripted sequence of payloads. Once the script runs
/// out, every further call fails with `EmptyContent`.
pub struct ScriptedTransport {
    payloads: Mutex<Vec<Result<Value, ApiConnectionError>>>,
    calls: Mutex<u32>,
}

impl ScriptedTransport {
    pub fn new(payloads: Vec<Result<Value, ApiConnectionError>>) -> Self {
        Self {
            payloads: Mutex::new(payloads),
            calls: Mutex::new(0),
        }
    }

    pub fn text(payload: &str) -> Result<Value, ApiConnectionError> {
        Ok(Value::String(payload.to_string()))
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn invoke(&self, _call: &ModelCall) -> Result<Value, ApiConnectionError> {
        *self.calls.lock().unwrap() += 1;
        let mut payloads = self.payloads.lock().unwrap();
        if payloads.is_empty() {
            Err(ApiConnectionError::EmptyContent)
        } else {
            payloads.remove(0)
        }
    }
}

//! Gemini `generateContent` backend with a function-calling loop.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{GenerationBackend, GenerationOutput, GenerationRequest};
use crate::capability::{Capability, CapabilityContext, ToolDeclaration, call_timed};
use crate::config::Config;
use crate::errors::{BackendError, ConfigError};
use crate::util::truncate;

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Upper bound on call-and-respond rounds within one invocation.
pub const MAX_TOOL_ROUNDS: usize = 8;

pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(config.require_api_key()?, config.model_name.clone()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn generate(&self, body: &Value) -> Result<Value, BackendError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(
                status.as_u16(),
                truncate(&error_message(&message), 300),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

/// `error.message` from a Gemini error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// `tools` payload for the declared capabilities.
pub(crate) fn tools_payload(capabilities: &[Arc<dyn Capability>]) -> Vec<Value> {
    let mut functions = Vec::new();
    let mut tools = Vec::new();
    for capability in capabilities {
        match capability.declaration() {
            ToolDeclaration::Function {
                name,
                description,
                parameters,
            } => functions.push(json!({
                "name": name,
                "description": description,
                "parameters": parameters,
            })),
            ToolDeclaration::BuiltinSearch => tools.push(json!({"google_search": {}})),
        }
    }
    if !functions.is_empty() {
        tools.push(json!({"functionDeclarations": functions}));
    }
    tools
}

pub(crate) fn request_body(contents: &[Value], tools: &[Value], schema: Option<&Value>) -> Value {
    let mut body = json!({ "contents": contents });
    if !tools.is_empty() {
        // Structured output cannot be combined with tool use; the schema is
        // still spelled out in the prompt.
        body["tools"] = Value::Array(tools.to_vec());
    } else if let Some(schema) = schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }
    body
}

/// Content of the first candidate.
fn candidate_content(response: &Value) -> Result<&Value, BackendError> {
    if let Some(reason) = response
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(BackendError::Permanent {
            status: 400,
            message: format!("prompt blocked: {reason}"),
        });
    }
    response
        .pointer("/candidates/0/content")
        .ok_or_else(|| BackendError::InvalidResponse("response has no candidates".to_string()))
}

fn parts(content: &Value) -> &[Value] {
    content
        .get("parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub(crate) fn function_calls(content: &Value) -> Vec<(String, Value)> {
    parts(content)
        .iter()
        .filter_map(|part| part.get("functionCall"))
        .filter_map(|call| {
            let name = call.get("name")?.as_str()?.to_string();
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            Some((name, args))
        })
        .collect()
}

pub(crate) fn text_of(content: &Value) -> String {
    parts(content)
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn invoke(
        &self,
        request: &GenerationRequest,
        capabilities: &[Arc<dyn Capability>],
        ctx: &CapabilityContext,
    ) -> Result<GenerationOutput, BackendError> {
        let tools = tools_payload(capabilities);
        let mut contents = vec![json!({
            "role": "user",
            "parts": [{"text": request.render_prompt()}]
        })];

        for round in 0..MAX_TOOL_ROUNDS {
            if ctx.cancel.is_cancelled() {
                return Err(BackendError::Cancelled);
            }
            let body = request_body(&contents, &tools, request.schema.as_ref());
            let response = self.generate(&body).await?;
            let content = candidate_content(&response)?.clone();

            let calls = function_calls(&content);
            if calls.is_empty() {
                let text = text_of(&content);
                let json = request
                    .expects_json()
                    .then(|| serde_json::from_str::<Value>(text.trim()).ok())
                    .flatten();
                return Ok(GenerationOutput { text, json });
            }

            debug!(task = %request.task, round, calls = calls.len(), "function_calls_requested");
            contents.push(content);

            let mut responses = Vec::with_capacity(calls.len());
            for (name, args) in calls {
                let result = match capabilities.iter().find(|c| c.name() == name) {
                    Some(capability) => match call_timed(capability.as_ref(), args, ctx).await {
                        Ok(value) => value,
                        Err(err) => json!({"error": err.to_string()}),
                    },
                    None => {
                        warn!(task = %request.task, tool = %name, "unknown_function_requested");
                        json!({"error": format!("unknown function '{name}'")})
                    }
                };
                let result = if result.is_object() {
                    result
                } else {
                    json!({"result": result})
                };
                responses.push(json!({
                    "functionResponse": {"name": name, "response": result}
                }));
            }
            contents.push(json!({"role": "user", "parts": responses}));
        }

        Err(BackendError::InvalidResponse(format!(
            "no final answer after {MAX_TOOL_ROUNDS} function-call rounds"
        )))
    }
}

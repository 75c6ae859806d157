//! Generation backends: the seam between the orchestrator and a model.

mod gemini;
mod scripted;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use gemini::{GEMINI_API_URL, GeminiBackend, MAX_TOOL_ROUNDS};
pub use scripted::{ScriptedBackend, ScriptedReply};

use crate::capability::{Capability, CapabilityContext};
use crate::compose::TaskDescriptor;
use crate::errors::BackendError;
use crate::state::RunState;

/// Everything a backend needs to run one task once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub task: String,
    pub instruction: String,
    /// Values of the task's declared reads; missing keys are omitted.
    pub inputs: BTreeMap<String, Value>,
    /// Name of the expected output shape, if the task declares one.
    pub shape: Option<String>,
    /// Response schema of that shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl GenerationRequest {
    /// Build the request for `task` from the current state.
    pub fn for_task(task: &TaskDescriptor, state: &RunState) -> Self {
        let inputs = task
            .reads
            .iter()
            .filter_map(|key| state.get(key).map(|v| (key.clone(), v)))
            .collect();
        Self {
            task: task.name.clone(),
            instruction: task.instruction.clone(),
            inputs,
            shape: task.shape.map(|s| s.name().to_string()),
            schema: task.shape.map(|s| s.schema()),
        }
    }

    pub fn expects_json(&self) -> bool {
        self.shape.is_some()
    }

    /// Flatten instruction and inputs into a single prompt.
    pub fn render_prompt(&self) -> String {
        let mut prompt = self.instruction.trim().to_string();
        if !self.inputs.is_empty() {
            prompt.push_str("\n\n## Inputs\n");
            for (key, value) in &self.inputs {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
                };
                prompt.push_str(&format!("\n### {key}\n{rendered}\n"));
            }
        }
        if let Some(shape) = &self.shape {
            prompt.push_str(&format!(
                "\n\nRespond with a single JSON object matching the {shape} schema and nothing else."
            ));
            if let Some(schema) = &self.schema {
                let rendered = serde_json::to_string(schema).unwrap_or_default();
                prompt.push_str(&format!("\n{shape} schema: {rendered}"));
            }
        }
        prompt
    }
}

/// Raw result of one backend invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    /// Structured output, when the backend produced one.
    pub json: Option<Value>,
}

impl GenerationOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            json: None,
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            text: value.to_string(),
            json: Some(value),
        }
    }
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Run one task once. The backend may call any of `capabilities`
    /// through `ctx` before producing its output.
    async fn invoke(
        &self,
        request: &GenerationRequest,
        capabilities: &[Arc<dyn Capability>],
        ctx: &CapabilityContext,
    ) -> Result<GenerationOutput, BackendError>;
}

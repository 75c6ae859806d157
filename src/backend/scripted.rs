//! Deterministic backend driven by queued replies per task.
//!
//! Used by tests and offline runs. Each task name has its own queue; when a
//! queue is empty the task gets an empty text reply.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{GenerationBackend, GenerationOutput, GenerationRequest};
use crate::capability::{Capability, CapabilityContext, call_timed};
use crate::errors::BackendError;

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Json(Value),
    Error(BackendError),
    /// Call a capability and return its result as structured output.
    Capability { name: String, args: Value },
}

#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    latency: HashMap<String, Duration>,
    default_latency: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, task: &str, reply: ScriptedReply) -> Self {
        lock(&self.replies)
            .entry(task.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn reply_json(self, task: &str, value: Value) -> Self {
        self.reply(task, ScriptedReply::Json(value))
    }

    pub fn reply_text(self, task: &str, text: impl Into<String>) -> Self {
        self.reply(task, ScriptedReply::Text(text.into()))
    }

    pub fn fail(self, task: &str, error: BackendError) -> Self {
        self.reply(task, ScriptedReply::Error(error))
    }

    /// Delay every call of `task` by `latency`.
    pub fn latency(mut self, task: &str, latency: Duration) -> Self {
        self.latency.insert(task.to_string(), latency);
        self
    }

    pub fn default_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    pub fn calls(&self, task: &str) -> usize {
        lock(&self.requests).iter().filter(|r| r.task == task).count()
    }

    pub fn last_request(&self, task: &str) -> Option<GenerationRequest> {
        lock(&self.requests)
            .iter()
            .rev()
            .find(|r| r.task == task)
            .cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &self,
        request: &GenerationRequest,
        capabilities: &[Arc<dyn Capability>],
        ctx: &CapabilityContext,
    ) -> Result<GenerationOutput, BackendError> {
        lock(&self.requests).push(request.clone());

        let delay = self
            .latency
            .get(&request.task)
            .copied()
            .unwrap_or(self.default_latency);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = lock(&self.replies)
            .get_mut(&request.task)
            .and_then(VecDeque::pop_front);

        match reply {
            None => Ok(GenerationOutput::default()),
            Some(ScriptedReply::Text(text)) => Ok(GenerationOutput::text(text)),
            Some(ScriptedReply::Json(value)) => Ok(GenerationOutput::json(value)),
            Some(ScriptedReply::Error(err)) => Err(err),
            Some(ScriptedReply::Capability { name, args }) => {
                let capability = capabilities
                    .iter()
                    .find(|c| c.name() == name)
                    .ok_or_else(|| {
                        BackendError::InvalidResponse(format!(
                            "task '{}' has no capability '{name}'",
                            request.task
                        ))
                    })?;
                let value = call_timed(capability.as_ref(), args, ctx)
                    .await
                    .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
                Ok(GenerationOutput::json(value))
            }
        }
    }
}

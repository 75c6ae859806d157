//! External capabilities a generation backend may invoke on a task's behalf.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::CapabilityError;
use crate::state::RunState;

/// How a capability is advertised to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolDeclaration {
    /// A function the orchestrator executes when the backend asks for it.
    Function {
        name: String,
        description: String,
        parameters: Value,
    },
    /// Web search executed by the backend itself.
    BuiltinSearch,
}

/// What a capability can see while it runs.
#[derive(Debug, Clone)]
pub struct CapabilityContext {
    pub task: String,
    pub state: RunState,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    fn declaration(&self) -> ToolDeclaration;

    async fn call(&self, args: Value, ctx: &CapabilityContext) -> Result<Value, CapabilityError>;
}

/// Call `capability` on behalf of `ctx.task`, logging `tool_started` and then
/// `tool_completed` or `tool_error` with the elapsed `duration_ms`.
pub async fn call_timed(
    capability: &dyn Capability,
    args: Value,
    ctx: &CapabilityContext,
) -> Result<Value, CapabilityError> {
    let tool = capability.name();
    info!(task = %ctx.task, tool, "tool_started");
    let started = Instant::now();
    let result = capability.call(args, ctx).await;
    let duration_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => info!(task = %ctx.task, tool, duration_ms, "tool_completed"),
        Err(err) => error!(task = %ctx.task, tool, duration_ms, error = %err, "tool_error"),
    }
    result
}

/// Named set of capabilities available to tasks.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    tools: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Arc<dyn Capability>) -> Self {
        self.register(capability);
        self
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.tools.insert(capability.name().to_string(), capability);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Look up every named capability; `Err` carries the first unknown name.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn Capability>>, String> {
        names
            .iter()
            .map(|name| self.get(name).ok_or_else(|| name.clone()))
            .collect()
    }

    pub async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &CapabilityContext,
    ) -> Result<Value, CapabilityError> {
        let capability = self
            .get(name)
            .ok_or_else(|| CapabilityError::Unknown(name.to_string()))?;
        call_timed(capability.as_ref(), args, ctx).await
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

//! Recursive execution of a stage tree against a run.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use super::SupervisorConfig;
use super::events::{EventSink, WorkflowEvent};
use crate::backend::{GenerationBackend, GenerationOutput, GenerationRequest};
use crate::capability::{Capability, CapabilityContext, CapabilityRegistry};
use crate::compose::{Conformed, FanOutGroup, Sequence, Stage, TaskDescriptor};
use crate::errors::{BackendError, RetryFailure, StepError};
use crate::retry::with_retry;
use crate::state::{EventKind, Run};
use crate::util::truncate;

/// Executes stages for one phase. Cloned into every fan-out child.
#[derive(Clone)]
pub(crate) struct StageRunner {
    pub(crate) backend: Arc<dyn GenerationBackend>,
    pub(crate) capabilities: CapabilityRegistry,
    pub(crate) config: SupervisorConfig,
    pub(crate) run: Run,
    pub(crate) cancel: CancellationToken,
    pub(crate) events: EventSink,
}

impl StageRunner {
    pub(crate) fn run_stage<'a>(&'a self, stage: &'a Stage) -> BoxFuture<'a, Result<(), StepError>> {
        async move {
            match stage {
                Stage::Task(task) => self.run_task(task).await,
                Stage::Sequence(seq) => self.run_sequence(seq).await,
                Stage::FanOut(group) => self.run_fan_out(group).await,
            }
        }
        .boxed()
    }

    async fn run_sequence(&self, seq: &Sequence) -> Result<(), StepError> {
        for stage in &seq.stages {
            self.ensure_active(stage.name())?;
            self.run_stage(stage).await?;
        }
        Ok(())
    }

    /// Run every child concurrently and wait for all of them.
    ///
    /// Siblings of a failed child run to completion; the group then fails
    /// with the error of the first failed child in declaration order.
    async fn run_fan_out(&self, group: &FanOutGroup) -> Result<(), StepError> {
        info!(group = %group.name, children = group.children.len(), "fan_out_started");

        let mut set = JoinSet::new();
        for (index, child) in group.children.iter().cloned().enumerate() {
            let runner = self.clone();
            let span = info_span!("fan_out_child", child = %child.name);
            set.spawn(
                async move {
                    let result = runner.run_sequence(&child).await;
                    (index, result)
                }
                .instrument(span),
            );
        }

        let mut results: Vec<Option<Result<(), StepError>>> =
            (0..group.children.len()).map(|_| None).collect();
        let mut lost = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(err) => {
                    warn!(group = %group.name, error = %err, "fan_out_child_lost");
                    lost.get_or_insert(StepError::Join {
                        group: group.name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if let Some(err) = results.into_iter().flatten().find_map(Result::err) {
            return Err(err);
        }
        if let Some(err) = lost {
            return Err(err);
        }
        info!(group = %group.name, "fan_out_completed");
        Ok(())
    }

    async fn run_task(&self, task: &TaskDescriptor) -> Result<(), StepError> {
        self.ensure_active(&task.name)?;

        let capabilities = self
            .capabilities
            .resolve(&task.capabilities)
            .map_err(|capability| StepError::UnknownCapability {
                task: task.name.clone(),
                capability,
            })?;
        let request = GenerationRequest::for_task(task, self.run.state());
        let ctx = CapabilityContext {
            task: task.name.clone(),
            state: self.run.state().clone(),
            cancel: self.cancel.clone(),
        };

        info!(task = %task.name, inputs = request.inputs.len(), "agent_started");
        let started = Instant::now();
        self.run.record(&task.name, EventKind::TaskStarted, "");
        self.events.emit(WorkflowEvent::TaskStarted {
            task: task.name.clone(),
        });

        let on_retry = |attempt: u32, delay: Duration, err: &BackendError| {
            self.run.record(
                &task.name,
                EventKind::TaskRetried,
                format!("retry {attempt} in {}ms: {err}", delay.as_millis()),
            );
            self.events.emit(WorkflowEvent::TaskRetrying {
                task: task.name.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
            });
        };
        let result = with_retry(&self.config.retry, &self.cancel, &task.name, on_retry, |_| {
            self.invoke_once(&request, &capabilities, &ctx)
        })
        .await;

        let output = match result {
            Ok(output) => output,
            Err(failure) => return Err(self.task_failed(task, failure, started.elapsed())),
        };

        let (value, defaulted) = self.conform(task, &output);

        // A task interrupted by the deadline never commits.
        self.ensure_active(&task.name)?;
        self.run.state().set(task.writes.clone(), value);
        self.run.record(&task.name, EventKind::TaskCompleted, output.text);

        info!(
            task = %task.name,
            key = %task.writes,
            defaulted,
            duration_ms = started.elapsed().as_millis() as u64,
            "agent_completed"
        );
        self.events.emit(WorkflowEvent::TaskCompleted {
            task: task.name.clone(),
            key: task.writes.clone(),
            defaulted,
        });
        Ok(())
    }

    async fn invoke_once(
        &self,
        request: &GenerationRequest,
        capabilities: &[Arc<dyn Capability>],
        ctx: &CapabilityContext,
    ) -> Result<GenerationOutput, BackendError> {
        let limit = self.config.task_timeout;
        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(BackendError::Cancelled),
            outcome = tokio::time::timeout(limit, self.backend.invoke(request, capabilities, ctx)) => {
                outcome.unwrap_or(Err(BackendError::TaskTimeout(limit)))
            }
        };
        if let Some(err) = result
            .as_ref()
            .err()
            .filter(|err| !matches!(err, BackendError::Cancelled))
        {
            error!(
                task = %request.task,
                backend = self.backend.name(),
                transient = err.is_transient(),
                error = %err,
                "model_error"
            );
        }
        result
    }

    /// Fit the output to the task's shape, or keep it as-is when unshaped.
    fn conform(&self, task: &TaskDescriptor, output: &GenerationOutput) -> (Value, bool) {
        let Some(shape) = &task.shape else {
            let value = output
                .json
                .clone()
                .unwrap_or_else(|| Value::String(output.text.clone()));
            return (value, false);
        };

        match shape.conform(output) {
            Conformed::Valid(value) => (value, false),
            Conformed::Defaulted { value, reason } => {
                warn!(
                    task = %task.name,
                    shape = shape.name(),
                    reason = %reason,
                    output = %truncate(&output.text, 200),
                    "output_validation_failed"
                );
                (value, true)
            }
        }
    }

    fn task_failed(&self, task: &TaskDescriptor, failure: RetryFailure, elapsed: Duration) -> StepError {
        let error = match failure {
            RetryFailure::Exhausted { attempts, last } => StepError::RetriesExhausted {
                task: task.name.clone(),
                attempts,
                last,
            },
            RetryFailure::Aborted(BackendError::Cancelled) => {
                return StepError::Cancelled {
                    task: task.name.clone(),
                };
            }
            RetryFailure::Aborted(source) => StepError::Backend {
                task: task.name.clone(),
                source,
            },
        };
        warn!(
            task = %task.name,
            duration_ms = elapsed.as_millis() as u64,
            error = %error,
            "task_failed"
        );
        self.run
            .record(&task.name, EventKind::TaskFailed, error.to_string());
        self.events.emit(WorkflowEvent::TaskFailed {
            task: task.name.clone(),
            error: error.to_string(),
        });
        error
    }

    fn ensure_active(&self, name: &str) -> Result<(), StepError> {
        if self.cancel.is_cancelled() {
            return Err(StepError::Cancelled {
                task: name.to_string(),
            });
        }
        Ok(())
    }
}

//! Task descriptors and the stage tree they compose into.

use std::time::Duration;

use super::shape::OutputShape;

/// A single unit of generation work.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    /// Unique within its phase; also the event author name.
    pub name: String,
    /// State keys the task's inputs are rendered from.
    pub reads: Vec<String>,
    /// State key the task's result is written to.
    pub writes: String,
    /// Names of capabilities the backend may invoke.
    pub capabilities: Vec<String>,
    pub shape: Option<OutputShape>,
    pub instruction: String,
}

impl TaskDescriptor {
    /// New task writing to a key named after itself.
    pub fn new(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            writes: name.clone(),
            name,
            reads: Vec::new(),
            capabilities: Vec::new(),
            shape: None,
            instruction: instruction.into(),
        }
    }

    pub fn reads<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reads.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn writes(mut self, key: impl Into<String>) -> Self {
        self.writes = key.into();
        self
    }

    pub fn capability(mut self, name: impl Into<String>) -> Self {
        self.capabilities.push(name.into());
        self
    }

    pub fn shape(mut self, shape: OutputShape) -> Self {
        self.shape = Some(shape);
        self
    }
}

/// Ordered list of stages; each sees the writes of the ones before it.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub name: String,
    pub stages: Vec<Stage>,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn then(mut self, stage: impl Into<Stage>) -> Self {
        self.stages.push(stage.into());
        self
    }
}

impl From<TaskDescriptor> for Sequence {
    fn from(task: TaskDescriptor) -> Self {
        Sequence::new(task.name.clone()).then(task)
    }
}

/// Independent sequences that run concurrently.
#[derive(Debug, Clone)]
pub struct FanOutGroup {
    pub name: String,
    pub children: Vec<Sequence>,
}

impl FanOutGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn child(mut self, child: impl Into<Sequence>) -> Self {
        self.children.push(child.into());
        self
    }
}

/// Node of a phase's stage tree.
#[derive(Debug, Clone)]
pub enum Stage {
    Task(TaskDescriptor),
    Sequence(Sequence),
    FanOut(FanOutGroup),
}

impl Stage {
    pub fn name(&self) -> &str {
        match self {
            Stage::Task(task) => &task.name,
            Stage::Sequence(seq) => &seq.name,
            Stage::FanOut(group) => &group.name,
        }
    }

    /// Every task in the subtree, in declaration order.
    pub fn tasks(&self) -> Vec<&TaskDescriptor> {
        let mut out = Vec::new();
        self.collect_tasks(&mut out);
        out
    }

    fn collect_tasks<'a>(&'a self, out: &mut Vec<&'a TaskDescriptor>) {
        match self {
            Stage::Task(task) => out.push(task),
            Stage::Sequence(seq) => seq.stages.iter().for_each(|s| s.collect_tasks(out)),
            Stage::FanOut(group) => group
                .children
                .iter()
                .flat_map(|c| c.stages.iter())
                .for_each(|s| s.collect_tasks(out)),
        }
    }

    /// State keys written anywhere in the subtree.
    pub fn write_keys(&self) -> Vec<&str> {
        self.tasks().into_iter().map(|t| t.writes.as_str()).collect()
    }
}

impl From<TaskDescriptor> for Stage {
    fn from(task: TaskDescriptor) -> Self {
        Stage::Task(task)
    }
}

impl From<Sequence> for Stage {
    fn from(seq: Sequence) -> Self {
        Stage::Sequence(seq)
    }
}

impl From<FanOutGroup> for Stage {
    fn from(group: FanOutGroup) -> Self {
        Stage::FanOut(group)
    }
}

/// A validated, immutable top-level unit with its own deadline.
///
/// Only [`PhaseBuilder`](super::PhaseBuilder) constructs phases.
#[derive(Debug, Clone)]
pub struct Phase {
    pub(super) name: String,
    pub(super) deadline: Duration,
    pub(super) steps: Vec<Stage>,
}

impl Phase {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn steps(&self) -> &[Stage] {
        &self.steps
    }

    /// Number of top-level steps, the unit of timeout progress reports.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn tasks(&self) -> Vec<&TaskDescriptor> {
        self.steps.iter().flat_map(|s| s.tasks()).collect()
    }

    /// Every state key some task of this phase may write.
    pub fn write_keys(&self) -> Vec<&str> {
        self.steps.iter().flat_map(|s| s.write_keys()).collect()
    }
}
